use crate::actor::registry::Registry;
use crate::actor::{NodeId, RemoteErr};
use crate::net::client::{ClientManager, ReconnectConfig};
use crate::net::server::ServerManager;
use crate::reply::PendingReplies;
use crate::system::{ActorSystem, SystemCore, SystemMode};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Configures and starts an [`ActorSystem`].
pub struct SystemBuilder {
    mode: Option<SystemMode>,
    node_id: Option<NodeId>,
    call_timeout: Duration,
    reconnect: ReconnectConfig,
}

impl SystemBuilder {
    pub fn new() -> SystemBuilder {
        SystemBuilder {
            mode: None,
            node_id: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn client_for(mut self, host: impl Into<String>, port: u16) -> Self {
        self.mode = Some(SystemMode::ClientFor {
            host: host.into(),
            port,
        });
        self
    }

    pub fn server_only(mut self, host: impl Into<String>, port: u16) -> Self {
        self.mode = Some(SystemMode::ServerOnly {
            host: host.into(),
            port,
        });
        self
    }

    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// How long a caller waits for a reply before its call fails.
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Starts the system: binds the listener in server mode, begins
    /// connecting in client mode, and spawns the dispatcher machinery.
    pub async fn start(self) -> Result<ActorSystem, RemoteErr> {
        let mode = self
            .mode
            .expect("a system mode (client_for/server_only) is required");
        let node_id = self.node_id.unwrap_or_else(NodeId::random);

        let system = ActorSystem {
            inner: Arc::new(SystemCore {
                node_id,
                mode: mode.clone(),
                registry: Registry::new(node_id),
                pending_replies: PendingReplies::new(self.call_timeout),
                manager: OnceLock::new(),
                shutdown: AtomicBool::new(false),
            }),
        };

        match &mode {
            SystemMode::ClientFor { .. } => {
                let manager = ClientManager::new(mode.addr(), self.reconnect, system.clone());
                system.set_manager(manager.clone());
                manager.spawn();
            }
            SystemMode::ServerOnly { .. } => {
                let (manager, listener) = ServerManager::bind(&mode.addr(), system.clone()).await?;
                system.set_manager(manager.clone());
                manager.spawn(listener);
            }
        }

        info!(target: "ActorSystem", node_id = %node_id, mode = ?mode, "actor system started");
        Ok(system)
    }
}
