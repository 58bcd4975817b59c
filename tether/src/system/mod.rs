use crate::actor::registry::Registry;
use crate::actor::{Actor, ActorId, NodeId, RemoteErr};
use crate::actor_ref::RemoteActorRef;
use crate::net::{Channel, ChannelId, ChannelManager};
use crate::reply::PendingReplies;
use crate::system::builder::SystemBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

pub mod builder;
pub mod rpc;

/// How the system reaches its peers.
#[derive(Debug, Clone)]
pub enum SystemMode {
    /// Maintain a single outbound channel to the given server.
    ClientFor { host: String, port: u16 },
    /// Listen for inbound channels from any number of clients.
    ServerOnly { host: String, port: u16 },
}

impl SystemMode {
    pub(crate) fn addr(&self) -> String {
        match self {
            SystemMode::ClientFor { host, port } => format!("{}:{}", host, port),
            SystemMode::ServerOnly { host, port } => format!("{}:{}", host, port),
        }
    }
}

/// Handle to a running actor system; cheap to clone and share between tasks.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemCore>,
}

pub(crate) struct SystemCore {
    node_id: NodeId,
    mode: SystemMode,
    registry: Registry,
    pending_replies: PendingReplies,
    manager: OnceLock<Arc<dyn ChannelManager>>,
    shutdown: AtomicBool,
}

impl ActorSystem {
    pub fn builder() -> SystemBuilder {
        SystemBuilder::new()
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    pub fn mode(&self) -> &SystemMode {
        &self.inner.mode
    }

    /// The listen port in server mode, the connected socket's local port in
    /// client mode.
    pub fn local_port(&self) -> Option<u16> {
        self.manager().local_port()
    }

    /// Creates an actor under a freshly assigned id and registers it.
    ///
    /// The id handed to the factory carries this node's identity; the factory
    /// must store it as the actor's own id.
    pub fn make_actor<A, F>(&self, factory: F) -> Arc<A>
    where
        A: Actor,
        F: FnOnce(ActorId) -> A,
    {
        let id = self.inner.registry.assign_id(None);
        self.ready(id, factory)
    }

    /// Creates an actor under the given node-unique id and registers it.
    ///
    /// Forcing an id that is already registered is a programming error and
    /// terminates the process.
    pub fn make_actor_with_id<A, F>(&self, id: impl Into<Arc<str>>, factory: F) -> Arc<A>
    where
        A: Actor,
        F: FnOnce(ActorId) -> A,
    {
        let id = self
            .inner
            .registry
            .assign_id(Some(ActorId::new(Some(self.node_id()), id)));
        self.ready(id, factory)
    }

    fn ready<A, F>(&self, id: ActorId, factory: F) -> Arc<A>
    where
        A: Actor,
        F: FnOnce(ActorId) -> A,
    {
        let actor = Arc::new(factory(id));
        self.inner.registry.actor_ready(actor.clone());
        actor
    }

    /// Resolves `id` to a locally hosted actor of type `A`; `Ok(None)` means
    /// the id is not local to this node.
    pub fn resolve<A: Actor>(&self, id: &ActorId) -> Result<Option<Arc<A>>, RemoteErr> {
        self.inner.registry.resolve(id)
    }

    pub fn resolve_any(&self, id: &ActorId) -> Option<Arc<dyn Actor>> {
        self.inner.registry.resolve_any(id)
    }

    pub fn resign_id(&self, id: &ActorId) {
        self.inner.registry.resign_id(id)
    }

    /// Installs the callback that materialises actors lazily the first time
    /// an unknown id is referenced. The callback may re-enter the system to
    /// resolve or register related actors.
    pub fn set_on_demand_resolver<F>(&self, resolver: F)
    where
        F: Fn(&ActorId) -> Option<Arc<dyn Actor>> + Send + Sync + 'static,
    {
        self.inner.registry.set_on_demand_resolver(Arc::new(resolver));
    }

    /// A typed reference to an actor reachable through this system.
    pub fn remote_ref<A: Actor>(&self, id: ActorId) -> RemoteActorRef<A> {
        RemoteActorRef::new(id, self.clone())
    }

    pub fn inflight_remote_request_count(&self) -> usize {
        self.inner.pending_replies.inflight_count()
    }

    pub fn registered_actor_count(&self) -> usize {
        self.inner.registry.registered_count()
    }

    pub(crate) fn pending_replies(&self) -> &PendingReplies {
        &self.inner.pending_replies
    }

    pub(crate) fn set_manager(&self, manager: Arc<dyn ChannelManager>) {
        let _ = self.inner.manager.set(manager);
    }

    pub(crate) fn manager(&self) -> &Arc<dyn ChannelManager> {
        self.inner
            .manager
            .get()
            .expect("channel manager initialised at startup")
    }

    /// Records that a foreign node's traffic arrives on `channel`.
    pub(crate) fn associate(&self, node_id: NodeId, channel: Arc<Channel>) {
        if node_id == self.node_id() {
            return;
        }

        self.manager().associate(node_id, channel);
    }

    pub(crate) fn channel_closed(&self, channel_id: ChannelId) {
        if let Some(manager) = self.inner.manager.get() {
            manager.channel_closed(channel_id);
        }
    }

    /// Shuts the system down: closes every channel, fails all outstanding
    /// calls with a channel error and waits for the dispatcher loops to
    /// stop. Idempotent.
    pub async fn shutdown_gracefully(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(target: "ActorSystem", node_id = %self.node_id(), "shutting down");
        self.manager().cancel().await;
        self.inner
            .pending_replies
            .fail_all(RemoteErr::NoChannelToNode { node_id: None });
    }
}
