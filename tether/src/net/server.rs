use crate::actor::{ActorId, NodeId, RemoteErr};
use crate::net::message::WireEnvelope;
use crate::net::{receive_loop, write_envelope, Channel, ChannelId, ChannelManager};
use crate::system::ActorSystem;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

/// Accepts WebSocket upgrades and maintains the node-to-channel mapping.
///
/// A node self-identifies through its traffic; once associated, outbound
/// calls to actors it hosts are carried on its channel. When a node
/// reconnects, the most recent channel wins and the superseded one is closed.
pub struct ServerManager {
    local_port: u16,
    system: ActorSystem,
    channels: Mutex<ServerChannels>,
    cancellation_token: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    session_tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct ServerChannels {
    by_node: HashMap<NodeId, Arc<Channel>>,
    anonymous: Vec<Arc<Channel>>,
}

impl ServerManager {
    pub(crate) async fn bind(
        addr: &str,
        system: ActorSystem,
    ) -> Result<(Arc<ServerManager>, TcpListener), RemoteErr> {
        let listener = TcpListener::bind(addr).await.map_err(|e| RemoteErr::Startup {
            message: format!("failed to bind {}: {}", addr, e),
        })?;

        let local_port = listener
            .local_addr()
            .map_err(|e| RemoteErr::Startup {
                message: e.to_string(),
            })?
            .port();

        let manager = Arc::new(ServerManager {
            local_port,
            system,
            channels: Mutex::new(ServerChannels {
                by_node: HashMap::new(),
                anonymous: Vec::new(),
            }),
            cancellation_token: CancellationToken::new(),
            accept_task: Mutex::new(None),
            session_tasks: Mutex::new(Vec::new()),
        });

        Ok((manager, listener))
    }

    pub(crate) fn spawn(self: Arc<Self>, listener: TcpListener) {
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.accept_loop(listener).await });
        *self.accept_task.lock() = Some(handle);
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        info!(target: "ServerManager", port = self.local_port, "listening for connections");

        loop {
            let accepted = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    trace!(target: "ServerManager", addr = %addr, "connection accepted");

                    let manager = self.clone();
                    let session = tokio::spawn(async move { manager.run_session(stream, addr).await });

                    let mut session_tasks = self.session_tasks.lock();
                    session_tasks.retain(|task| !task.is_finished());
                    session_tasks.push(session);
                }
                Err(e) => error!(target: "ServerManager", "error accepting connection: {}", e),
            }
        }

        info!(target: "ServerManager", port = self.local_port, "listener stopped");
    }

    /// Upgrades the accepted socket and runs the dispatcher loop on the new
    /// channel until the peer disconnects.
    async fn run_session(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let stream = match accept_async(MaybeTlsStream::Plain(stream)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(target: "ServerManager", addr = %addr, "{}: {}", RemoteErr::FailedToUpgrade, e);
                return;
            }
        };

        let (writer, reader) = stream.split();
        let channel = Channel::new(addr.to_string(), writer);
        channel.mark_open();
        self.channels.lock().anonymous.push(channel.clone());

        receive_loop(
            self.system.clone(),
            channel,
            reader,
            self.cancellation_token.child_token(),
        )
        .await;
    }
}

#[async_trait]
impl ChannelManager for ServerManager {
    fn local_port(&self) -> Option<u16> {
        Some(self.local_port)
    }

    async fn select_channel(&self, id: &ActorId) -> Result<Arc<Channel>, RemoteErr> {
        let Some(node_id) = id.node_id else {
            return Err(RemoteErr::MissingNodeId { id: id.clone() });
        };

        let channels = self.channels.lock();
        if channels.by_node.is_empty() && channels.anonymous.is_empty() {
            return Err(RemoteErr::NoPeers);
        }

        channels
            .by_node
            .get(&node_id)
            .filter(|channel| channel.is_open())
            .cloned()
            .ok_or(RemoteErr::NoChannelToNode {
                node_id: Some(node_id),
            })
    }

    fn associate(&self, node_id: NodeId, channel: Arc<Channel>) {
        channel.set_node_id(node_id);

        let displaced = {
            let mut channels = self.channels.lock();
            channels.anonymous.retain(|c| c.id() != channel.id());
            channels.by_node.insert(node_id, channel.clone())
        };

        match displaced {
            Some(old) if old.id() != channel.id() => {
                debug!(
                    target: "ServerManager",
                    node_id = %node_id,
                    "node reconnected, superseding previous channel"
                );
                tokio::spawn(async move {
                    old.close().await;
                });
            }
            Some(_) => {}
            None => {
                debug!(
                    target: "ServerManager",
                    node_id = %node_id,
                    addr = %channel.peer_addr(),
                    "node associated with channel"
                );
            }
        }
    }

    fn channel_closed(&self, channel_id: ChannelId) {
        let mut channels = self.channels.lock();
        channels.anonymous.retain(|c| c.id() != channel_id);
        channels.by_node.retain(|_, c| c.id() != channel_id);
    }

    async fn cancel(&self) {
        self.cancellation_token.cancel();

        let accept_task = self.accept_task.lock().take();
        if let Some(handle) = accept_task {
            let _ = handle.await;
        }

        let channels: Vec<Arc<Channel>> = {
            let mut channels = self.channels.lock();
            let mut all: Vec<Arc<Channel>> =
                channels.by_node.drain().map(|(_, c)| c).collect();
            all.extend(channels.anonymous.drain(..));
            all
        };

        for channel in channels {
            let _ = write_envelope(&channel, &WireEnvelope::ConnectionClose {}).await;
            channel.close().await;
        }

        let session_tasks: Vec<JoinHandle<()>> = self.session_tasks.lock().drain(..).collect();
        for task in session_tasks {
            let _ = task.await;
        }
    }
}
