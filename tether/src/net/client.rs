use crate::actor::{ActorId, NodeId, RemoteErr};
use crate::net::message::WireEnvelope;
use crate::net::{receive_loop, write_envelope, Channel, ChannelManager, WsReader};
use crate::system::ActorSystem;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

/// Reconnection policy: exponential backoff from `base_delay` capped at
/// `max_delay`, giving up after `max_attempts` consecutive failures.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(3),
        }
    }
}

impl ReconnectConfig {
    /// A single connection attempt, no retries.
    pub fn disabled() -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: 1,
            ..ReconnectConfig::default()
        }
    }

    fn delay(&self, connection_attempts: usize) -> Duration {
        let exp = connection_attempts.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }
}

pub enum ClientState {
    Idle {
        connection_attempts: usize,
    },
    Connected {
        channel: Arc<Channel>,
    },
    Quarantined {
        since: DateTime<Utc>,
        connection_attempts: usize,
    },
    Stopped,
}

/// Maintains the single logical channel to the server, reconnecting with
/// bounded backoff when it drops.
pub struct ClientManager {
    addr: String,
    system: ActorSystem,
    reconnect: ReconnectConfig,
    state: Mutex<ClientState>,
    server_node: Mutex<Option<NodeId>>,
    local_port: Mutex<Option<u16>>,
    channel_tx: watch::Sender<Option<Arc<Channel>>>,
    cancellation_token: CancellationToken,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientManager {
    pub(crate) fn new(
        addr: String,
        reconnect: ReconnectConfig,
        system: ActorSystem,
    ) -> Arc<ClientManager> {
        let (channel_tx, _) = watch::channel(None);

        Arc::new(ClientManager {
            addr,
            system,
            reconnect,
            state: Mutex::new(ClientState::Idle {
                connection_attempts: 0,
            }),
            server_node: Mutex::new(None),
            local_port: Mutex::new(None),
            channel_tx,
            cancellation_token: CancellationToken::new(),
            run_task: Mutex::new(None),
        })
    }

    /// Starts the connection task; each established channel runs the
    /// dispatcher loop until it drops.
    pub(crate) fn spawn(self: Arc<Self>) {
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run().await });
        *self.run_task.lock() = Some(handle);
    }

    async fn run(self: Arc<Self>) {
        let mut connection_attempts = 0;

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.connect().await {
                Ok((channel, reader)) => {
                    connection_attempts = 0;
                    info!(target: "ClientManager", addr = %self.addr, "channel open");

                    *self.state.lock() = ClientState::Connected {
                        channel: channel.clone(),
                    };
                    self.channel_tx.send_replace(Some(channel.clone()));

                    receive_loop(
                        self.system.clone(),
                        channel,
                        reader,
                        self.cancellation_token.child_token(),
                    )
                    .await;

                    self.channel_tx.send_replace(None);
                    *self.local_port.lock() = None;
                    *self.state.lock() = ClientState::Idle {
                        connection_attempts,
                    };

                    if self.cancellation_token.is_cancelled() {
                        break;
                    }

                    debug!(target: "ClientManager", addr = %self.addr, "channel lost, reconnecting");
                }
                Err(e) => {
                    connection_attempts += 1;

                    if connection_attempts >= self.reconnect.max_attempts {
                        warn!(
                            target: "ClientManager",
                            addr = %self.addr,
                            attempts = connection_attempts,
                            "connection attempts exhausted: {}",
                            e
                        );

                        *self.state.lock() = ClientState::Quarantined {
                            since: Utc::now(),
                            connection_attempts,
                        };
                        self.channel_tx.send_replace(None);
                        break;
                    }

                    let delay = self.reconnect.delay(connection_attempts);
                    debug!(
                        target: "ClientManager",
                        addr = %self.addr,
                        attempts = connection_attempts,
                        "connect failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    *self.state.lock() = ClientState::Idle {
                        connection_attempts,
                    };

                    tokio::select! {
                        _ = self.cancellation_token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if self.cancellation_token.is_cancelled() {
            *self.state.lock() = ClientState::Stopped;
        }
        self.channel_tx.send_replace(None);
    }

    async fn connect(&self) -> Result<(Arc<Channel>, WsReader), RemoteErr> {
        let url = format!("ws://{}", &self.addr);
        let (stream, _) = connect_async(url.as_str()).await.map_err(|e| {
            trace!(target: "ClientManager", addr = %self.addr, "websocket connect failed: {}", e);
            RemoteErr::FailedToUpgrade
        })?;

        *self.local_port.lock() = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.local_addr().ok().map(|addr| addr.port()),
            _ => None,
        };

        let (writer, reader) = stream.split();
        let channel = Channel::new(self.addr.clone(), writer);
        channel.mark_open();

        Ok((channel, reader))
    }

    fn gave_up(&self) -> bool {
        matches!(
            *self.state.lock(),
            ClientState::Quarantined { .. } | ClientState::Stopped
        )
    }
}

#[async_trait]
impl ChannelManager for ClientManager {
    fn local_port(&self) -> Option<u16> {
        *self.local_port.lock()
    }

    /// The client carries all traffic on its one upstream channel, whatever
    /// the target id; awaits the channel opening and fails once reconnection
    /// attempts are exhausted.
    async fn select_channel(&self, _id: &ActorId) -> Result<Arc<Channel>, RemoteErr> {
        let mut rx = self.channel_tx.subscribe();

        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(channel) = current {
                if channel.is_open() {
                    return Ok(channel);
                }
            }

            if self.gave_up() {
                return Err(RemoteErr::NoChannelToNode {
                    node_id: *self.server_node.lock(),
                });
            }

            if rx.changed().await.is_err() {
                return Err(RemoteErr::NoChannelToNode {
                    node_id: *self.server_node.lock(),
                });
            }
        }
    }

    fn associate(&self, node_id: NodeId, channel: Arc<Channel>) {
        channel.set_node_id(node_id);

        let mut server_node = self.server_node.lock();
        if server_node.is_none() {
            debug!(target: "ClientManager", node_id = %node_id, "server node identified");
        }
        *server_node = Some(node_id);
    }

    async fn cancel(&self) {
        self.cancellation_token.cancel();

        let current = self.channel_tx.borrow().clone();
        if let Some(channel) = current {
            let _ = write_envelope(&channel, &WireEnvelope::ConnectionClose {}).await;
            channel.close().await;
        }

        let run_task = self.run_task.lock().take();
        if let Some(handle) = run_task {
            let _ = handle.await;
        }

        *self.state.lock() = ClientState::Stopped;
    }
}
