use crate::actor::{ActorId, NodeId, RemoteErr};
use crate::invocation::{InvocationDecoder, ResultHandler};
use crate::net::message::{RemoteCallEnvelope, ReplyEnvelope, WireEnvelope};
use crate::system::ActorSystem;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::Message;
use uuid::Uuid;

pub mod client;
pub mod message;
pub mod server;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsReader = SplitStream<WsStream>;
pub type WsWriter = SplitSink<WsStream, Message>;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn random() -> ChannelId {
        ChannelId(Uuid::new_v4())
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A live WebSocket connection to a peer, shared by the dispatcher loop and
/// any number of concurrent writers.
pub struct Channel {
    id: ChannelId,
    peer_addr: String,
    node_id: Mutex<Option<NodeId>>,
    state: Mutex<ChannelState>,
    writer: tokio::sync::Mutex<WsWriter>,
}

impl Channel {
    pub(crate) fn new(peer_addr: String, writer: WsWriter) -> Arc<Channel> {
        Arc::new(Channel {
            id: ChannelId::random(),
            peer_addr,
            node_id: Mutex::new(None),
            state: Mutex::new(ChannelState::Connecting),
            writer: tokio::sync::Mutex::new(writer),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// The node this channel has been associated with, once known.
    pub fn node_id(&self) -> Option<NodeId> {
        *self.node_id.lock()
    }

    pub(crate) fn set_node_id(&self, node_id: NodeId) {
        *self.node_id.lock() = Some(node_id);
    }

    pub(crate) fn mark_open(&self) {
        *self.state.lock() = ChannelState::Open;
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = ChannelState::Closed;
    }

    pub(crate) async fn write_text(&self, text: String) -> Result<(), RemoteErr> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(text))
            .await
            .map_err(|e| RemoteErr::WriteFailed {
                message: e.to_string(),
            })
    }

    pub(crate) async fn write_pong(&self, payload: Vec<u8>) -> Result<(), RemoteErr> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Pong(payload))
            .await
            .map_err(|e| RemoteErr::WriteFailed {
                message: e.to_string(),
            })
    }

    pub(crate) async fn write_close(&self, frame: Option<CloseFrame<'static>>) -> Result<(), RemoteErr> {
        self.begin_close();
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Close(frame))
            .await
            .map_err(|e| RemoteErr::WriteFailed {
                message: e.to_string(),
            })
    }

    /// Closes the underlying socket and marks the channel closed.
    pub(crate) async fn close(&self) {
        self.begin_close();
        let mut writer = self.writer.lock().await;
        let _ = writer.close().await;
        drop(writer);
        self.mark_closed();
    }

    fn begin_close(&self) {
        let mut state = self.state.lock();
        if *state == ChannelState::Connecting || *state == ChannelState::Open {
            *state = ChannelState::Closing;
        }
    }
}

/// Maps actor identities to live channels, in client or server mode.
#[async_trait]
pub trait ChannelManager: 'static + Send + Sync {
    /// The locally bound port: the listen port in server mode, the socket's
    /// local port in client mode once connected.
    fn local_port(&self) -> Option<u16>;

    /// Selects the channel that can carry traffic for `id`, awaiting
    /// availability where the mode allows it.
    async fn select_channel(&self, id: &ActorId) -> Result<Arc<Channel>, RemoteErr>;

    /// Records that `channel` belongs to `node_id`.
    fn associate(&self, node_id: NodeId, channel: Arc<Channel>);

    /// Drops a channel whose dispatcher loop has terminated.
    fn channel_closed(&self, _channel_id: ChannelId) {}

    /// Shuts down every channel and stops background tasks.
    async fn cancel(&self);
}

/// Encodes an envelope and emits it on the channel: call and reply as one
/// final text frame, connection-close as a close frame with the
/// protocol-error code followed by channel teardown.
pub(crate) async fn write_envelope(channel: &Channel, envelope: &WireEnvelope) -> Result<(), RemoteErr> {
    match envelope {
        WireEnvelope::ConnectionClose {} => {
            channel
                .write_close(Some(CloseFrame {
                    code: CloseCode::Protocol,
                    reason: "".into(),
                }))
                .await?;
            channel.close().await;
            Ok(())
        }
        envelope => {
            let text = serde_json::to_string(envelope).map_err(|e| RemoteErr::Serialization {
                message: e.to_string(),
            })?;

            trace!(
                target: "ChannelWrite",
                addr = %channel.peer_addr(),
                len = text.len(),
                "sending text frame"
            );
            channel.write_text(text).await
        }
    }
}

/// Reads frames from `reader` until the peer disconnects or `cancellation`
/// fires, dispatching each decoded envelope. The loop's only synchronous work
/// is decoding and task scheduling; every inbound call runs as its own task.
pub(crate) async fn receive_loop(
    system: ActorSystem,
    channel: Arc<Channel>,
    mut reader: WsReader,
    cancellation: CancellationToken,
) {
    let addr = channel.peer_addr().to_string();

    loop {
        let frame = tokio::select! {
            _ = cancellation.cancelled() => break,
            frame = reader.next() => frame,
        };

        let Some(frame) = frame else {
            trace!(target: "ChannelRead", addr = %addr, "stream ended");
            break;
        };

        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<WireEnvelope>(&text) {
                Ok(WireEnvelope::Call(call)) => {
                    let system = system.clone();
                    let channel = channel.clone();
                    tokio::spawn(async move {
                        handle_call(system, channel, call).await;
                    });
                }
                Ok(WireEnvelope::Reply(reply)) => handle_reply(&system, &channel, reply),
                Ok(WireEnvelope::ConnectionClose {}) => {
                    debug!(target: "ChannelRead", addr = %addr, "peer requested connection close");
                    channel.close().await;
                    break;
                }
                Err(e) => {
                    warn!(target: "ChannelRead", addr = %addr, "dropping undecodable envelope: {}", e);
                }
            },
            Ok(Message::Ping(payload)) => {
                if let Err(e) = channel.write_pong(payload).await {
                    warn!(target: "ChannelRead", addr = %addr, "failed to send pong: {}", e);
                }
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                trace!(target: "ChannelRead", addr = %addr, "ignoring binary frame");
            }
            Ok(Message::Close(frame)) => {
                debug!(target: "ChannelRead", addr = %addr, frame = ?frame, "close frame received");
                let echo = frame.map(|f| CloseFrame {
                    code: f.code,
                    reason: "".into(),
                });
                let _ = channel.write_close(echo).await;
                break;
            }
            Ok(_) => {
                warn!(target: "ChannelRead", addr = %addr, "unexpected frame, closing channel");
                let _ = channel
                    .write_close(Some(CloseFrame {
                        code: CloseCode::Protocol,
                        reason: "".into(),
                    }))
                    .await;
                break;
            }
            Err(e) => {
                warn!(target: "ChannelRead", addr = %addr, "connection lost: {}", e);
                break;
            }
        }
    }

    channel.mark_closed();
    system.pending_replies().fail_all_for(
        channel.id(),
        RemoteErr::NoChannelToNode {
            node_id: channel.node_id(),
        },
    );
    system.channel_closed(channel.id());

    trace!(target: "ChannelRead", addr = %addr, "dispatcher loop terminated");
}

async fn handle_call(system: ActorSystem, channel: Arc<Channel>, call: RemoteCallEnvelope) {
    let RemoteCallEnvelope {
        call_id,
        recipient,
        invocation_target,
        generic_subs,
        args,
    } = call;

    let Some(actor) = system.resolve_any(&recipient) else {
        warn!(
            target: "RemoteDispatch",
            actor_id = %recipient,
            invocation_target = %invocation_target,
            "dropping call for unresolvable recipient"
        );
        return;
    };

    debug!(
        target: "RemoteDispatch",
        actor_id = %recipient,
        invocation_target = %invocation_target,
        call_id = %call_id,
        "dispatching call"
    );

    let mut decoder = InvocationDecoder::new(system.clone(), channel.clone(), generic_subs, args);
    let handler = ResultHandler::new(call_id, Some(recipient.clone()), channel);

    if let Err(e) = actor
        .accept(&invocation_target, &mut decoder, handler.clone())
        .await
    {
        debug!(
            target: "RemoteDispatch",
            actor_id = %recipient,
            invocation_target = %invocation_target,
            "target threw: {}",
            e
        );

        if let Err(send_err) = handler.on_throw(&e).await {
            warn!(
                target: "RemoteDispatch",
                call_id = %call_id,
                "failed to send error reply: {}",
                send_err
            );
        }
    }
}

fn handle_reply(system: &ActorSystem, channel: &Arc<Channel>, reply: ReplyEnvelope) {
    if let Some(node_id) = reply.sender.as_ref().and_then(|sender| sender.node_id) {
        system.associate(node_id, channel.clone());
    }

    match reply.error {
        Some(error) => system.pending_replies().received_error(
            reply.call_id,
            RemoteErr::RemoteTarget {
                kind: error.kind,
                message: error.message,
            },
        ),
        None => system
            .pending_replies()
            .received_reply(reply.call_id, reply.value),
    }
}
