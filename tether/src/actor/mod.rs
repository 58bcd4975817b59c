use crate::invocation::{InvocationDecoder, ResultHandler};
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub mod registry;

/// Globally unique identity of a process participating in the actor system.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn random() -> NodeId {
        NodeId(Uuid::new_v4())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation identifier matching a reply to its suspended caller.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn random() -> CallId {
        CallId(Uuid::new_v4())
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of an actor: the node that owns it plus a node-unique id.
///
/// Equality and hashing use the full pair. An id assigned to a created actor
/// is never reused by the same node.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActorId {
    #[serde(rename = "nodeID", skip_serializing_if = "Option::is_none", default)]
    pub node_id: Option<NodeId>,
    pub id: Arc<str>,
}

impl ActorId {
    pub fn new(node_id: Option<NodeId>, id: impl Into<Arc<str>>) -> ActorId {
        ActorId {
            node_id,
            id: id.into(),
        }
    }

    pub fn random(node_id: NodeId) -> ActorId {
        ActorId::new(Some(node_id), Uuid::new_v4().to_string())
    }

    pub fn is_local_to(&self, node_id: NodeId) -> bool {
        self.node_id == Some(node_id)
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.node_id {
            Some(node_id) => write!(f, "{}@{}", &self.id, node_id),
            None => write!(f, "{}@untagged", &self.id),
        }
    }
}

/// An addressable object that can receive invocations delivered over the wire.
#[async_trait]
pub trait Actor: 'static + Send + Sync {
    fn id(&self) -> &ActorId;

    /// Executes the named invocation target against this actor, reading
    /// arguments from `decoder` and reporting the outcome through `handler`.
    ///
    /// Returning an error is the throw path: the dispatcher converts it into
    /// an error-tagged reply for the caller.
    async fn accept(
        &self,
        target: &str,
        decoder: &mut InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), RemoteErr>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Errors surfaced by remote calls, resolution and the transport.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RemoteErr {
    ResolveFailedToMatchActorType {
        found: String,
        expected: String,
    },
    ResolveFailed {
        id: ActorId,
    },
    MissingNodeId {
        id: ActorId,
    },
    NoChannelToNode {
        node_id: Option<NodeId>,
    },
    NoPeers,
    NotEnoughArguments {
        expected: usize,
    },
    FailedDecodingResponse {
        data: Vec<u8>,
        message: String,
    },
    DecodingError {
        message: String,
    },
    Serialization {
        message: String,
    },
    MissingReplyContinuation {
        call_id: CallId,
    },
    FailedToUpgrade,
    Timeout {
        time_taken_millis: u64,
    },
    /// The remote target threw; `kind` and `message` are carried back in the
    /// reply envelope's error tag.
    RemoteTarget {
        kind: String,
        message: String,
    },
    UnknownTarget {
        target: String,
    },
    WriteFailed {
        message: String,
    },
    ResultChannelClosed,
    Startup {
        message: String,
    },
}

impl RemoteErr {
    /// Short stable code used as the `kind` of an error-tagged reply.
    pub fn code(&self) -> &'static str {
        match self {
            RemoteErr::ResolveFailedToMatchActorType { .. } => "resolveFailedToMatchActorType",
            RemoteErr::ResolveFailed { .. } => "resolveFailed",
            RemoteErr::MissingNodeId { .. } => "missingNodeID",
            RemoteErr::NoChannelToNode { .. } => "noChannelToNode",
            RemoteErr::NoPeers => "noPeers",
            RemoteErr::NotEnoughArguments { .. } => "notEnoughArguments",
            RemoteErr::FailedDecodingResponse { .. } => "failedDecodingResponse",
            RemoteErr::DecodingError { .. } => "decodingError",
            RemoteErr::Serialization { .. } => "serialization",
            RemoteErr::MissingReplyContinuation { .. } => "missingReplyContinuation",
            RemoteErr::FailedToUpgrade => "failedToUpgrade",
            RemoteErr::Timeout { .. } => "timeout",
            RemoteErr::RemoteTarget { .. } => "remoteTarget",
            RemoteErr::UnknownTarget { .. } => "unknownTarget",
            RemoteErr::WriteFailed { .. } => "writeFailed",
            RemoteErr::ResultChannelClosed => "resultChannelClosed",
            RemoteErr::Startup { .. } => "startup",
        }
    }
}

impl Display for RemoteErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErr::ResolveFailedToMatchActorType { found, expected } => write!(
                f,
                "resolved actor is a {} but a {} was expected",
                found, expected
            ),
            RemoteErr::ResolveFailed { id } => {
                write!(f, "on-demand resolution failed for actor {}", id)
            }
            RemoteErr::MissingNodeId { id } => {
                write!(f, "actor {} carries no node identity", id)
            }
            RemoteErr::NoChannelToNode { node_id: Some(n) } => {
                write!(f, "no live channel to node {}", n)
            }
            RemoteErr::NoChannelToNode { node_id: None } => {
                write!(f, "no live channel to the target node")
            }
            RemoteErr::NoPeers => write!(f, "no peers connected"),
            RemoteErr::NotEnoughArguments { expected } => {
                write!(f, "invocation envelope ran out of arguments ({} expected)", expected)
            }
            RemoteErr::FailedDecodingResponse { data, message } => write!(
                f,
                "failed to decode reply ({} bytes): {}",
                data.len(),
                message
            ),
            RemoteErr::DecodingError { message } => write!(f, "decoding error: {}", message),
            RemoteErr::Serialization { message } => write!(f, "serialization error: {}", message),
            RemoteErr::MissingReplyContinuation { call_id } => {
                write!(f, "no pending reply continuation for call {}", call_id)
            }
            RemoteErr::FailedToUpgrade => write!(f, "websocket upgrade failed"),
            RemoteErr::Timeout { time_taken_millis } => {
                write!(f, "timeout (time_taken_millis={})", time_taken_millis)
            }
            RemoteErr::RemoteTarget { kind, message } => {
                write!(f, "remote target threw ({}): {}", kind, message)
            }
            RemoteErr::UnknownTarget { target } => {
                write!(f, "unknown invocation target \"{}\"", target)
            }
            RemoteErr::WriteFailed { message } => write!(f, "channel write failed: {}", message),
            RemoteErr::ResultChannelClosed => write!(f, "failed to read result, channel closed"),
            RemoteErr::Startup { message } => write!(f, "startup failed: {}", message),
        }
    }
}

impl std::error::Error for RemoteErr {}
