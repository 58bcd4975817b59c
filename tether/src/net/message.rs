use crate::actor::{ActorId, CallId};

/// A single method invocation addressed to a remote actor.
///
/// `invocation_target` is an opaque selector string whose meaning is agreed
/// by both ends; `args` are pre-encoded per argument and never interpreted by
/// the transport.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteCallEnvelope {
    #[serde(rename = "callID")]
    pub call_id: CallId,
    pub recipient: ActorId,
    #[serde(rename = "invocationTarget")]
    pub invocation_target: String,
    #[serde(rename = "genericSubs")]
    pub generic_subs: Vec<String>,
    pub args: Vec<Vec<u8>>,
}

/// Failure reported by a remote invocation target.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: String,
    pub message: String,
}

/// The outcome of a call, correlated back to the caller via `call_id`.
///
/// `value` holds the encoded return value, or is empty for void replies and
/// for errors. `error` is present only when the target threw; replies without
/// it keep the historical wire shape.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "callID")]
    pub call_id: CallId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sender: Option<ActorId>,
    pub value: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ReplyError>,
}

/// The unit exchanged on the wire: one JSON envelope per WebSocket text frame.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum WireEnvelope {
    #[serde(rename = "call")]
    Call(RemoteCallEnvelope),
    #[serde(rename = "reply")]
    Reply(ReplyEnvelope),
    #[serde(rename = "connectionClose")]
    ConnectionClose {},
}
