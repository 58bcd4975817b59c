use crate::actor::{Actor, ActorId, CallId, RemoteErr};
use crate::actor_ref::RemoteActorRef;
use crate::net::message::{ReplyEnvelope, ReplyError, WireEnvelope};
use crate::net::{write_envelope, Channel};
use crate::system::ActorSystem;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Collects the pre-encoded arguments and generic substitutions of an
/// outbound invocation. The transport never interprets argument bytes.
#[derive(Debug, Clone, Default)]
pub struct InvocationEncoder {
    generic_subs: Vec<String>,
    args: Vec<Vec<u8>>,
}

impl InvocationEncoder {
    pub fn new() -> InvocationEncoder {
        InvocationEncoder::default()
    }

    pub fn put_generic_sub(&mut self, sub: impl Into<String>) {
        self.generic_subs.push(sub.into());
    }

    pub fn put_arg<T: Serialize>(&mut self, arg: &T) -> Result<(), RemoteErr> {
        let bytes = serde_json::to_vec(arg).map_err(|e| RemoteErr::Serialization {
            message: e.to_string(),
        })?;

        self.args.push(bytes);
        Ok(())
    }

    /// Encodes an actor-reference argument as its wire identity; the receiving
    /// side materialises it via [`InvocationDecoder::next_actor_ref`].
    pub fn put_actor_ref(&mut self, id: &ActorId) -> Result<(), RemoteErr> {
        self.put_arg(id)
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Vec<u8>>) {
        (self.generic_subs, self.args)
    }
}

/// Decodes the arguments of an inbound invocation in call order.
///
/// Carries the actor system and the originating channel so that decoded actor
/// references resolve through the system and identify their node to the
/// connection manager.
pub struct InvocationDecoder {
    system: ActorSystem,
    channel: Arc<Channel>,
    generic_subs: Vec<String>,
    expected: usize,
    args: std::vec::IntoIter<Vec<u8>>,
}

impl InvocationDecoder {
    pub(crate) fn new(
        system: ActorSystem,
        channel: Arc<Channel>,
        generic_subs: Vec<String>,
        args: Vec<Vec<u8>>,
    ) -> InvocationDecoder {
        InvocationDecoder {
            system,
            channel,
            generic_subs,
            expected: args.len(),
            args: args.into_iter(),
        }
    }

    pub fn generic_subs(&self) -> &[String] {
        &self.generic_subs
    }

    pub fn next_arg<T: DeserializeOwned>(&mut self) -> Result<T, RemoteErr> {
        let bytes = self.args.next().ok_or(RemoteErr::NotEnoughArguments {
            expected: self.expected,
        })?;

        serde_json::from_slice(&bytes).map_err(|e| RemoteErr::DecodingError {
            message: e.to_string(),
        })
    }

    /// Decodes an actor-reference argument. A reference tagged with a foreign
    /// node also associates that node with the channel the call arrived on.
    pub fn next_actor_ref<A: Actor>(&mut self) -> Result<RemoteActorRef<A>, RemoteErr> {
        let id: ActorId = self.next_arg()?;
        if let Some(node_id) = id.node_id {
            self.system.associate(node_id, self.channel.clone());
        }

        Ok(RemoteActorRef::new(id, self.system.clone()))
    }
}

/// Delivers the outcome of an executed invocation back to the caller as a
/// reply envelope on the originating channel.
#[derive(Clone)]
pub struct ResultHandler {
    call_id: CallId,
    sender: Option<ActorId>,
    channel: Arc<Channel>,
}

impl ResultHandler {
    pub(crate) fn new(call_id: CallId, sender: Option<ActorId>, channel: Arc<Channel>) -> ResultHandler {
        ResultHandler {
            call_id,
            sender,
            channel,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub async fn on_return<T: Serialize>(&self, value: &T) -> Result<(), RemoteErr> {
        let bytes = serde_json::to_vec(value).map_err(|e| RemoteErr::Serialization {
            message: e.to_string(),
        })?;

        self.send_reply(bytes, None).await
    }

    pub async fn on_return_void(&self) -> Result<(), RemoteErr> {
        self.send_reply(Vec::new(), None).await
    }

    /// Reports a thrown error: the reply carries an empty value plus the
    /// error tag so the caller fails with a typed error instead of a decode
    /// failure.
    pub async fn on_throw(&self, err: &RemoteErr) -> Result<(), RemoteErr> {
        let error = match err {
            RemoteErr::RemoteTarget { kind, message } => ReplyError {
                kind: kind.clone(),
                message: message.clone(),
            },
            other => ReplyError {
                kind: other.code().to_string(),
                message: other.to_string(),
            },
        };

        self.send_reply(Vec::new(), Some(error)).await
    }

    async fn send_reply(&self, value: Vec<u8>, error: Option<ReplyError>) -> Result<(), RemoteErr> {
        let envelope = WireEnvelope::Reply(ReplyEnvelope {
            call_id: self.call_id,
            sender: self.sender.clone(),
            value,
            error,
        });

        write_envelope(&self.channel, &envelope).await
    }
}
