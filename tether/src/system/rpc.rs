use crate::actor::{ActorId, RemoteErr};
use crate::invocation::InvocationEncoder;
use crate::net::message::{RemoteCallEnvelope, WireEnvelope};
use crate::net::write_envelope;
use crate::system::ActorSystem;
use serde::de::DeserializeOwned;

impl ActorSystem {
    /// Invokes `target` on a remote actor and decodes its reply as `R`.
    pub async fn remote_call<R: DeserializeOwned>(
        &self,
        recipient: &ActorId,
        target: &str,
        invocation: InvocationEncoder,
    ) -> Result<R, RemoteErr> {
        let bytes = self.remote_call_raw(recipient, target, invocation).await?;

        serde_json::from_slice(&bytes).map_err(|e| RemoteErr::FailedDecodingResponse {
            message: e.to_string(),
            data: bytes,
        })
    }

    /// Invokes `target` on a remote actor, discarding the reply payload.
    pub async fn remote_call_void(
        &self,
        recipient: &ActorId,
        target: &str,
        invocation: InvocationEncoder,
    ) -> Result<(), RemoteErr> {
        self.remote_call_raw(recipient, target, invocation)
            .await
            .map(|_| ())
    }

    async fn remote_call_raw(
        &self,
        recipient: &ActorId,
        target: &str,
        invocation: InvocationEncoder,
    ) -> Result<Vec<u8>, RemoteErr> {
        if recipient.node_id.is_none() {
            return Err(RemoteErr::MissingNodeId {
                id: recipient.clone(),
            });
        }

        let channel = self.manager().select_channel(recipient).await?;
        let (generic_subs, args) = invocation.into_parts();

        debug!(
            target: "RemoteCall",
            actor_id = %recipient,
            invocation_target = %target,
            addr = %channel.peer_addr(),
            "sending remote call"
        );

        let recipient = recipient.clone();
        let target = target.to_string();

        self.pending_replies()
            .send_message(channel.id(), |call_id| {
                let envelope = WireEnvelope::Call(RemoteCallEnvelope {
                    call_id,
                    recipient,
                    invocation_target: target,
                    generic_subs,
                    args,
                });
                let channel = channel.clone();

                async move { write_envelope(&channel, &envelope).await }
            })
            .await
    }
}
