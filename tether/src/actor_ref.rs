use crate::actor::{Actor, ActorId, NodeId, RemoteErr};
use crate::invocation::InvocationEncoder;
use crate::system::ActorSystem;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Reference to an actor hosted on another node.
///
/// Calls made through the reference are transported by the owning system; the
/// type parameter records which actor capability the reference stands for.
pub struct RemoteActorRef<A: Actor> {
    id: ActorId,
    system: ActorSystem,
    _a: PhantomData<A>,
}

impl<A: Actor> RemoteActorRef<A> {
    pub fn new(id: ActorId, system: ActorSystem) -> RemoteActorRef<A> {
        RemoteActorRef {
            id,
            system,
            _a: PhantomData,
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.id
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.id.node_id
    }

    pub async fn call<R: DeserializeOwned>(
        &self,
        target: &str,
        invocation: InvocationEncoder,
    ) -> Result<R, RemoteErr> {
        self.system.remote_call(&self.id, target, invocation).await
    }

    pub async fn call_void(
        &self,
        target: &str,
        invocation: InvocationEncoder,
    ) -> Result<(), RemoteErr> {
        self.system
            .remote_call_void(&self.id, target, invocation)
            .await
    }
}

impl<A: Actor> Clone for RemoteActorRef<A> {
    fn clone(&self) -> Self {
        RemoteActorRef {
            id: self.id.clone(),
            system: self.system.clone(),
            _a: PhantomData,
        }
    }
}

impl<A: Actor> Debug for RemoteActorRef<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(&format!("RemoteActorRef<{}>", std::any::type_name::<A>()))
            .field("actor_id", &self.id)
            .finish()
    }
}
