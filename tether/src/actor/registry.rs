use crate::actor::{Actor, ActorId, NodeId, RemoteErr};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub type OnDemandResolver = Arc<dyn Fn(&ActorId) -> Option<Arc<dyn Actor>> + Send + Sync>;

/// Table of the actors hosted by this node.
///
/// Only local actors appear here; remote identities are never stored. The
/// stored actor's id always equals its key.
pub struct Registry {
    node_id: NodeId,
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    actors: HashMap<ActorId, Arc<dyn Actor>>,
    on_demand: Option<OnDemandResolver>,
}

impl Registry {
    pub(crate) fn new(node_id: NodeId) -> Registry {
        Registry {
            node_id,
            inner: Mutex::new(RegistryInner {
                actors: HashMap::new(),
                on_demand: None,
            }),
        }
    }

    /// Returns the id a new actor will be registered under.
    ///
    /// A hint naming an id that is already live is a programming error and
    /// terminates the process.
    pub fn assign_id(&self, hint: Option<ActorId>) -> ActorId {
        match hint {
            Some(id) => {
                let inner = self.inner.lock();
                if inner.actors.contains_key(&id) {
                    panic!("actor id {} is already registered", id);
                }
                id
            }
            None => ActorId::random(self.node_id),
        }
    }

    /// Inserts the actor under its id. Registering an id twice is a
    /// programming error and terminates the process.
    pub fn actor_ready(&self, actor: Arc<dyn Actor>) {
        let id = actor.id().clone();
        let mut inner = self.inner.lock();
        if inner.actors.insert(id.clone(), actor).is_some() {
            panic!("actor id {} is already registered", id);
        }

        trace!(target: "ActorRegistry", actor_id = %id, "actor registered");
    }

    pub fn resign_id(&self, id: &ActorId) {
        if self.inner.lock().actors.remove(id).is_some() {
            trace!(target: "ActorRegistry", actor_id = %id, "actor resigned");
        }
    }

    pub fn set_on_demand_resolver(&self, resolver: OnDemandResolver) {
        self.inner.lock().on_demand = Some(resolver);
    }

    /// Resolves `id` to a locally hosted actor of type `A`.
    ///
    /// `Ok(None)` means the id is not local to this node. The on-demand
    /// resolver runs outside the registry lock, so it may re-enter the
    /// registry; an entry registered while it ran wins over its answer.
    pub fn resolve<A: Actor>(&self, id: &ActorId) -> Result<Option<Arc<A>>, RemoteErr> {
        let (existing, on_demand) = self.lookup(id);

        if let Some(actor) = existing {
            return match downcast::<A>(actor) {
                Ok(actor) => Ok(Some(actor)),
                Err(found) => Err(RemoteErr::ResolveFailedToMatchActorType {
                    found,
                    expected: std::any::type_name::<A>().to_string(),
                }),
            };
        }

        let Some(resolver) = on_demand else {
            trace!(target: "ActorRegistry", actor_id = %id, "resolve: not local");
            return Ok(None);
        };

        let resolved = resolver(id);

        // Revalidate: the resolver (or a concurrent task) may have registered
        // the id in the meantime; the registered entry wins.
        let registered = self.inner.lock().actors.get(id).cloned();
        if let Some(actor) = registered {
            return match downcast::<A>(actor) {
                Ok(actor) => Ok(Some(actor)),
                Err(found) => Err(RemoteErr::ResolveFailedToMatchActorType {
                    found,
                    expected: std::any::type_name::<A>().to_string(),
                }),
            };
        }

        match resolved {
            Some(actor) => match downcast::<A>(actor) {
                Ok(actor) => Ok(Some(actor)),
                Err(found) => {
                    debug!(
                        target: "ActorRegistry",
                        actor_id = %id,
                        found = %found,
                        "on-demand resolver produced a wrongly typed actor"
                    );
                    Err(RemoteErr::ResolveFailed { id: id.clone() })
                }
            },
            None => Ok(None),
        }
    }

    /// Untyped resolution, used to locate the recipients of inbound calls.
    pub fn resolve_any(&self, id: &ActorId) -> Option<Arc<dyn Actor>> {
        let (existing, on_demand) = self.lookup(id);
        if existing.is_some() {
            return existing;
        }

        let resolver = on_demand?;
        let resolved = resolver(id);

        let registered = self.inner.lock().actors.get(id).cloned();
        registered.or(resolved)
    }

    pub fn registered_count(&self) -> usize {
        self.inner.lock().actors.len()
    }

    fn lookup(&self, id: &ActorId) -> (Option<Arc<dyn Actor>>, Option<OnDemandResolver>) {
        let inner = self.inner.lock();
        (inner.actors.get(id).cloned(), inner.on_demand.clone())
    }
}

fn downcast<A: Actor>(actor: Arc<dyn Actor>) -> Result<Arc<A>, String> {
    let found = actor.type_name().to_string();
    actor.as_any().downcast::<A>().map_err(|_| found)
}
