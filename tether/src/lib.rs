//! Distributed actor transport over WebSockets.
//!
//! A caller invokes a method on a remote actor reference and receives the
//! result as if the actor were co-located: the system serialises the call,
//! routes it to the owning node, dispatches it to the real actor, and wakes
//! the suspended caller with the reply.

#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate serde;

#[macro_use]
extern crate tracing;

pub mod actor;
pub mod actor_ref;
pub mod invocation;
pub mod net;
pub mod reply;
pub mod system;
