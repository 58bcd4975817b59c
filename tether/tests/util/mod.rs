#![allow(dead_code)]

use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::actor::{Actor, ActorId, RemoteErr};
use tether::invocation::{InvocationDecoder, InvocationEncoder, ResultHandler};
use tether::system::ActorSystem;

pub fn create_trace_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub async fn create_server(call_timeout: Duration) -> ActorSystem {
    ActorSystem::builder()
        .server_only("127.0.0.1", 0)
        .call_timeout(call_timeout)
        .start()
        .await
        .expect("start server system")
}

pub async fn create_server_on(port: u16, call_timeout: Duration) -> ActorSystem {
    ActorSystem::builder()
        .server_only("127.0.0.1", port)
        .call_timeout(call_timeout)
        .start()
        .await
        .expect("start server system")
}

pub async fn create_client(port: u16, call_timeout: Duration) -> ActorSystem {
    ActorSystem::builder()
        .client_for("127.0.0.1", port)
        .call_timeout(call_timeout)
        .start()
        .await
        .expect("start client system")
}

#[derive(Debug, PartialEq)]
pub struct EchoActor {
    id: ActorId,
}

impl EchoActor {
    pub fn new(id: ActorId) -> EchoActor {
        EchoActor { id }
    }
}

#[async_trait]
impl Actor for EchoActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    async fn accept(
        &self,
        target: &str,
        decoder: &mut InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), RemoteErr> {
        match target {
            "echo" => {
                let message: String = decoder.next_arg()?;
                handler.on_return(&message).await
            }
            "sleep" => {
                let millis: u64 = decoder.next_arg()?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
                handler.on_return_void().await
            }
            "fail" => Err(RemoteErr::RemoteTarget {
                kind: "testFailure".to_string(),
                message: "the echo actor was asked to fail".to_string(),
            }),
            _ => Err(RemoteErr::UnknownTarget {
                target: target.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug)]
pub struct CounterActor {
    id: ActorId,
    pub count: AtomicI64,
}

impl CounterActor {
    pub fn new(id: ActorId) -> CounterActor {
        CounterActor {
            id,
            count: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl Actor for CounterActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    async fn accept(
        &self,
        target: &str,
        decoder: &mut InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), RemoteErr> {
        match target {
            "increment" => {
                let by: i64 = decoder.next_arg()?;
                self.count.fetch_add(by, Ordering::SeqCst);
                handler.on_return_void().await
            }
            "count" => handler.on_return(&self.count.load(Ordering::SeqCst)).await,
            _ => Err(RemoteErr::UnknownTarget {
                target: target.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Records that it has been poked; used to observe calls arriving from the
/// other side of the connection.
pub struct ProbeActor {
    id: ActorId,
    pub poked: Arc<AtomicBool>,
}

impl ProbeActor {
    pub fn new(id: ActorId, poked: Arc<AtomicBool>) -> ProbeActor {
        ProbeActor { id, poked }
    }
}

#[async_trait]
impl Actor for ProbeActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    async fn accept(
        &self,
        target: &str,
        _decoder: &mut InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), RemoteErr> {
        match target {
            "poke" => {
                self.poked.store(true, Ordering::SeqCst);
                handler.on_return_void().await
            }
            _ => Err(RemoteErr::UnknownTarget {
                target: target.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Pokes back any probe reference handed to it before acknowledging.
pub struct GreeterActor {
    id: ActorId,
}

impl GreeterActor {
    pub fn new(id: ActorId) -> GreeterActor {
        GreeterActor { id }
    }
}

#[async_trait]
impl Actor for GreeterActor {
    fn id(&self) -> &ActorId {
        &self.id
    }

    async fn accept(
        &self,
        target: &str,
        decoder: &mut InvocationDecoder,
        handler: ResultHandler,
    ) -> Result<(), RemoteErr> {
        match target {
            "register" => {
                let probe = decoder.next_actor_ref::<ProbeActor>()?;
                probe.call_void("poke", InvocationEncoder::new()).await?;
                handler.on_return_void().await
            }
            _ => Err(RemoteErr::UnknownTarget {
                target: target.to_string(),
            }),
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
