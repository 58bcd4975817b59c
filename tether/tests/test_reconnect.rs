use std::time::Duration;
use tether::actor::{ActorId, NodeId, RemoteErr};
use tether::invocation::InvocationEncoder;
use tether::net::client::ReconnectConfig;
use tether::system::ActorSystem;
use tokio::net::TcpListener;

mod util;

async fn reserve_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("reserve port");
    listener.local_addr().expect("local addr").port()
}

#[tokio::test]
pub async fn test_exhausted_reconnects_fail_the_call() {
    util::create_trace_logger();

    let dead_port = reserve_port().await;

    let client = ActorSystem::builder()
        .client_for("127.0.0.1", dead_port)
        .call_timeout(Duration::from_secs(5))
        .reconnect(ReconnectConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
        })
        .start()
        .await
        .expect("start client system");

    let target = ActorId::new(Some(NodeId::random()), "echo");
    let result = client
        .remote_call::<String>(&target, "echo", InvocationEncoder::new())
        .await;

    assert!(
        matches!(result, Err(RemoteErr::NoChannelToNode { .. })),
        "expected a channel error, got {:?}",
        result
    );

    client.shutdown_gracefully().await;
}

#[tokio::test]
pub async fn test_client_connects_once_the_server_is_up() {
    util::create_trace_logger();

    let port = reserve_port().await;

    let client = ActorSystem::builder()
        .client_for("127.0.0.1", port)
        .call_timeout(Duration::from_secs(5))
        .reconnect(ReconnectConfig {
            max_attempts: 20,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
        })
        .start()
        .await
        .expect("start client system");

    // let the client burn through a few failed attempts first
    tokio::time::sleep(Duration::from_millis(200)).await;

    let server = util::create_server_on(port, Duration::from_secs(5)).await;
    let _echo = server.make_actor_with_id("echo", util::EchoActor::new);
    let echo_id = ActorId::new(Some(server.node_id()), "echo");

    let mut invocation = InvocationEncoder::new();
    invocation.put_arg(&"hello".to_string()).unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        client.remote_call::<String>(&echo_id, "echo", invocation),
    )
    .await
    .expect("call completes after the backoff window");

    assert_eq!(result, Ok("hello".to_string()));

    client.shutdown_gracefully().await;
    server.shutdown_gracefully().await;
}
