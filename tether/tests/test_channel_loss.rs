use std::time::Duration;
use tether::actor::{ActorId, RemoteErr};
use tether::invocation::InvocationEncoder;

mod util;

#[tokio::test]
pub async fn test_channel_loss_fails_inflight_calls() {
    util::create_trace_logger();

    let server = util::create_server(Duration::from_secs(5)).await;
    let port = server.local_port().expect("server port");
    let _echo = server.make_actor_with_id("echo", util::EchoActor::new);

    let client = util::create_client(port, Duration::from_secs(5)).await;
    let echo_id = ActorId::new(Some(server.node_id()), "echo");

    let mut calls = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        let echo_id = echo_id.clone();

        calls.push(tokio::spawn(async move {
            let mut invocation = InvocationEncoder::new();
            invocation.put_arg(&10_000u64).unwrap();
            client.remote_call_void(&echo_id, "sleep", invocation).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.inflight_remote_request_count(), 3);

    // the channel drops mid-flight
    server.shutdown_gracefully().await;

    for call in calls {
        let result = call.await.expect("caller task");
        assert!(
            matches!(result, Err(RemoteErr::NoChannelToNode { .. })),
            "expected a channel error, got {:?}",
            result
        );
    }

    assert_eq!(client.inflight_remote_request_count(), 0);

    client.shutdown_gracefully().await;
}
