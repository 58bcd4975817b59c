use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether::actor::{CallId, RemoteErr};
use tether::net::ChannelId;
use tether::reply::{Continuation, PendingReplies};

#[tokio::test]
pub async fn test_continuation_times_out() {
    let (_continuation, rx) = Continuation::<Vec<u8>>::create(
        Duration::from_millis(50),
        RemoteErr::Timeout {
            time_taken_millis: 50,
        },
    );

    assert_eq!(
        rx.await.unwrap(),
        Err(RemoteErr::Timeout {
            time_taken_millis: 50
        })
    );
}

#[tokio::test]
pub async fn test_continuation_resume_is_idempotent() {
    let (continuation, rx) = Continuation::create(
        Duration::from_secs(5),
        RemoteErr::Timeout {
            time_taken_millis: 5000,
        },
    );

    continuation.resume_returning(vec![1]);
    continuation.resume_returning(vec![2]);
    continuation.resume_throwing(RemoteErr::NoPeers);

    assert_eq!(rx.await.unwrap(), Ok(vec![1]));
}

#[tokio::test]
pub async fn test_resume_beats_a_pending_timer() {
    let (continuation, rx) = Continuation::create(
        Duration::from_millis(50),
        RemoteErr::Timeout {
            time_taken_millis: 50,
        },
    );

    continuation.resume_returning(vec![9]);
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(rx.await.unwrap(), Ok(vec![9]));
}

#[tokio::test]
pub async fn test_reply_resumes_the_caller() {
    let replies = Arc::new(PendingReplies::new(Duration::from_secs(5)));

    let replies_for_reply = replies.clone();
    let result = replies
        .send_message(ChannelId::random(), |call_id| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                replies_for_reply.received_reply(call_id, b"hi".to_vec());
            });

            async { Ok(()) }
        })
        .await;

    assert_eq!(result, Ok(b"hi".to_vec()));
    assert_eq!(replies.inflight_count(), 0);
}

#[tokio::test]
pub async fn test_transmit_failure_removes_the_slot() {
    let replies = PendingReplies::new(Duration::from_secs(5));

    let result = replies
        .send_message(ChannelId::random(), |_call_id| async {
            Err::<(), RemoteErr>(RemoteErr::NoPeers)
        })
        .await;

    assert_eq!(result, Err(RemoteErr::NoPeers));
    assert_eq!(replies.inflight_count(), 0);
}

#[tokio::test]
pub async fn test_late_reply_is_dropped() {
    let replies = Arc::new(PendingReplies::new(Duration::from_millis(50)));

    let captured: Arc<Mutex<Option<CallId>>> = Arc::new(Mutex::new(None));
    let captured_inner = captured.clone();

    let result = replies
        .send_message(ChannelId::random(), |call_id| {
            *captured_inner.lock().unwrap() = Some(call_id);
            async { Ok(()) }
        })
        .await;

    assert_eq!(
        result,
        Err(RemoteErr::Timeout {
            time_taken_millis: 50
        })
    );
    assert_eq!(replies.inflight_count(), 0);

    // the reply arriving after the timeout has nobody to wake
    let call_id = captured.lock().unwrap().take().unwrap();
    replies.received_reply(call_id, vec![1]);
    assert_eq!(replies.inflight_count(), 0);
}

#[tokio::test]
pub async fn test_cancelled_caller_removes_the_slot() {
    let replies = Arc::new(PendingReplies::new(Duration::from_secs(5)));

    let captured: Arc<Mutex<Option<CallId>>> = Arc::new(Mutex::new(None));
    let captured_inner = captured.clone();

    let replies_for_task = replies.clone();
    let caller = tokio::spawn(async move {
        replies_for_task
            .send_message(ChannelId::random(), |call_id| {
                *captured_inner.lock().unwrap() = Some(call_id);
                async { Ok(()) }
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(replies.inflight_count(), 1);

    caller.abort();
    let _ = caller.await;
    assert_eq!(replies.inflight_count(), 0);

    let call_id = captured.lock().unwrap().take().unwrap();
    replies.received_reply(call_id, vec![1]);
    assert_eq!(replies.inflight_count(), 0);
}

#[tokio::test]
pub async fn test_fail_all_is_scoped_to_the_channel() {
    let replies = Arc::new(PendingReplies::new(Duration::from_secs(5)));
    let channel_a = ChannelId::random();
    let channel_b = ChannelId::random();

    let replies_a = replies.clone();
    let call_a = tokio::spawn(async move {
        replies_a
            .send_message(channel_a, |_call_id| async { Ok(()) })
            .await
    });

    let replies_b = replies.clone();
    let call_b = tokio::spawn(async move {
        replies_b
            .send_message(channel_b, |_call_id| async { Ok(()) })
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(replies.inflight_count(), 2);

    replies.fail_all_for(channel_a, RemoteErr::NoChannelToNode { node_id: None });
    assert_eq!(
        call_a.await.unwrap(),
        Err(RemoteErr::NoChannelToNode { node_id: None })
    );
    assert_eq!(replies.inflight_count(), 1);

    replies.fail_all(RemoteErr::NoPeers);
    assert_eq!(call_b.await.unwrap(), Err(RemoteErr::NoPeers));
    assert_eq!(replies.inflight_count(), 0);
}
