use crate::actor::{CallId, RemoteErr};
use crate::net::ChannelId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// One-shot result slot with a timeout.
///
/// Exactly one completion reaches the awaiter: the first of
/// `resume_returning`, `resume_throwing` and the internal timer wins, later
/// resumes are no-ops.
pub struct Continuation<T: Send + 'static> {
    slot: Mutex<Option<oneshot::Sender<Result<T, RemoteErr>>>>,
    timer: CancellationToken,
}

impl<T: Send + 'static> Continuation<T> {
    /// Creates the slot and starts its timer; if the timer fires before a
    /// resume, the awaiter receives `timeout_err`.
    pub fn create(
        timeout: Duration,
        timeout_err: RemoteErr,
    ) -> (Arc<Continuation<T>>, oneshot::Receiver<Result<T, RemoteErr>>) {
        let (tx, rx) = oneshot::channel();
        let continuation = Arc::new(Continuation {
            slot: Mutex::new(Some(tx)),
            timer: CancellationToken::new(),
        });

        let slot = continuation.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = slot.timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    slot.complete(Err(timeout_err));
                }
            }
        });

        (continuation, rx)
    }

    pub fn resume_returning(&self, value: T) {
        self.complete(Ok(value));
    }

    pub fn resume_throwing(&self, err: RemoteErr) {
        self.complete(Err(err));
    }

    fn complete(&self, result: Result<T, RemoteErr>) {
        let slot = self.slot.lock().take();
        if let Some(tx) = slot {
            self.timer.cancel();
            let _ = tx.send(result);
        }
    }
}

struct PendingReply {
    continuation: Arc<Continuation<Vec<u8>>>,
    channel_id: ChannelId,
}

/// Table of in-flight calls awaiting replies, keyed by [`CallId`].
///
/// Every allocated call id is resumed exactly once - by a reply, the call
/// timeout, or channel failure - and its entry is removed before
/// [`PendingReplies::send_message`] returns to the caller.
pub struct PendingReplies {
    entries: Mutex<HashMap<CallId, PendingReply>>,
    call_timeout: Duration,
}

impl PendingReplies {
    pub fn new(call_timeout: Duration) -> PendingReplies {
        PendingReplies {
            entries: Mutex::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Allocates a call id, installs a reply slot bound to `channel_id`,
    /// transmits via `send` and suspends until the slot completes.
    ///
    /// The slot is removed when the reply arrives, the timeout fires, `send`
    /// errors, or the awaiting task is cancelled, so a late reply can never
    /// resume a dead waiter.
    pub async fn send_message<F, Fut>(
        &self,
        channel_id: ChannelId,
        send: F,
    ) -> Result<Vec<u8>, RemoteErr>
    where
        F: FnOnce(CallId) -> Fut,
        Fut: Future<Output = Result<(), RemoteErr>>,
    {
        let call_id = CallId::random();
        let (continuation, rx) = Continuation::create(
            self.call_timeout,
            RemoteErr::Timeout {
                time_taken_millis: self.call_timeout.as_millis() as u64,
            },
        );

        self.entries.lock().insert(
            call_id,
            PendingReply {
                continuation,
                channel_id,
            },
        );

        let _removed = RemoveOnDrop {
            table: self,
            call_id,
        };

        trace!(target: "PendingReplies", call_id = %call_id, "slot installed, transmitting");
        send(call_id).await?;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RemoteErr::ResultChannelClosed),
        }
    }

    /// Hands reply bytes to the caller suspended on `call_id`. A reply for an
    /// unknown call (late, after timeout or cancellation) is logged and
    /// dropped.
    pub fn received_reply(&self, call_id: CallId, bytes: Vec<u8>) {
        let entry = self.entries.lock().remove(&call_id);
        match entry {
            Some(entry) => entry.continuation.resume_returning(bytes),
            None => {
                debug!(
                    target: "PendingReplies",
                    call_id = %call_id,
                    "{}",
                    RemoteErr::MissingReplyContinuation { call_id }
                );
            }
        }
    }

    /// Fails the caller suspended on `call_id` with `err`.
    pub fn received_error(&self, call_id: CallId, err: RemoteErr) {
        let entry = self.entries.lock().remove(&call_id);
        match entry {
            Some(entry) => entry.continuation.resume_throwing(err),
            None => {
                debug!(
                    target: "PendingReplies",
                    call_id = %call_id,
                    "{}",
                    RemoteErr::MissingReplyContinuation { call_id }
                );
            }
        }
    }

    /// Fails every outstanding call with `err`.
    pub fn fail_all(&self, err: RemoteErr) {
        let entries: Vec<PendingReply> = {
            let mut entries = self.entries.lock();
            entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in entries {
            entry.continuation.resume_throwing(err.clone());
        }
    }

    /// Fails every outstanding call bound to `channel_id` with `err`.
    pub fn fail_all_for(&self, channel_id: ChannelId, err: RemoteErr) {
        let entries: Vec<PendingReply> = {
            let mut entries = self.entries.lock();
            let call_ids: Vec<CallId> = entries
                .iter()
                .filter(|(_, entry)| entry.channel_id == channel_id)
                .map(|(call_id, _)| *call_id)
                .collect();

            call_ids
                .into_iter()
                .filter_map(|call_id| entries.remove(&call_id))
                .collect()
        };

        if !entries.is_empty() {
            debug!(
                target: "PendingReplies",
                channel_id = %channel_id,
                count = entries.len(),
                "failing calls bound to terminated channel"
            );
        }

        for entry in entries {
            entry.continuation.resume_throwing(err.clone());
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.entries.lock().len()
    }
}

struct RemoveOnDrop<'a> {
    table: &'a PendingReplies,
    call_id: CallId,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        self.table.entries.lock().remove(&self.call_id);
    }
}
