//! Single-assignment slot for a background answer.
//!
//! [`PendingReply::channel`] returns the write half, handed to the task that
//! runs the backend call, and the read half, parked on the session. The
//! reply can be taken exactly once. If the writer disappears without
//! writing (the task panicked or was aborted) the reader yields a failure
//! reply instead, so a session never stays stuck waiting.

use crate::oracle::Reply;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::Instant;

/// Write half of a pending reply.
#[derive(Debug)]
pub struct ReplySender {
    tx: oneshot::Sender<Reply>,
}

impl ReplySender {
    /// Complete the slot. Returns `false` if nobody will ever read it,
    /// e.g. because the session was evicted in the meantime.
    pub fn send(self, reply: Reply) -> bool {
        self.tx.send(reply).is_ok()
    }
}

/// Read half of a pending reply.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
    started_at: Instant,
    abandoned_text: String,
}

impl PendingReply {
    /// Create a connected sender/reader pair. `abandoned_text` is delivered
    /// if the sender is dropped without a reply.
    pub fn channel(abandoned_text: impl Into<String>) -> (ReplySender, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (
            ReplySender { tx },
            PendingReply {
                rx,
                started_at: Instant::now(),
                abandoned_text: abandoned_text.into(),
            },
        )
    }

    /// Time since the computation was started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Non-blocking check. `Some` at most once per completed computation.
    pub fn try_take(&mut self) -> Option<Reply> {
        match self.rx.try_recv() {
            Ok(reply) => Some(reply),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(self.abandoned()),
        }
    }

    /// Wait up to `bound` for the reply.
    pub async fn wait(&mut self, bound: Duration) -> Option<Reply> {
        match tokio::time::timeout(bound, &mut self.rx).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(_)) => Some(self.abandoned()),
            Err(_) => None,
        }
    }

    fn abandoned(&self) -> Reply {
        tracing::warn!(
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Background answer task ended without a reply"
        );
        Reply::new(self.abandoned_text.clone(), "")
    }
}
