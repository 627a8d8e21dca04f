//! Ack state machine: guarantees exactly one ack-or-nack per delivery.
//!
//! Grounded on `kanin`'s `Acker` extractor (which `mem::take`s the delivery's acker so it can
//! only be consumed once) and its `Request`'s `Drop` impl, which nacks-with-requeue any
//! delivery that is dropped before being acked. Here the two ideas are merged into one type:
//! the state machine owns the acker for the delivery's whole lifetime and nacks on drop unless
//! something already resolved it.

use lapin::acker::Acker;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{error, warn};

/// Owns the [`Acker`] for one delivery and ensures it is resolved exactly once.
///
/// If this value is dropped while still unresolved - a panic unwinding through the dispatcher,
/// a bug that forgets to finalize it - the delivery is nacked with `requeue = true` so no
/// message is silently lost.
pub(crate) struct DeliveryState {
    acker: Option<Acker>,
    task_id: String,
}

impl DeliveryState {
    pub(crate) fn new(acker: Acker, task_id: impl Into<String>) -> Self {
        Self {
            acker: Some(acker),
            task_id: task_id.into(),
        }
    }

    /// Acknowledges the delivery, consuming this state. Idempotent: a second call is a no-op.
    pub(crate) async fn ack(&mut self) {
        if let Some(acker) = self.acker.take() {
            if let Err(err) = acker.ack(BasicAckOptions::default()).await {
                error!(task_id = %self.task_id, %err, "failed to ack delivery");
            }
        }
    }

    /// Negatively acknowledges the delivery, consuming this state.
    pub(crate) async fn nack(&mut self, requeue: bool) {
        if let Some(acker) = self.acker.take() {
            let options = BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            };
            if let Err(err) = acker.nack(options).await {
                error!(task_id = %self.task_id, %err, "failed to nack delivery");
            }
        }
    }

    /// Whether this delivery has already been resolved.
    pub(crate) fn is_resolved(&self) -> bool {
        self.acker.is_none()
    }
}

impl Drop for DeliveryState {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            warn!(
                task_id = %self.task_id,
                "delivery state dropped without being resolved, nacking with requeue"
            );
            tokio::spawn(async move {
                let _ = acker.nack(BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                }).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_resolved_reflects_taken_acker() {
        // `Acker` has no public no-op constructor outside `lapin` internals, so we only
        // exercise the bookkeeping path here; ack/nack wire behavior is covered by the
        // broker-backed integration tests.
        let state = DeliveryState {
            acker: None,
            task_id: "t1".into(),
        };
        assert!(state.is_resolved());
    }
}
