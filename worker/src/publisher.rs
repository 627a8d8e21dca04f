//! Publishes callbacks to the outgoing queue on a single ordered channel.
//!
//! Non-terminal (`running`, progress) callbacks are fire-and-forget: a publish failure is
//! logged and dropped rather than retried, since a later terminal callback will supersede it
//! anyway. Terminal callbacks are awaited with a publisher confirm and retried with exponential
//! backoff and jitter, grounded on the same retry shape `ouroboros-tasks::retry::RetryPolicy`
//! uses, since losing a terminal callback means the caller never learns the task finished.

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use tracing::{error, warn};

use crate::codec;
use crate::error::PublishError;
use crate::model::TaskCallback;
use crate::retry::RetryPolicy;

/// `delivery_mode = 2` per the AMQP 0-9-1 spec: the broker persists the message to disk so it
/// survives a restart. Every outgoing callback is published this way.
fn callback_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2)
}

/// Publishes callbacks onto a single channel, preserving per-connection publish order.
pub(crate) struct Publisher {
    channel: Channel,
    out_queue: String,
    retry_policy: RetryPolicy,
}

impl Publisher {
    /// Builds a publisher over a channel already placed into confirm mode.
    pub(crate) async fn new(channel: Channel, out_queue: impl Into<String>) -> Result<Self, PublishError> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self {
            channel,
            out_queue: out_queue.into(),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Publishes a non-terminal callback without waiting for a confirm. Failures are logged and
    /// swallowed.
    pub(crate) async fn publish_progress(&self, callback: &TaskCallback) {
        let payload = codec::encode(callback);
        if let Err(err) = self
            .channel
            .basic_publish(
                "",
                &self.out_queue,
                BasicPublishOptions::default(),
                &payload,
                callback_properties(),
            )
            .await
        {
            warn!(task_id = %callback.task_id, %err, "failed to publish progress callback, dropping");
        }
    }

    /// Publishes a terminal callback, retrying with backoff until the broker confirms it or the
    /// retry budget is exhausted.
    pub(crate) async fn publish_terminal(&self, callback: &TaskCallback) -> Result<(), PublishError> {
        let payload = codec::encode(callback);
        let mut attempt = 0;
        loop {
            let delay = self.retry_policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.try_publish_confirmed(&payload).await {
                Ok(true) => return Ok(()),
                Ok(false) | Err(_) => {
                    attempt += 1;
                    if attempt > self.retry_policy.max_retries {
                        error!(
                            task_id = %callback.task_id,
                            attempts = attempt,
                            "giving up on terminal callback publish"
                        );
                        return Err(PublishError::ConfirmTimedOut { attempts: attempt });
                    }
                    warn!(
                        task_id = %callback.task_id,
                        attempt,
                        "terminal callback publish failed, retrying"
                    );
                }
            }
        }
    }

    /// Publishes and awaits the confirm, returning whether the broker acked it. Transport
    /// errors surface as `Ok(false)` too, treated the same as a broker-side nack: retry.
    async fn try_publish_confirmed(&self, payload: &[u8]) -> Result<bool, PublishError> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                &self.out_queue,
                BasicPublishOptions::default(),
                payload,
                callback_properties(),
            )
            .await?
            .await?;

        Ok(matches!(confirm, Confirmation::Ack(_) | Confirmation::NotRequested))
    }

    /// Declares the outgoing queue as durable, matching the incoming queue's durability.
    pub(crate) async fn declare_out_queue(&self) -> Result<(), lapin::Error> {
        self.channel
            .queue_declare(
                &self.out_queue,
                lapin::options::QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}
