//! Retry or error-queue decision for failed handler invocations.

use crate::config::FrozenConfiguration;
use crate::context::MessageContext;
use crate::error::{HandlerError, QueueError};
use crate::transport::ErrorQueueStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a message after its handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMessagesErrorResult {
    /// The context carried no message identifier
    NoActionPossible,
    /// The message was moved to the error queue
    Error,
    /// The message should be rolled back and redelivered after the delay
    /// stored on the context
    Retry,
}

/// Classifies handler failures using the retry delay registry
pub struct ReceiveMessagesError {
    configuration: FrozenConfiguration,
    store: Arc<dyn ErrorQueueStore>,
}

impl ReceiveMessagesError {
    pub fn new(configuration: FrozenConfiguration, store: Arc<dyn ErrorQueueStore>) -> Self {
        Self {
            configuration,
            store,
        }
    }

    /// Decide whether a failed message is retried or moved to the error queue.
    ///
    /// On [`Retry`](ReceiveMessagesErrorResult::Retry) the redelivery delay
    /// for this attempt has been written to the context and the failure
    /// counter for the matched error type incremented. On
    /// [`Error`](ReceiveMessagesErrorResult::Error) the message has been moved
    /// and the context cleared.
    pub async fn message_failed_processing(
        &self,
        context: &MessageContext,
        failure: &HandlerError,
    ) -> Result<ReceiveMessagesErrorResult, QueueError> {
        let message_id = context.message_id();
        if !message_id.has_value() {
            warn!(error = %failure, "Handler failed for a message without an identifier");
            return Ok(ReceiveMessagesErrorResult::NoActionPossible);
        }

        let info = self.configuration.retry_delay().retry_information(failure);
        let matched = match info.error_type() {
            Some(matched) if info.max_retries() > 0 => matched,
            _ => {
                self.move_to_error_queue(context, failure).await?;
                return Ok(ReceiveMessagesErrorResult::Error);
            }
        };

        let count = self
            .store
            .get_error_retry_count(matched.name(), &message_id)
            .await?;

        if count >= info.max_retries() {
            info!(
                message_id = %message_id,
                error_type = %matched,
                attempts = count,
                "Retry limit reached"
            );
            self.move_to_error_queue(context, failure).await?;
            return Ok(ReceiveMessagesErrorResult::Error);
        }

        if let Some(delay) = info.delay_for(count) {
            context.set_queue_delay(delay)?;
        }
        self.store.set_error_count(matched.name(), &message_id).await?;

        info!(
            message_id = %message_id,
            error_type = %failure.error_type(),
            matched_type = %matched,
            attempt = count + 1,
            max_retries = info.max_retries(),
            "Message will be retried"
        );
        Ok(ReceiveMessagesErrorResult::Retry)
    }

    async fn move_to_error_queue(
        &self,
        context: &MessageContext,
        failure: &HandlerError,
    ) -> Result<(), QueueError> {
        let message_id = context.message_id();
        self.store
            .move_to_error_queue(failure, &message_id, &context.headers())
            .await?;
        context.clear_message();
        error!(
            message_id = %message_id,
            error_type = %failure.error_type(),
            error = %failure,
            "Message moved to the error queue"
        );
        Ok(())
    }
}
