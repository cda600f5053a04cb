//! Quarantine of messages that cannot be processed at all.

use crate::context::MessageContext;
use crate::error::{PoisonMessageError, QueueError};
use crate::transport::ErrorQueueStore;
use std::sync::Arc;
use tracing::error;

/// Moves poison messages to the error queue without retry accounting
pub struct ReceivePoisonMessage {
    store: Arc<dyn ErrorQueueStore>,
}

impl ReceivePoisonMessage {
    pub fn new(store: Arc<dyn ErrorQueueStore>) -> Self {
        Self { store }
    }

    /// Quarantine the context's message. Does nothing when the context has
    /// no message identifier.
    pub async fn handle(
        &self,
        context: &MessageContext,
        poison: &PoisonMessageError,
    ) -> Result<(), QueueError> {
        let message_id = context.message_id();
        if !message_id.has_value() {
            return Ok(());
        }

        self.store
            .move_to_error_queue(poison, &message_id, &context.headers())
            .await?;
        context.clear_message();

        error!(
            message_id = %message_id,
            reason = poison.reason(),
            "Poison message moved to the error queue"
        );
        Ok(())
    }
}
