use crate::context::MessageContext;
use crate::error::{HandlerError, HandlerPanic, PoisonMessageError, ProcessingError};
use crate::error_handling::{ReceiveMessagesError, ReceiveMessagesErrorResult, ReceivePoisonMessage};
use crate::handler::MessageHandler;
use crate::heartbeat::{HeartBeatHandle, HeartBeatWorker};
use crate::transport::{CommitMessage, RollbackMessage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs the handler for one message and settles the outcome.
///
/// Settling is exactly one of: commit, rollback with delay, or a move to the
/// error queue.
pub(crate) struct MessageProcessor {
    pub(crate) handler: Arc<dyn MessageHandler>,
    pub(crate) commit: Arc<dyn CommitMessage>,
    pub(crate) rollback: Arc<dyn RollbackMessage>,
    pub(crate) receive_error: ReceiveMessagesError,
    pub(crate) poison: ReceivePoisonMessage,
    pub(crate) heart_beat: Option<HeartBeatWorker>,
}

impl MessageProcessor {
    /// Begin renewing the lease of a message that was just claimed. Must
    /// be called before the message waits for a scheduler slot.
    pub(crate) fn start_heart_beat(&self, context: &Arc<MessageContext>) -> Option<HeartBeatHandle> {
        self.heart_beat
            .as_ref()
            .and_then(|worker| worker.start(context.clone()))
    }

    pub(crate) async fn process(
        &self,
        context: Arc<MessageContext>,
        heart_beat: Option<HeartBeatHandle>,
    ) {
        let Some(message) = context.message() else {
            context.dispose();
            return;
        };
        let message_id = message.message_id.clone();

        let handler = self.handler.clone();
        let notification = context.worker_notification().clone();
        let outcome = match tokio::spawn(async move { handler.handle(&message, &notification).await })
            .await
        {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let panic = HandlerPanic::from_join_error(join_error);
                error!(message_id = %message_id, panic = %panic, "Message handler panicked");
                Err(HandlerError::from_panic(panic).into())
            }
        };

        if let Some(heart_beat) = heart_beat {
            heart_beat.stop().await;
        }

        match outcome {
            Ok(()) => self.commit(&context).await,
            Err(ProcessingError::Handler(failure)) => self.handler_failed(&context, failure).await,
            Err(ProcessingError::Poison(poison)) => self.poisoned(&context, poison).await,
        }

        context.dispose();
    }

    /// Quarantine a message the transport could not decode
    pub(crate) async fn poisoned(&self, context: &MessageContext, poison: PoisonMessageError) {
        if let Err(e) = self.poison.handle(context, &poison).await {
            error!(
                message_id = %context.message_id(),
                error = %e,
                "Failed to move poison message to the error queue"
            );
        }
    }

    async fn commit(&self, context: &MessageContext) {
        let message_id = context.message_id();
        match self.commit.delete_message(&message_id).await {
            Ok(0) => warn!(message_id = %message_id, "Commit affected no rows"),
            Ok(_) => {
                debug!(message_id = %message_id, "Message committed");
                context.raise_commit();
            }
            Err(e) => error!(message_id = %message_id, error = %e, "Failed to commit message"),
        }
    }

    async fn handler_failed(&self, context: &MessageContext, failure: HandlerError) {
        let message_id = context.message_id();
        warn!(
            message_id = %message_id,
            error_type = %failure.error_type(),
            error = %failure,
            "Message handler failed"
        );

        match self
            .receive_error
            .message_failed_processing(context, &failure)
            .await
        {
            Ok(ReceiveMessagesErrorResult::Retry) => {
                self.roll_back(context, context.queue_delay()).await
            }
            Ok(ReceiveMessagesErrorResult::Error) => {}
            Ok(ReceiveMessagesErrorResult::NoActionPossible) => {}
            Err(e) => {
                error!(
                    message_id = %message_id,
                    error = %e,
                    "Failed to classify handler error; rolling back"
                );
                self.roll_back(context, None).await
            }
        }
    }

    async fn roll_back(&self, context: &MessageContext, delay: Option<std::time::Duration>) {
        let message_id = context.message_id();
        match self.rollback.rollback_message(&message_id, delay).await {
            Ok(rows) => {
                info!(
                    message_id = %message_id,
                    rows,
                    delay_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(0),
                    "Message rolled back"
                );
                context.raise_rollback();
            }
            Err(e) => error!(message_id = %message_id, error = %e, "Failed to roll back message"),
        }
    }
}
