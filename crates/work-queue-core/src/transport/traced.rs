//! Logging decorator for transports.

use super::{
    CommitMessage, ErrorQueueStore, HeartBeatStore, MaintenanceStore, ReceiveMessages,
    RollbackMessage, SendMessages,
};
use crate::context::MessageContext;
use crate::error::QueueError;
use crate::message::{Message, MessageHeaders, MessageId, ReceivedMessage, Timestamp};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;

/// Wraps a transport and logs every operation with its duration.
///
/// The wrapper only observes; results are passed through unchanged.
#[derive(Debug, Clone)]
pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn log_result<V>(operation: &'static str, started: Instant, result: &Result<V, QueueError>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(_) => debug!(operation, elapsed_ms, "Transport operation completed"),
        Err(e) => warn!(
            operation,
            elapsed_ms,
            error = %e,
            transient = e.is_transient(),
            "Transport operation failed"
        ),
    }
}

#[async_trait]
impl<T: SendMessages> SendMessages for TracedTransport<T> {
    async fn send_message(&self, message: &Message) -> Result<MessageId, QueueError> {
        let started = Instant::now();
        let result = self.inner.send_message(message).await;
        log_result("send_message", started, &result);
        if let Ok(id) = &result {
            debug!(message_id = %id, body_len = message.body.len(), "Message sent");
        }
        result
    }

    async fn send_messages(&self, messages: &[Message]) -> Vec<Result<MessageId, QueueError>> {
        let started = Instant::now();
        let results = self.inner.send_messages(messages).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if failed > 0 {
            warn!(
                operation = "send_messages",
                elapsed_ms,
                count = messages.len(),
                failed,
                "Batch send completed with failures"
            );
        } else {
            debug!(
                operation = "send_messages",
                elapsed_ms,
                count = messages.len(),
                "Batch send completed"
            );
        }
        results
    }
}

#[async_trait]
impl<T: ReceiveMessages> ReceiveMessages for TracedTransport<T> {
    async fn receive_message(
        &self,
        context: &MessageContext,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let started = Instant::now();
        let result = self.inner.receive_message(context).await;
        log_result("receive_message", started, &result);
        if let Ok(Some(message)) = &result {
            debug!(
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "Message received"
            );
        }
        result
    }

    fn is_blocking_operation(&self) -> bool {
        self.inner.is_blocking_operation()
    }
}

#[async_trait]
impl<T: CommitMessage> CommitMessage for TracedTransport<T> {
    async fn delete_message(&self, message_id: &MessageId) -> Result<u64, QueueError> {
        let started = Instant::now();
        let result = self.inner.delete_message(message_id).await;
        log_result("delete_message", started, &result);
        result
    }
}

#[async_trait]
impl<T: RollbackMessage> RollbackMessage for TracedTransport<T> {
    async fn rollback_message(
        &self,
        message_id: &MessageId,
        delay: Option<Duration>,
    ) -> Result<u64, QueueError> {
        let started = Instant::now();
        let result = self.inner.rollback_message(message_id, delay).await;
        log_result("rollback_message", started, &result);
        debug!(
            message_id = %message_id,
            delay_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(0),
            "Message rolled back"
        );
        result
    }
}

#[async_trait]
impl<T: HeartBeatStore> HeartBeatStore for TracedTransport<T> {
    async fn send_heart_beat(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Timestamp>, QueueError> {
        let started = Instant::now();
        let result = self.inner.send_heart_beat(message_id).await;
        log_result("send_heart_beat", started, &result);
        if let Ok(None) = &result {
            warn!(message_id = %message_id, "Heartbeat updated no rows");
        }
        result
    }

    async fn find_messages_to_reset(
        &self,
        stale_before: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<(MessageId, MessageHeaders)>, QueueError> {
        let started = Instant::now();
        let result = self.inner.find_messages_to_reset(stale_before, cancel).await;
        log_result("find_messages_to_reset", started, &result);
        result
    }

    async fn reset_heart_beat(
        &self,
        message_id: &MessageId,
        stale_before: Timestamp,
    ) -> Result<u64, QueueError> {
        let started = Instant::now();
        let result = self.inner.reset_heart_beat(message_id, stale_before).await;
        log_result("reset_heart_beat", started, &result);
        result
    }

    fn is_heart_beat_configured(&self) -> bool {
        self.inner.is_heart_beat_configured()
    }
}

#[async_trait]
impl<T: ErrorQueueStore> ErrorQueueStore for TracedTransport<T> {
    async fn move_to_error_queue(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        message_id: &MessageId,
        headers: &MessageHeaders,
    ) -> Result<(), QueueError> {
        let started = Instant::now();
        let result = self
            .inner
            .move_to_error_queue(error, message_id, headers)
            .await;
        log_result("move_to_error_queue", started, &result);
        result
    }

    async fn get_error_retry_count(
        &self,
        error_type: &str,
        message_id: &MessageId,
    ) -> Result<u32, QueueError> {
        let started = Instant::now();
        let result = self.inner.get_error_retry_count(error_type, message_id).await;
        log_result("get_error_retry_count", started, &result);
        result
    }

    async fn set_error_count(
        &self,
        error_type: &str,
        message_id: &MessageId,
    ) -> Result<(), QueueError> {
        let started = Instant::now();
        let result = self.inner.set_error_count(error_type, message_id).await;
        log_result("set_error_count", started, &result);
        result
    }
}

#[async_trait]
impl<T: MaintenanceStore> MaintenanceStore for TracedTransport<T> {
    async fn find_expired_messages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError> {
        let started = Instant::now();
        let result = self.inner.find_expired_messages(cancel).await;
        log_result("find_expired_messages", started, &result);
        result
    }

    async fn find_error_messages_to_delete(
        &self,
        older_than: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError> {
        let started = Instant::now();
        let result = self
            .inner
            .find_error_messages_to_delete(older_than, cancel)
            .await;
        log_result("find_error_messages_to_delete", started, &result);
        result
    }

    async fn delete_error_message(&self, message_id: &MessageId) -> Result<u64, QueueError> {
        let started = Instant::now();
        let result = self.inner.delete_error_message(message_id).await;
        log_result("delete_error_message", started, &result);
        result
    }

    fn is_maintenance_configured(&self) -> bool {
        self.inner.is_maintenance_configured()
    }
}
