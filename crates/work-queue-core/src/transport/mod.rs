//! Transport contracts consumed by the engine.
//!
//! A transport is the durable store behind a queue (relational table, Redis
//! keys, in-memory map). The engine never touches storage directly; it talks
//! to one trait per capability. Every ownership decision (lease ownership,
//! retry counts, status) is made by the transport with atomic conditional
//! updates, so the engine holds no cross-worker locks on message state.
//!
//! Cross-cutting behaviour is added by wrapping a transport in another type
//! implementing the same traits; see [`TracedTransport`].

use crate::context::MessageContext;
use crate::error::QueueError;
use crate::message::{Message, MessageHeaders, MessageId, ReceivedMessage, Timestamp};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod traced;

pub use traced::TracedTransport;

/// Enqueue messages
#[async_trait]
pub trait SendMessages: Send + Sync {
    /// Send single message, returning its transport identifier
    async fn send_message(&self, message: &Message) -> Result<MessageId, QueueError>;

    /// Send a batch; one failure never aborts the remaining messages
    async fn send_messages(&self, messages: &[Message]) -> Vec<Result<MessageId, QueueError>> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            results.push(self.send_message(message).await);
        }
        results
    }
}

/// Dequeue messages
#[async_trait]
pub trait ReceiveMessages: Send + Sync {
    /// Claim the next available message, if any.
    ///
    /// Claiming atomically marks the message as processing and starts its
    /// heartbeat lease. A message whose headers cannot be decoded is reported
    /// as [`QueueError::PoisonMessage`].
    async fn receive_message(
        &self,
        context: &MessageContext,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Whether `receive_message` waits for work instead of returning
    /// immediately when the queue is empty
    fn is_blocking_operation(&self) -> bool {
        false
    }
}

/// Remove a successfully processed message
#[async_trait]
pub trait CommitMessage: Send + Sync {
    /// Delete the message; returns rows affected
    async fn delete_message(&self, message_id: &MessageId) -> Result<u64, QueueError>;
}

/// Release a message for redelivery
#[async_trait]
pub trait RollbackMessage: Send + Sync {
    /// Return the message to the waiting state, optionally hidden for `delay`
    async fn rollback_message(
        &self,
        message_id: &MessageId,
        delay: Option<Duration>,
    ) -> Result<u64, QueueError>;
}

/// Heartbeat lease storage
#[async_trait]
pub trait HeartBeatStore: Send + Sync {
    /// Renew the lease; `None` when no row was updated
    async fn send_heart_beat(&self, message_id: &MessageId)
        -> Result<Option<Timestamp>, QueueError>;

    /// Processing messages whose lease is older than `stale_before`
    async fn find_messages_to_reset(
        &self,
        stale_before: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<(MessageId, MessageHeaders)>, QueueError>;

    /// Conditionally return a stale message to the waiting state.
    ///
    /// Only succeeds (returns 1) if the lease is still older than
    /// `stale_before` at the time of the update.
    async fn reset_heart_beat(
        &self,
        message_id: &MessageId,
        stale_before: Timestamp,
    ) -> Result<u64, QueueError>;

    /// Whether a backing store is configured at all
    fn is_heart_beat_configured(&self) -> bool {
        true
    }
}

/// Error queue and per-type retry counters
#[async_trait]
pub trait ErrorQueueStore: Send + Sync {
    /// Move the message to the error queue, recording the failure
    async fn move_to_error_queue(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        message_id: &MessageId,
        headers: &MessageHeaders,
    ) -> Result<(), QueueError>;

    /// Failures already recorded for (`error_type`, `message_id`)
    async fn get_error_retry_count(
        &self,
        error_type: &str,
        message_id: &MessageId,
    ) -> Result<u32, QueueError>;

    /// Increment the failure count for (`error_type`, `message_id`)
    async fn set_error_count(&self, error_type: &str, message_id: &MessageId)
        -> Result<(), QueueError>;
}

/// Queries used by the purge monitors
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn find_expired_messages(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError>;

    async fn find_error_messages_to_delete(
        &self,
        older_than: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError>;

    /// Delete an error queue record; returns rows affected
    async fn delete_error_message(&self, message_id: &MessageId) -> Result<u64, QueueError>;

    /// Whether a backing store is configured at all
    fn is_maintenance_configured(&self) -> bool {
        true
    }
}

/// Every capability the consumer engine needs from one backing store
pub trait Transport:
    SendMessages
    + ReceiveMessages
    + CommitMessage
    + RollbackMessage
    + HeartBeatStore
    + ErrorQueueStore
    + MaintenanceStore
    + 'static
{
}

impl<T> Transport for T where
    T: SendMessages
        + ReceiveMessages
        + CommitMessage
        + RollbackMessage
        + HeartBeatStore
        + ErrorQueueStore
        + MaintenanceStore
        + 'static
{
}
