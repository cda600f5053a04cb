//! In-memory transport implementation for testing and development.
//!
//! This module provides a fully functional in-memory store that:
//! - Tracks message status, heartbeat leases and redelivery delays
//! - Applies every ownership change as a conditional update under one lock
//! - Keeps an error queue with the recorded failure reason
//! - Persists per error type retry counters across redelivery
//!
//! It is intended for unit and integration tests, local development, and as
//! the reference for what a durable transport has to guarantee.

use crate::context::{lock, MessageContext};
use crate::error::QueueError;
use crate::message::{
    headers, CorrelationId, Message, MessageHeaders, MessageId, QueueStatus, ReceivedMessage,
    Timestamp,
};
use crate::transport::{
    CommitMessage, ErrorQueueStore, HeartBeatStore, MaintenanceStore, ReceiveMessages,
    RollbackMessage, SendMessages,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Configuration for the in-memory transport
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum stored messages; 0 means unbounded
    pub max_queue_size: usize,
    /// Whether heartbeat and maintenance storage report as configured
    pub configured: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 0,
            configured: true,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct QueueStorage {
    messages: HashMap<MessageId, StoredMessage>,
    error_queue: HashMap<MessageId, ErrorRecord>,
    error_counts: HashMap<(String, MessageId), u32>,
    next_sequence: u64,
}

/// A message stored in the queue with its processing metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    headers: MessageHeaders,
    correlation_id: Option<CorrelationId>,
    enqueued_at: Timestamp,
    delivery_count: u32,
    available_at: Timestamp,
    expires_at: Option<Timestamp>,
    status: QueueStatus,
    heart_beat: Option<Timestamp>,
    sequence: u64,
}

impl StoredMessage {
    fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    fn is_available(&self, now: Timestamp) -> bool {
        self.status == QueueStatus::Waiting && now >= self.available_at && !self.is_expired(now)
    }

    fn is_stale(&self, stale_before: Timestamp) -> bool {
        self.status == QueueStatus::Processing
            && matches!(self.heart_beat, Some(beat) if beat < stale_before)
    }

    /// Headers that cannot be interpreted make the message undeliverable
    fn header_error(&self) -> Option<String> {
        match self.headers.get(headers::EXPIRATION) {
            Some(raw) if raw.parse::<Timestamp>().is_err() => Some(format!(
                "header '{}' is not a valid timestamp: {}",
                headers::EXPIRATION,
                raw
            )),
            _ => None,
        }
    }
}

/// A message moved to the error queue
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub message_id: MessageId,
    pub headers: MessageHeaders,
    pub body: Option<Bytes>,
    pub reason: String,
    pub moved_at: Timestamp,
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory transport implementing every engine capability
#[derive(Clone)]
pub struct InMemoryTransport {
    storage: Arc<Mutex<QueueStorage>>,
    config: InMemoryConfig,
}

impl InMemoryTransport {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(QueueStorage::default())),
            config,
        }
    }

    /// Current status of a message, `Error` once it sits in the error queue
    pub fn status(&self, message_id: &MessageId) -> Option<QueueStatus> {
        let storage = lock(&self.storage);
        if let Some(message) = storage.messages.get(message_id) {
            return Some(message.status);
        }
        storage
            .error_queue
            .get(message_id)
            .map(|_| QueueStatus::Error)
    }

    /// Number of messages not yet committed or moved to the error queue
    pub fn message_count(&self) -> usize {
        lock(&self.storage).messages.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.count_with_status(QueueStatus::Waiting)
    }

    pub fn processing_count(&self) -> usize {
        self.count_with_status(QueueStatus::Processing)
    }

    pub fn error_queue_len(&self) -> usize {
        lock(&self.storage).error_queue.len()
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        lock(&self.storage).error_queue.values().cloned().collect()
    }

    /// Times a message was delivered to a worker
    pub fn delivery_count(&self, message_id: &MessageId) -> Option<u32> {
        lock(&self.storage)
            .messages
            .get(message_id)
            .map(|m| m.delivery_count)
    }

    /// Last heartbeat recorded for a processing message
    pub fn heart_beat(&self, message_id: &MessageId) -> Option<Timestamp> {
        lock(&self.storage)
            .messages
            .get(message_id)
            .and_then(|m| m.heart_beat)
    }

    /// Shift a message's heartbeat into the past, as if its worker had died
    pub fn backdate_heart_beat(&self, message_id: &MessageId, by: Duration) -> bool {
        let mut storage = lock(&self.storage);
        match storage.messages.get_mut(message_id) {
            Some(message) => match message.heart_beat {
                Some(beat) => {
                    message.heart_beat = Some(beat.sub(by));
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Shift an error record's move time into the past
    pub fn backdate_error_record(&self, message_id: &MessageId, by: Duration) -> bool {
        let mut storage = lock(&self.storage);
        match storage.error_queue.get_mut(message_id) {
            Some(record) => {
                record.moved_at = record.moved_at.sub(by);
                true
            }
            None => false,
        }
    }

    fn count_with_status(&self, status: QueueStatus) -> usize {
        lock(&self.storage)
            .messages
            .values()
            .filter(|m| m.status == status)
            .count()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl SendMessages for InMemoryTransport {
    async fn send_message(&self, message: &Message) -> Result<MessageId, QueueError> {
        let mut storage = lock(&self.storage);
        if self.config.max_queue_size > 0 && storage.messages.len() >= self.config.max_queue_size {
            return Err(QueueError::transport(
                "send_message",
                format!("queue is full ({} messages)", self.config.max_queue_size),
            ));
        }

        let now = Timestamp::now();
        let message_id = MessageId::generate();
        let sequence = storage.next_sequence;
        storage.next_sequence += 1;

        let correlation_id = message
            .correlation_id
            .clone()
            .or_else(|| message.headers.correlation_id());
        let expires_at = message
            .time_to_live
            .map(|ttl| now.add(ttl))
            .or_else(|| message.headers.expiration());
        let available_at = message.delay.map(|d| now.add(d)).unwrap_or(now);

        storage.messages.insert(
            message_id.clone(),
            StoredMessage {
                message_id: message_id.clone(),
                body: message.body.clone(),
                headers: message.headers.clone(),
                correlation_id,
                enqueued_at: now,
                delivery_count: 0,
                available_at,
                expires_at,
                status: QueueStatus::Waiting,
                heart_beat: None,
                sequence,
            },
        );

        Ok(message_id)
    }
}

#[async_trait]
impl ReceiveMessages for InMemoryTransport {
    async fn receive_message(
        &self,
        _context: &MessageContext,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = lock(&self.storage);
        let now = Timestamp::now();

        let next = storage
            .messages
            .values()
            .filter(|m| m.is_available(now))
            .min_by_key(|m| m.sequence)
            .map(|m| m.message_id.clone());

        let Some(message_id) = next else {
            return Ok(None);
        };
        let Some(stored) = storage.messages.get_mut(&message_id) else {
            return Ok(None);
        };

        stored.status = QueueStatus::Processing;
        stored.heart_beat = Some(now);
        stored.delivery_count += 1;

        if let Some(reason) = stored.header_error() {
            return Err(QueueError::PoisonMessage {
                message_id,
                headers: stored.headers.clone(),
                reason,
            });
        }

        Ok(Some(ReceivedMessage {
            message_id: stored.message_id.clone(),
            correlation_id: stored.correlation_id.clone(),
            body: stored.body.clone(),
            headers: stored.headers.clone(),
            delivery_count: stored.delivery_count,
            enqueued_at: stored.enqueued_at,
        }))
    }
}

#[async_trait]
impl CommitMessage for InMemoryTransport {
    async fn delete_message(&self, message_id: &MessageId) -> Result<u64, QueueError> {
        let mut storage = lock(&self.storage);
        let removed = storage.messages.remove(message_id);
        storage.error_counts.retain(|(_, id), _| id != message_id);
        Ok(u64::from(removed.is_some()))
    }
}

#[async_trait]
impl RollbackMessage for InMemoryTransport {
    async fn rollback_message(
        &self,
        message_id: &MessageId,
        delay: Option<Duration>,
    ) -> Result<u64, QueueError> {
        let mut storage = lock(&self.storage);
        let Some(message) = storage.messages.get_mut(message_id) else {
            return Ok(0);
        };
        if message.status != QueueStatus::Processing {
            return Ok(0);
        }

        let now = Timestamp::now();
        message.status = QueueStatus::Waiting;
        message.heart_beat = None;
        message.available_at = delay.map(|d| now.add(d)).unwrap_or(now);
        Ok(1)
    }
}

#[async_trait]
impl HeartBeatStore for InMemoryTransport {
    async fn send_heart_beat(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Timestamp>, QueueError> {
        let mut storage = lock(&self.storage);
        match storage.messages.get_mut(message_id) {
            Some(message) if message.status == QueueStatus::Processing => {
                let now = Timestamp::now();
                message.heart_beat = Some(now);
                Ok(Some(now))
            }
            _ => Ok(None),
        }
    }

    async fn find_messages_to_reset(
        &self,
        stale_before: Timestamp,
        _cancel: &CancellationToken,
    ) -> Result<Vec<(MessageId, MessageHeaders)>, QueueError> {
        let storage = lock(&self.storage);
        let mut stale: Vec<&StoredMessage> = storage
            .messages
            .values()
            .filter(|m| m.is_stale(stale_before))
            .collect();
        stale.sort_by_key(|m| m.sequence);
        Ok(stale
            .into_iter()
            .map(|m| (m.message_id.clone(), m.headers.clone()))
            .collect())
    }

    async fn reset_heart_beat(
        &self,
        message_id: &MessageId,
        stale_before: Timestamp,
    ) -> Result<u64, QueueError> {
        let mut storage = lock(&self.storage);
        match storage.messages.get_mut(message_id) {
            Some(message) if message.is_stale(stale_before) => {
                message.status = QueueStatus::Waiting;
                message.heart_beat = None;
                message.available_at = Timestamp::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn is_heart_beat_configured(&self) -> bool {
        self.config.configured
    }
}

#[async_trait]
impl ErrorQueueStore for InMemoryTransport {
    async fn move_to_error_queue(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        message_id: &MessageId,
        headers: &MessageHeaders,
    ) -> Result<(), QueueError> {
        let mut storage = lock(&self.storage);
        let body = storage.messages.remove(message_id).map(|m| m.body);
        storage.error_queue.insert(
            message_id.clone(),
            ErrorRecord {
                message_id: message_id.clone(),
                headers: headers.clone(),
                body,
                reason: error.to_string(),
                moved_at: Timestamp::now(),
            },
        );
        Ok(())
    }

    async fn get_error_retry_count(
        &self,
        error_type: &str,
        message_id: &MessageId,
    ) -> Result<u32, QueueError> {
        let storage = lock(&self.storage);
        Ok(storage
            .error_counts
            .get(&(error_type.to_string(), message_id.clone()))
            .copied()
            .unwrap_or(0))
    }

    async fn set_error_count(
        &self,
        error_type: &str,
        message_id: &MessageId,
    ) -> Result<(), QueueError> {
        let mut storage = lock(&self.storage);
        *storage
            .error_counts
            .entry((error_type.to_string(), message_id.clone()))
            .or_insert(0) += 1;
        Ok(())
    }
}

#[async_trait]
impl MaintenanceStore for InMemoryTransport {
    async fn find_expired_messages(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError> {
        let storage = lock(&self.storage);
        let now = Timestamp::now();
        Ok(storage
            .messages
            .values()
            .filter(|m| m.status != QueueStatus::Processing && m.is_expired(now))
            .map(|m| m.message_id.clone())
            .collect())
    }

    async fn find_error_messages_to_delete(
        &self,
        older_than: Timestamp,
        _cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>, QueueError> {
        let storage = lock(&self.storage);
        Ok(storage
            .error_queue
            .values()
            .filter(|r| r.moved_at < older_than)
            .map(|r| r.message_id.clone())
            .collect())
    }

    async fn delete_error_message(&self, message_id: &MessageId) -> Result<u64, QueueError> {
        let mut storage = lock(&self.storage);
        let removed = storage.error_queue.remove(message_id);
        storage.error_counts.retain(|(_, id), _| id != message_id);
        Ok(u64::from(removed.is_some()))
    }

    fn is_maintenance_configured(&self) -> bool {
        self.config.configured
    }
}
