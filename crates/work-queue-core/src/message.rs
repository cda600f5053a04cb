//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Opaque transport-assigned message identifier.
///
/// An identifier without a value signals that no message was assigned one,
/// for example when a send failed. Nothing can be done with such a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Option<String>);

impl MessageId {
    /// Wrap a transport identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    /// Identifier carrying no value
    pub fn none() -> Self {
        Self(None)
    }

    /// Generate new random message ID
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Check if a real identifier was assigned
    pub fn has_value(&self) -> bool {
        self.0.is_some()
    }

    /// Get message ID as string; empty when there is no value
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "<none>"),
        }
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self::new(s))
    }
}

/// Caller-supplied identifier used to match request/response pairs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate new random correlation ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create correlation ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::Required {
                field: "correlation_id".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp `duration` after this one
    pub fn add(&self, duration: Duration) -> Self {
        Self(
            self.0
                .checked_add_signed(to_chrono(duration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Timestamp `duration` before this one
    pub fn sub(&self, duration: Duration) -> Self {
        Self(
            self.0
                .checked_sub_signed(to_chrono(duration))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    /// Elapsed time from `earlier` to this timestamp, zero if negative
    pub fn duration_since(&self, earlier: &Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::days(365 * 1000))
}

// ============================================================================
// Headers
// ============================================================================

/// Well-known header names
pub mod headers {
    pub const MESSAGE_TYPE: &str = "wq-message-type";
    pub const CORRELATION_ID: &str = "wq-correlation-id";
    pub const EXPIRATION: &str = "wq-expiration";
    pub const ENQUEUED_AT: &str = "wq-enqueued-at";
    pub const QUEUE_DELAY_MS: &str = "wq-queue-delay-ms";
}

/// String header map carried with every message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders(HashMap<String, String>);

impl MessageHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Correlation ID header, if present and valid
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.get(headers::CORRELATION_ID)
            .and_then(|v| CorrelationId::new(v).ok())
    }

    /// Expiration header parsed as a timestamp
    pub fn expiration(&self) -> Option<Timestamp> {
        self.get(headers::EXPIRATION).and_then(|v| v.parse().ok())
    }
}

impl FromIterator<(String, String)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub headers: MessageHeaders,
    pub correlation_id: Option<CorrelationId>,
    pub time_to_live: Option<Duration>,
    pub delay: Option<Duration>,
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            headers: MessageHeaders::new(),
            correlation_id: None,
            time_to_live: None,
            delay: None,
        }
    }

    /// Add message header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Add correlation ID for tracking
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Add time-to-live for message expiration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Hold the message back from consumers for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A message dequeued by a worker
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub correlation_id: Option<CorrelationId>,
    pub body: Bytes,
    pub headers: MessageHeaders,
    pub delivery_count: u32,
    pub enqueued_at: Timestamp,
}

impl ReceivedMessage {
    /// Body interpreted as UTF-8, if valid
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Identity data returned for a successful send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
}

/// Processing status tracked per stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    /// Available for (re)delivery once any delay has elapsed
    Waiting,
    /// Claimed by a worker holding a heartbeat lease
    Processing,
    /// Moved to the error queue
    Error,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
