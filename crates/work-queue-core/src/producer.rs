//! Typed message producer.
//!
//! # Examples
//!
//! ```rust
//! use work_queue_core::producer::{QueueProducer, SendOptions};
//! use work_queue_core::providers::InMemoryTransport;
//! use work_queue_core::serialization::JsonSerializer;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = Arc::new(InMemoryTransport::default());
//! let producer = QueueProducer::new(transport.clone(), JsonSerializer);
//!
//! let output = producer.send(&"hello", SendOptions::default()).await;
//! assert!(!output.has_error());
//! assert_eq!(transport.waiting_count(), 1);
//! # }
//! ```

use crate::error::QueueError;
use crate::message::{headers, CorrelationId, Message, MessageHeaders, MessageId, SentMessage, Timestamp};
use crate::serialization::{message_type_name, Serializer};
use crate::transport::SendMessages;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Per-message send options
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub correlation_id: Option<CorrelationId>,
    pub headers: MessageHeaders,
    pub time_to_live: Option<Duration>,
    pub delay: Option<Duration>,
}

impl SendOptions {
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Result of sending one message.
///
/// A failed send still carries the correlation ID; its message ID has no
/// value.
#[derive(Debug)]
pub struct QueueOutputMessage {
    sent: SentMessage,
    error: Option<QueueError>,
}

impl QueueOutputMessage {
    fn sent(message_id: MessageId, correlation_id: CorrelationId) -> Self {
        Self {
            sent: SentMessage {
                message_id,
                correlation_id,
            },
            error: None,
        }
    }

    fn failed(correlation_id: CorrelationId, error: QueueError) -> Self {
        Self {
            sent: SentMessage {
                message_id: MessageId::none(),
                correlation_id,
            },
            error: Some(error),
        }
    }

    pub fn sent_message(&self) -> &SentMessage {
        &self.sent
    }

    pub fn error(&self) -> Option<&QueueError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Serializes typed bodies and sends them through a transport
pub struct QueueProducer<T: ?Sized, S> {
    transport: Arc<T>,
    serializer: S,
}

impl<T, S> QueueProducer<T, S>
where
    T: SendMessages + ?Sized,
    S: Serializer,
{
    pub fn new(transport: Arc<T>, serializer: S) -> Self {
        Self {
            transport,
            serializer,
        }
    }

    /// Send one message; failures are reported on the output, not returned
    pub async fn send<M: Serialize>(&self, body: &M, options: SendOptions) -> QueueOutputMessage {
        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(CorrelationId::generate);

        let message = match self.build(body, options, &correlation_id) {
            Ok(message) => message,
            Err(e) => {
                warn!(correlation_id = %correlation_id, error = %e, "Failed to serialize message");
                return QueueOutputMessage::failed(correlation_id, e);
            }
        };

        match self.transport.send_message(&message).await {
            Ok(message_id) => {
                debug!(message_id = %message_id, correlation_id = %correlation_id, "Message sent");
                QueueOutputMessage::sent(message_id, correlation_id)
            }
            Err(e) => {
                warn!(correlation_id = %correlation_id, error = %e, "Failed to send message");
                QueueOutputMessage::failed(correlation_id, e)
            }
        }
    }

    /// Send a batch. The batch never fails as a whole; every entry carries
    /// its own outcome, in input order.
    pub async fn send_batch<M: Serialize>(
        &self,
        messages: Vec<(M, SendOptions)>,
    ) -> Vec<QueueOutputMessage> {
        let mut outputs: Vec<Option<QueueOutputMessage>> = Vec::with_capacity(messages.len());
        let mut to_send = Vec::new();
        let mut positions = Vec::new();
        let mut correlation_ids = Vec::new();

        for (body, options) in messages {
            let correlation_id = options
                .correlation_id
                .clone()
                .unwrap_or_else(CorrelationId::generate);
            match self.build(&body, options, &correlation_id) {
                Ok(message) => {
                    positions.push(outputs.len());
                    correlation_ids.push(correlation_id);
                    to_send.push(message);
                    outputs.push(None);
                }
                Err(e) => outputs.push(Some(QueueOutputMessage::failed(correlation_id, e))),
            }
        }

        let mut results = self.transport.send_messages(&to_send).await.into_iter();
        for (position, correlation_id) in positions.into_iter().zip(correlation_ids) {
            outputs[position] = Some(match results.next() {
                Some(Ok(message_id)) => QueueOutputMessage::sent(message_id, correlation_id),
                Some(Err(e)) => QueueOutputMessage::failed(correlation_id, e),
                None => QueueOutputMessage::failed(
                    correlation_id,
                    QueueError::transport("send_messages", "transport returned no result"),
                ),
            });
        }

        let outputs: Vec<QueueOutputMessage> = outputs.into_iter().flatten().collect();
        let failed = outputs.iter().filter(|o| o.has_error()).count();
        if failed > 0 {
            warn!(failed, total = outputs.len(), "Batch send had failures");
        }
        outputs
    }

    fn build<M: Serialize>(
        &self,
        body: &M,
        options: SendOptions,
        correlation_id: &CorrelationId,
    ) -> Result<Message, QueueError> {
        let mut message_headers = options.headers;
        let payload = self.serializer.serialize(body, &mut message_headers)?;

        let now = Timestamp::now();
        message_headers.insert(headers::MESSAGE_TYPE, message_type_name::<M>());
        message_headers.insert(headers::CORRELATION_ID, correlation_id.as_str());
        message_headers.insert(headers::ENQUEUED_AT, now.as_datetime().to_rfc3339());
        if let Some(ttl) = options.time_to_live {
            message_headers.insert(headers::EXPIRATION, now.add(ttl).as_datetime().to_rfc3339());
        }
        if let Some(delay) = options.delay {
            message_headers.insert(headers::QUEUE_DELAY_MS, delay.as_millis().to_string());
        }

        let mut message = Message::new(payload).with_correlation_id(correlation_id.clone());
        message.headers = message_headers;
        message.time_to_live = options.time_to_live;
        message.delay = options.delay;
        Ok(message)
    }
}
