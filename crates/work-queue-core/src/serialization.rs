//! Body serialization and typed handler dispatch.
//!
//! # Examples
//!
//! ```rust
//! use work_queue_core::serialization::{JsonSerializer, Serializer};
//! use work_queue_core::message::MessageHeaders;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Resize {
//!     width: u32,
//! }
//!
//! let serializer = JsonSerializer;
//! let mut headers = MessageHeaders::new();
//! let body = serializer.serialize(&Resize { width: 64 }, &mut headers).unwrap();
//! let decoded: Resize = serializer.deserialize(&body, &headers).unwrap();
//! assert_eq!(decoded, Resize { width: 64 });
//! ```

use crate::context::WorkerNotification;
use crate::error::{PoisonMessageError, ProcessingError, SerializationError};
use crate::handler::MessageHandler;
use crate::message::{headers, MessageHeaders, ReceivedMessage};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;

#[cfg(test)]
#[path = "serialization_tests.rs"]
mod tests;

/// Converts message bodies to and from typed values
pub trait Serializer: Send + Sync + 'static {
    /// Encode `value`; may add headers describing the encoding
    fn serialize<T: Serialize>(
        &self,
        value: &T,
        headers: &mut MessageHeaders,
    ) -> Result<Bytes, SerializationError>;

    fn deserialize<T: DeserializeOwned>(
        &self,
        body: &[u8],
        headers: &MessageHeaders,
    ) -> Result<T, SerializationError>;
}

/// JSON body serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(
        &self,
        value: &T,
        _headers: &mut MessageHeaders,
    ) -> Result<Bytes, SerializationError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn deserialize<T: DeserializeOwned>(
        &self,
        body: &[u8],
        _headers: &MessageHeaders,
    ) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Name written to the message type header for `T`
pub fn message_type_name<T>() -> &'static str {
    std::any::type_name::<T>()
}

// ============================================================================
// Typed Handler
// ============================================================================

/// Decodes the body into `T` before calling the wrapped closure.
///
/// A body that fails to decode, or whose message type header names another
/// type, is reported as a poison message.
pub struct TypedHandler<T, S, F> {
    serializer: S,
    handler: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, F> TypedHandler<T, S, F> {
    pub fn new<Fut>(serializer: S, handler: F) -> Self
    where
        F: Fn(T, WorkerNotification) -> Fut,
        Fut: Future<Output = Result<(), ProcessingError>>,
    {
        Self {
            serializer,
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, S, F, Fut> MessageHandler for TypedHandler<T, S, F>
where
    T: DeserializeOwned + Send + 'static,
    S: Serializer,
    F: Fn(T, WorkerNotification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send,
{
    async fn handle(
        &self,
        message: &ReceivedMessage,
        notification: &WorkerNotification,
    ) -> Result<(), ProcessingError> {
        let expected = message_type_name::<T>();
        if let Some(actual) = message.headers.get(headers::MESSAGE_TYPE) {
            if actual != expected {
                return Err(PoisonMessageError::new(format!(
                    "message type '{}' cannot be handled as '{}'",
                    actual, expected
                ))
                .into());
            }
        }

        let value: T = self
            .serializer
            .deserialize(&message.body, &message.headers)?;
        (self.handler)(value, notification.clone()).await
    }
}
