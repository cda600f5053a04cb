//! # Work Queue Core
//!
//! Consumer-side lifecycle engine for transactional work queues.
//!
//! This library provides:
//! - A bounded scheduler with named work groups
//! - A worker pool pulling messages from any transport
//! - Heartbeat leases with stale lease recovery
//! - Per error type retry delays and an error queue for failures
//! - Poison message quarantine
//! - Purge monitors for expired and old error messages
//!
//! Delivery is at-least-once. Storage is abstracted behind the traits in
//! [`transport`]; [`providers::memory`] contains a reference implementation.
//!
//! ## Module Organization
//!
//! - [`error`] and [`error_type`] - Error enums and the handler error hierarchy
//! - [`message`] - Identifiers, headers and message structures
//! - [`config`] - Configuration builder, frozen snapshot and file settings
//! - [`retry_delay`] - Error type to retry schedule registry
//! - [`context`] - Per-message context and worker notification
//! - [`transport`] - Storage capability traits and the tracing decorator
//! - [`error_handling`] - Retry/error-queue decisions and poison handling
//! - [`heartbeat`] - Lease renewal and reset
//! - [`scheduler`] - Task scheduler and work groups
//! - [`worker`] - Worker pool
//! - [`monitor`] - Periodic maintenance
//! - [`producer`] and [`serialization`] - Typed send path
//! - [`consumer`] - Composition root

pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod error_handling;
pub mod error_type;
pub mod handler;
pub mod heartbeat;
pub mod message;
pub mod monitor;
pub mod producer;
pub mod providers;
pub mod retry_delay;
pub mod scheduler;
pub mod serialization;
pub mod transport;
pub mod worker;

// Re-export commonly used types at crate root for convenience
pub use config::{ConsumerConfiguration, ConsumerSettings, FrozenConfiguration};
pub use consumer::QueueConsumer;
pub use context::{ContextKey, MessageContext, WorkerNotification};
pub use error::{
    ConfigurationError, HandlerError, PoisonMessageError, ProcessingError, QueueError,
    SerializationError, ValidationError,
};
pub use error_type::{ErrorType, ErrorTypeCatalog};
pub use handler::{FnHandler, MessageHandler};
pub use message::{
    CorrelationId, Message, MessageHeaders, MessageId, QueueStatus, ReceivedMessage, SentMessage,
    Timestamp,
};
pub use producer::{QueueOutputMessage, QueueProducer, SendOptions};
pub use providers::{InMemoryConfig, InMemoryTransport};
pub use retry_delay::{RetryDelayRegistry, RetryInformation};
pub use scheduler::{RoomForNewTask, SemaphoreTaskScheduler, TaskScheduler, WorkGroup};
pub use serialization::{JsonSerializer, Serializer, TypedHandler};
pub use transport::{TracedTransport, Transport};
pub use worker::{StopOutcome, WorkerCollection, WorkerState};
