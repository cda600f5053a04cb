//! # Work Queue Service
//!
//! Runnable host for the work-queue consumer engine.
//!
//! The service loads layered settings, seeds an in-memory queue with demo
//! image resize jobs and consumes them until interrupted. It exists to show
//! how an application wires configuration, error types and a typed handler
//! into [`work_queue_core::QueueConsumer`].

pub mod demo;
pub mod settings;

pub use settings::{load_settings, load_settings_from_file, ServiceError, ServiceSettings};
