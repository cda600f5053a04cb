//! Transport implementations.
//!
//! Durable backends live in their own crates; this module ships the
//! in-memory reference transport.

pub mod memory;

pub use memory::{ErrorRecord, InMemoryConfig, InMemoryTransport};
