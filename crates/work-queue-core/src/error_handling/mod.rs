//! Failure routing for processed messages.
//!
//! Handler failures go through [`ReceiveMessagesError`], which either
//! schedules a delayed retry or moves the message to the error queue. Poison
//! messages go through [`ReceivePoisonMessage`] and never retry.

mod poison;
mod receive_error;

pub use poison::ReceivePoisonMessage;
pub use receive_error::{ReceiveMessagesError, ReceiveMessagesErrorResult};

#[cfg(test)]
#[path = "error_handling_tests.rs"]
mod tests;
