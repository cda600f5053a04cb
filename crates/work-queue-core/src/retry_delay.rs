//! # Retry Delay Registry
//!
//! Maps handler error types to ordered redelivery delay schedules.
//!
//! A schedule registered for a type also covers every type derived from it
//! that has no schedule of its own. When several ancestors of a failure are
//! registered, the most specific one wins.
//!
//! # Examples
//!
//! ```rust
//! use work_queue_core::error_type::{EXCEPTION, INDEX_OUT_OF_RANGE};
//! use work_queue_core::retry_delay::RetryDelayRegistry;
//! use work_queue_core::HandlerError;
//! use std::time::Duration;
//!
//! let mut registry = RetryDelayRegistry::new();
//! registry
//!     .add(&INDEX_OUT_OF_RANGE, vec![Duration::from_secs(1), Duration::from_secs(2)])
//!     .unwrap();
//! registry.add(&EXCEPTION, vec![]).unwrap();
//!
//! let info = registry.retry_information(&HandlerError::new(&INDEX_OUT_OF_RANGE, "boom"));
//! assert_eq!(info.max_retries(), 2);
//! ```

use crate::error::{ConfigurationError, HandlerError, QueueError, ValidationError};
use crate::error_type::ErrorType;
use std::collections::HashMap;
use std::time::Duration;

/// Result of resolving a retry schedule for a failure
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryInformation {
    error_type: Option<&'static ErrorType>,
    times: Vec<Duration>,
}

impl RetryInformation {
    /// Information for a failure with no registered schedule
    pub fn none() -> Self {
        Self::default()
    }

    /// Registered type that matched, if any
    pub fn error_type(&self) -> Option<&'static ErrorType> {
        self.error_type
    }

    /// Number of retries allowed before moving to the error queue
    pub fn max_retries(&self) -> u32 {
        self.times.len() as u32
    }

    /// Delay to apply before each retry, in order
    pub fn times(&self) -> &[Duration] {
        &self.times
    }

    /// Delay for a zero-based retry attempt
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.times.get(attempt as usize).copied()
    }
}

/// Error type to delay schedule registry.
///
/// Becomes read-only once the owning configuration is frozen.
#[derive(Debug, Clone, Default)]
pub struct RetryDelayRegistry {
    entries: HashMap<&'static ErrorType, Vec<Duration>>,
    read_only: bool,
}

impl RetryDelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delay schedule for `error_type`.
    ///
    /// # Errors
    ///
    /// - `Validation(Required)` if the type has no name
    /// - `Configuration(ReadOnly)` after [`set_read_only`](Self::set_read_only)
    /// - `Configuration(DuplicateRetryType)` if the exact type is registered
    pub fn add(
        &mut self,
        error_type: &'static ErrorType,
        delays: Vec<Duration>,
    ) -> Result<(), QueueError> {
        if error_type.name().is_empty() {
            return Err(ValidationError::Required {
                field: "error_type".to_string(),
            }
            .into());
        }

        if self.read_only {
            return Err(ConfigurationError::ReadOnly {
                section: "retry_delay".to_string(),
            }
            .into());
        }

        if self.entries.contains_key(error_type) {
            return Err(ConfigurationError::DuplicateRetryType {
                error_type: error_type.name().to_string(),
            }
            .into());
        }

        self.entries.insert(error_type, delays);
        Ok(())
    }

    /// Resolve the schedule for a handler failure.
    ///
    /// Walks from the failure's type towards the root and returns the first
    /// registered schedule. Returns [`RetryInformation::none`] when no
    /// ancestor is registered.
    pub fn retry_information(&self, error: &HandlerError) -> RetryInformation {
        self.retry_information_for(error.error_type())
    }

    /// Resolve the schedule for an error type directly
    pub fn retry_information_for(&self, error_type: &'static ErrorType) -> RetryInformation {
        let mut current = Some(error_type);
        while let Some(candidate) = current {
            if let Some((registered, times)) = self.entries.get_key_value(candidate) {
                return RetryInformation {
                    error_type: Some(*registered),
                    times: times.clone(),
                };
            }
            current = candidate.parent();
        }
        RetryInformation::none()
    }

    /// Freeze the registry; further `add` calls fail
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "retry_delay_tests.rs"]
mod tests;
