//! Classification hierarchy for handler failures.
//!
//! Handler failures are classified by static [`ErrorType`] descriptors that
//! form a single-rooted tree. Retry schedules are registered against these
//! descriptors and resolved by walking from the most specific type towards
//! the root [`EXCEPTION`].
//!
//! # Example
//!
//! ```rust
//! use work_queue_core::error_type::{ErrorType, ARGUMENT};
//!
//! // Application specific failure, handled like an argument error unless a
//! // schedule is registered for it directly.
//! static BAD_CUSTOMER_ID: ErrorType = ErrorType::derived("BadCustomerId", &ARGUMENT);
//!
//! let names: Vec<&str> = BAD_CUSTOMER_ID.ancestors().map(|t| t.name()).collect();
//! assert_eq!(names, vec!["BadCustomerId", "ArgumentException", "Exception"]);
//! ```

use crate::error::ConfigurationError;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Static descriptor for a class of handler failure
#[derive(Debug)]
pub struct ErrorType {
    name: &'static str,
    parent: Option<&'static ErrorType>,
}

impl ErrorType {
    /// Create a root type with no parent
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Create a type deriving from `parent`
    pub const fn derived(name: &'static str, parent: &'static ErrorType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Get type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get parent type, if any
    pub fn parent(&self) -> Option<&'static ErrorType> {
        self.parent
    }

    /// Iterate from this type up to the root, most specific first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            current: Some(self),
        }
    }

    /// Check whether `self` is `other` or derives from it
    pub fn is_a(&self, other: &ErrorType) -> bool {
        self.ancestors().any(|t| t == other)
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ErrorType {}

impl Hash for ErrorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Iterator over an error type and its ancestors
pub struct Ancestors<'a> {
    current: Option<&'a ErrorType>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ErrorType;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.parent;
        Some(current)
    }
}

// ============================================================================
// Built-in Hierarchy
// ============================================================================

/// Root of every failure classification
pub static EXCEPTION: ErrorType = ErrorType::root("Exception");

pub static ARGUMENT: ErrorType = ErrorType::derived("ArgumentException", &EXCEPTION);

pub static ARGUMENT_NULL: ErrorType = ErrorType::derived("ArgumentNullException", &ARGUMENT);

pub static ARGUMENT_OUT_OF_RANGE: ErrorType =
    ErrorType::derived("ArgumentOutOfRangeException", &ARGUMENT);

pub static INVALID_OPERATION: ErrorType =
    ErrorType::derived("InvalidOperationException", &EXCEPTION);

pub static INDEX_OUT_OF_RANGE: ErrorType =
    ErrorType::derived("IndexOutOfRangeException", &EXCEPTION);

pub static TIMEOUT: ErrorType = ErrorType::derived("TimeoutException", &EXCEPTION);

pub static IO: ErrorType = ErrorType::derived("IOException", &EXCEPTION);

pub static SERIALIZATION: ErrorType = ErrorType::derived("SerializationException", &EXCEPTION);

// ============================================================================
// Catalog
// ============================================================================

/// Name lookup for error types referenced from configuration files.
///
/// Starts with the built-in hierarchy; applications register their own
/// descriptors before loading settings that refer to them.
#[derive(Debug, Clone)]
pub struct ErrorTypeCatalog {
    types: HashMap<&'static str, &'static ErrorType>,
}

impl ErrorTypeCatalog {
    /// Create catalog holding the built-in hierarchy
    pub fn new() -> Self {
        let mut catalog = Self {
            types: HashMap::new(),
        };
        for error_type in [
            &EXCEPTION,
            &ARGUMENT,
            &ARGUMENT_NULL,
            &ARGUMENT_OUT_OF_RANGE,
            &INVALID_OPERATION,
            &INDEX_OUT_OF_RANGE,
            &TIMEOUT,
            &IO,
            &SERIALIZATION,
        ] {
            catalog.register(error_type);
        }
        catalog
    }

    /// Register an application error type
    pub fn register(&mut self, error_type: &'static ErrorType) {
        self.types.insert(error_type.name(), error_type);
    }

    /// Resolve a type by name
    pub fn resolve(&self, name: &str) -> Result<&'static ErrorType, ConfigurationError> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownErrorType {
                name: name.to_string(),
            })
    }
}

impl Default for ErrorTypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "error_type_tests.rs"]
mod tests;
