//! Error types for NIM operations.
//!
//! Every fallible registry, configuration and startup operation returns
//! [`NimError`]. The variants follow the NIM error taxonomy: capacity
//! faults, expected absence/duplication, parameter rejections, and
//! startup-protocol faults.

use std::io;

use thiserror::Error;

use crate::startup::ComponentId;
use crate::tree::TreeError;

/// Result type alias for NIM operations.
pub type Result<T> = std::result::Result<T, NimError>;

/// Errors that can occur during NIM operations.
#[derive(Debug, Error)]
pub enum NimError {
    /// A fixed-capacity structure could not be allocated.
    #[error("Out of memory allocating {what} (capacity {capacity})")]
    OutOfMemory {
        /// The structure being allocated.
        what: &'static str,
        /// Requested capacity.
        capacity: usize,
    },

    /// No free slot left in a bounded resource.
    #[error("{what} exhausted")]
    Exhausted {
        /// The exhausted resource.
        what: String,
    },

    /// The key is already registered.
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the duplicate.
        what: String,
    },

    /// The key or handle is not present.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entry.
        what: String,
    },

    /// The handle lies outside the configured interface range.
    #[error("Interface handle {0} does not exist")]
    NotExist(u32),

    /// A parameter was rejected before any state was touched.
    #[error("Invalid parameter {field}: {message}")]
    InvalidParam {
        /// The offending field.
        field: &'static str,
        /// Error message.
        message: String,
    },

    /// The interface state machine does not accept the event.
    #[error("Interface {handle}: event {event} not valid in state {state}")]
    InvalidState {
        /// Internal interface handle.
        handle: u32,
        /// Current state.
        state: String,
        /// Rejected event.
        event: String,
    },

    /// The startup worker reported completion for the wrong component.
    #[error("Startup protocol violation: expected {expected:?}, received {received}")]
    ProtocolViolation {
        /// The component the sequencer is waiting on.
        expected: Option<ComponentId>,
        /// The component that reported completion.
        received: ComponentId,
    },

    /// A startup callback did not complete within the configured bound.
    #[error("Startup callback for {component} did not complete within {waited_ms} ms")]
    CallbackTimeout {
        /// The stalled component.
        component: ComponentId,
        /// Time waited.
        waited_ms: u64,
    },

    /// The startup worker is gone or the sequencer is faulted.
    #[error("Startup sequencer unavailable: {0}")]
    SequencerUnavailable(String),

    /// Configuration load or validation failure.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl NimError {
    /// Creates an exhausted error.
    pub fn exhausted(what: impl Into<String>) -> Self {
        Self::Exhausted { what: what.into() }
    }

    /// Creates an already-exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_param(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            field,
            message: message.into(),
        }
    }

    /// Translates an ordered-index error, naming the index involved.
    pub fn from_tree(err: TreeError, what: &'static str) -> Self {
        match err {
            TreeError::OutOfMemory { capacity } => Self::OutOfMemory { what, capacity },
            TreeError::Full { .. } => Self::exhausted(what),
            TreeError::AlreadyExists => Self::already_exists(what),
            TreeError::NotFound => Self::not_found(what),
        }
    }

    /// Returns true for unrecoverable faults that should abort the owning
    /// subsystem rather than be handled by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NimError::OutOfMemory { .. }
                | NimError::Exhausted { .. }
                | NimError::ProtocolViolation { .. }
                | NimError::CallbackTimeout { .. }
        )
    }

    /// Returns true for the expected "absent" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NimError::NotFound { .. } | NimError::NotExist(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NimError::not_found("USP 1/0/3");
        assert_eq!(err.to_string(), "USP 1/0/3 not found");

        let err = NimError::invalid_param("port", "0 is out of range 1..=32");
        assert_eq!(
            err.to_string(),
            "Invalid parameter port: 0 is out of range 1..=32"
        );
    }

    #[test]
    fn test_from_tree() {
        let err = NimError::from_tree(TreeError::Full { capacity: 4 }, "USP index");
        assert!(matches!(err, NimError::Exhausted { .. }));

        let err = NimError::from_tree(TreeError::OutOfMemory { capacity: 4 }, "USP index");
        assert!(err.is_fatal());

        let err = NimError::from_tree(TreeError::AlreadyExists, "USP index");
        assert!(matches!(err, NimError::AlreadyExists { .. }));
    }

    #[test]
    fn test_is_fatal() {
        let err = NimError::ProtocolViolation {
            expected: Some(ComponentId::VLAN),
            received: ComponentId::FDB,
        };
        assert!(err.is_fatal());
        assert!(!NimError::not_found("x").is_fatal());
        assert!(!NimError::already_exists("x").is_fatal());
        assert!(!NimError::invalid_param("port", "0").is_fatal());

        // Capacity faults abort startup.
        assert!(NimError::exhausted("VLAN handles").is_fatal());
    }

    #[test]
    fn test_is_not_found() {
        assert!(NimError::NotExist(99).is_not_found());
        assert!(NimError::not_found("x").is_not_found());
        assert!(!NimError::already_exists("x").is_not_found());
    }
}
