//! Error taxonomy for hot key detection
//!
//! Per-event problems (a command line that cannot be attributed) are not
//! errors: they are counted in [`crate::controller::RunStats`] and never
//! surface to the caller.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while observing and ranking hot keys
#[derive(Error, Debug)]
pub enum HotkeyError {
    /// The event source could not be reached or the subscription failed
    #[error("Event source unavailable: {0}")]
    SourceUnavailable(String),

    /// The backing store of a counter could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A controller operation was called in a state that forbids it
    #[error("Cannot {operation} while controller is {state}")]
    ControllerMisuse {
        operation: &'static str,
        state: &'static str,
    },

    /// The ingestion loop did not stop within the caller's limit
    #[error("Ingestion loop still running after {waited:?}")]
    IngestionStalled { waited: Duration },

    /// The ingestion loop terminated abnormally
    #[error("Ingestion loop failed: {0}")]
    IngestionFailed(String),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HotkeyError {
    /// Whether this error only affects the current call and the run may continue
    pub fn is_transient(&self) -> bool {
        matches!(self, HotkeyError::StorageUnavailable(_))
    }
}

/// Result type for hot key operations
pub type Result<T> = std::result::Result<T, HotkeyError>;
