//! Error types for StackMemory.
//!
//! `Error` is the unified error type for all StackMemory APIs.
//! Each operation fails with a single kind; multi-step operations roll back
//! atomically rather than returning a partially-applied result.
//!
//! ## Kinds
//!
//! - **Validation**: bad caller input.
//! - **NotFound**: target entity missing.
//! - **Integrity**: an invariant would be violated; the operation aborts
//!   with no state changes.
//! - **StackDiscipline**: close of a non-tip frame without the recovery flag.
//! - **TransientIo**: retryable database or network blip.
//! - **Provider**: cold-storage or summarizer failure.
//! - **Corrupt**: decompression or integrity check failed for a stored item.
//! - **Fatal**: store corruption below the recovery layer's ability to repair.

use crate::ids::FrameId;
use thiserror::Error;

/// Result type alias for StackMemory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for StackMemory operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input: unknown frame type, priority out of range, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// The target entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A multi-row invariant would be violated by the operation.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Attempted to close a frame that is not the stack tip without the
    /// recovery flag set.
    #[error("frame {0} is not the stack tip")]
    StackDiscipline(FrameId),

    /// A retryable I/O or network blip (database write, remote fetch).
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// A cold-storage or summarizer provider failure.
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Which provider failed (e.g. "cold_storage", "summarizer").
        provider: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// Decompression or an integrity check failed for a stored item.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Store corruption below the recovery layer's ability to repair.
    /// Non-recoverable at the engine boundary.
    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Validation(format!("serialization error: {e}"))
    }
}

impl Error {
    /// Frame-specific convenience constructor for `StackDiscipline`.
    pub fn not_stack_tip(frame_id: FrameId) -> Self {
        Error::StackDiscipline(frame_id)
    }

    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientIo(_))
    }

    /// Whether this error is non-recoverable at the engine boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation() {
        let err = Error::Validation("unknown frame type".into());
        assert!(err.to_string().contains("validation error"));
    }

    #[test]
    fn display_not_found() {
        let err = Error::NotFound("frame abc".into());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn stack_discipline_carries_frame_id() {
        let id = FrameId::new();
        let err = Error::not_stack_tip(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn transient_io_is_retryable() {
        assert!(Error::TransientIo("timeout".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn fatal_is_not_retryable() {
        let err = Error::Fatal("wal header mismatch".into());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn from_io_error_is_transient() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::TransientIo(_)));
    }
}
