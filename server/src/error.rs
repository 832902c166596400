//! Error taxonomy for the live coordination layer
//!
//! Every failure a client can observe is a returned value with a stable
//! machine-readable code. Clients branch on [`ErrorCode`], never on message
//! text. Nothing in this module unwinds across a connection boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by join, control and resume operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("not authorized as presenter")]
    Forbidden,

    #[error("presentation not found")]
    NotFound,

    #[error("presentation access window has elapsed")]
    Expired,

    #[error("{0}")]
    InvalidState(String),

    #[error("valid range 0-{max}")]
    OutOfRange { index: i64, max: u32 },

    #[error("{0}")]
    AlreadyAtBoundary(&'static str),

    #[error("presentation has no slides")]
    Precondition,

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Wire-level error codes
///
/// Serialized as the variant name (`"OutOfRange"`, `"NotFound"`, ...) so the
/// code survives message rewording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthenticated,
    Forbidden,
    NotFound,
    Expired,
    InvalidState,
    OutOfRange,
    AlreadyAtBoundary,
    Precondition,
    Unavailable,
    /// Frame could not be parsed; no [`SyncError`] counterpart
    InvalidMessage,
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Unauthenticated => ErrorCode::Unauthenticated,
            SyncError::Forbidden => ErrorCode::Forbidden,
            SyncError::NotFound => ErrorCode::NotFound,
            SyncError::Expired => ErrorCode::Expired,
            SyncError::InvalidState(_) => ErrorCode::InvalidState,
            SyncError::OutOfRange { .. } => ErrorCode::OutOfRange,
            SyncError::AlreadyAtBoundary(_) => ErrorCode::AlreadyAtBoundary,
            SyncError::Precondition => ErrorCode::Precondition,
            SyncError::Unavailable(_) => ErrorCode::Unavailable,
        }
    }
}

impl From<crate::store::StoreError> for SyncError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Unavailable(msg) => SyncError::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message_states_inclusive_range() {
        let err = SyncError::OutOfRange { index: 5, max: 2 };
        assert_eq!(err.to_string(), "valid range 0-2");
        assert_eq!(err.code(), ErrorCode::OutOfRange);
    }

    #[test]
    fn test_error_codes_serialize_as_variant_names() {
        let json = serde_json::to_string(&ErrorCode::OutOfRange).unwrap();
        assert_eq!(json, "\"OutOfRange\"");
        let json = serde_json::to_string(&ErrorCode::AlreadyAtBoundary).unwrap();
        assert_eq!(json, "\"AlreadyAtBoundary\"");
    }

    #[test]
    fn test_boundary_message() {
        let err = SyncError::AlreadyAtBoundary("already at last slide");
        assert_eq!(err.to_string(), "already at last slide");
    }
}
