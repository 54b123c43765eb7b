//! Workflow error taxonomy.
//!
//! Every operation in this crate returns a typed, caller-recoverable error.
//! Only storage-layer I/O failure is surfaced as the retryable
//! [`WorkflowError::StorageUnavailable`] variant; nothing here aborts the
//! process on bad input.

use thiserror::Error;

use crate::authz::DenyReason;
use crate::store::StoreError;

/// Errors returned by ledger and workflow operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The referenced item, request, location, or user does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// Compare-and-swap mismatch: the item was mutated concurrently.
    #[error("conflict: item {code} was modified concurrently")]
    Conflict {
        /// Code of the contested item.
        code: String,
    },

    /// A transition was attempted from the wrong state.
    #[error("invalid state: {detail}")]
    InvalidState {
        /// What was expected and what was found.
        detail: String,
    },

    /// The authorization gate denied the action.
    #[error("denied: {0}")]
    Denied(DenyReason),

    /// A destruction approval level was approved before its predecessor.
    #[error("approval level {level} is out of order")]
    OutOfOrderApproval {
        /// The level that was attempted.
        level: u32,
    },

    /// Malformed or incomplete input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The storage layer could not persist or read state. Retryable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

impl WorkflowError {
    /// Shorthand for a [`WorkflowError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a [`WorkflowError::InvalidState`].
    #[must_use]
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    /// True when retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Conflict { .. })
    }
}
