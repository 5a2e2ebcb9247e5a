// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types shared by the tracking and synchronization layers.

use crate::models::RunState;

/// Tracker error type.
///
/// `NotFound` and `RemoteUnavailable` are recoverable: the first triggers a
/// fallback lookup, the second queues the run for later synchronization.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Cannot {op} while run is {state:?}")]
    InvalidState { op: &'static str, state: RunState },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Local store error: {0}")]
    LocalStore(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrackerError {
    /// True if the requested run or record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }

    /// True for errors that a later retry may resolve (remote side only).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrackerError::NotFound(_) | TrackerError::RemoteUnavailable(_)
        )
    }

    /// True for transport/server failures worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::RemoteUnavailable(_))
    }
}

impl From<validator::ValidationErrors> for TrackerError {
    fn from(err: validator::ValidationErrors) -> Self {
        TrackerError::Validation(err.to_string())
    }
}

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
