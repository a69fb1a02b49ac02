//! Shared error types for the services crate.

use thiserror::Error;

use drill_core::model::{SessionSummaryError, SettingsError};
use drill_core::source::MalformedProblem;
use storage::repository::StorageError;

use crate::sessions::Phase;

/// Errors emitted by session services and the session controller.
///
/// Incorrect answers are never errors; they flow through the retry and
/// reveal outcomes. Only misuse of the controller and contract violations by
/// a problem source surface here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{operation} is not available while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },
    #[error("{operation} is not available while reviewing past problems")]
    Reviewing { operation: &'static str },
    #[error("reveal is not available for the follow-up step")]
    RevealUnavailable,
    #[error("submission ticket no longer matches the live step")]
    StaleSubmission,
    #[error("no resolved problems to review")]
    NothingToReview,
    #[error("session is not complete")]
    NotComplete,
    #[error("problem source broke its contract: {0}")]
    MalformedProblem(#[from] MalformedProblem),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SettingsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsServiceError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("invalid settings json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
