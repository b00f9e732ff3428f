//! Error Types

use std::time::Duration;

use thiserror::Error;

use crate::record::RecordId;

/// Failure reported by the remote authority or its transport
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("not signed in")]
    Unauthorized,

    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure of an optimistic mutation or of the sync session
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    InvalidDraft(String),

    #[error("{0} is still being saved")]
    PendingCreate(RecordId),

    #[error("{0} already has a change in flight")]
    Busy(RecordId),

    #[error("{0} not found")]
    NotFound(RecordId),

    #[error("no response after {0:?}")]
    Timeout(Duration),

    #[error("sync session was shut down")]
    TornDown,

    #[error("sync session already started")]
    AlreadyStarted,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SyncError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::Unauthorized))
    }

    /// Completion that arrived after teardown; nothing to report
    pub fn is_torn_down(&self) -> bool {
        matches!(self, SyncError::TornDown)
    }
}
