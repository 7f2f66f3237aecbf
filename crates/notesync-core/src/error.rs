//! Error handling
//!
//! Typed errors for remote calls, push payload decoding and engine
//! operations, with helpers that tell a caller how to recover.

use thiserror::Error;

/// Errors from calls against the remote authority
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("Request to notes server failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Notes server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured server address cannot carry note paths
    #[error("Invalid notes server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The response body was not a valid note payload
    #[error("Invalid response from notes server: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RemoteError::Status { status, .. } => *status >= 500,
            RemoteError::Decode(_) | RemoteError::InvalidUrl { .. } => false,
        }
    }
}

/// Errors decoding an inbound push-channel payload
#[derive(Error, Debug)]
pub enum MessageError {
    /// Not JSON, unknown action, or a required key is missing
    #[error("Malformed push message: {0}")]
    Json(#[from] serde_json::Error),

    /// The message names a note without an identifier
    #[error("Push '{action}' message has a note without an id")]
    MissingId { action: &'static str },
}

/// Errors from synchronization engine operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// The operation needs a confirmed note identifier
    #[error("Note has no id; drafts cannot be updated or deleted")]
    MissingId,

    /// The note is not in the local collection
    #[error("Note not found in local collection: {0}")]
    UnknownNote(String),

    /// The remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SyncError {
    /// Whether the failure came from an unreachable or overloaded server
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_transient())
    }

    /// Whether the local collection may now disagree with the server
    ///
    /// True for remote failures after an optimistic write; a full reload
    /// brings the collection back in line.
    pub fn needs_reload(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::MissingId => Some("Wait for the note to be created before editing it."),
            SyncError::UnknownNote(_) => Some("Reload notes; it may have been deleted elsewhere."),
            SyncError::Remote(e) if e.is_transient() => {
                Some("Check that the notes server is running and reachable, then reload.")
            }
            SyncError::Remote(_) => None,
        }
    }
}

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;
