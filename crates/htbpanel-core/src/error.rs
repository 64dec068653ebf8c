//! Error types for the htbpanel core library.

use thiserror::Error;

use crate::db::DatabaseError;

/// Result type alias using the htbpanel [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy.
///
/// The store and the reconciler never swallow failures; they surface one of
/// these and leave presentation to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP layer failure. `status` is 0 when no response arrived.
    #[error("Request failed ({status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// The remote API answered with an unexpected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Transaction or commit failure in the local store.
    #[error("Persistence error: {0}")]
    Persistence(DatabaseError),

    /// Input rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A config layer does not fit the settings schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DatabaseError> for Error {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::InvalidRecord(msg) => Self::MalformedResponse(msg),
            other => Self::Persistence(other),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::MalformedResponse(e.to_string());
        }
        Self::RequestFailed {
            status: e.status().map_or(0, |s| s.as_u16()),
            body: e.to_string(),
        }
    }
}

impl Error {
    /// Whether the failure is transient from the session's point of view
    /// (a later user-initiated reload may succeed).
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RequestFailed { .. } | Self::MalformedResponse(_))
    }
}
