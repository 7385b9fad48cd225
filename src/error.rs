// Error handling module
// Defines the error taxonomy surfaced to callers of the client

use thiserror::Error;

/// Errors that terminate a logical API call
///
/// `Clone` because a single refresh outcome is handed to every caller
/// attached to the in-flight attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// No usable access or refresh token exists
    #[error("Authentication required. Please login.")]
    AuthRequired,

    /// A refresh was attempted and failed; the session has been cleared
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// Non-2xx response from the Organizer API
    #[error("API Error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Persistence failure in the storage backend
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// A success response whose body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller input rejected before anything was sent
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ClientError {
    /// Build a storage error from any backend failure, keeping the context chain
    pub fn storage(err: anyhow::Error) -> Self {
        ClientError::Storage(format!("{:#}", err))
    }

    /// Whether the presentation layer should prompt for a fresh login
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::AuthRequired | ClientError::SessionExpired)
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
