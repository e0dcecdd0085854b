//! Error types for session operations

use thiserror::Error;

/// Errors produced by the session core and its collaborators
#[derive(Error, Debug)]
pub enum AuthError {
    /// The stored or returned access token could not be decoded
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The backend refused the refresh token, or no refresh token was available
    #[error("Refresh rejected: {0}")]
    RefreshRejected(String),

    /// The profile endpoint failed; the session keeps using token claims
    #[error("Profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    /// Login or registration was refused by the backend
    #[error("{0}")]
    CredentialsRejected(String),

    #[error("Missing session")]
    MissingSession,

    /// The session was cleared or shut down while the call was in flight
    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Token storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Message suitable for an inline form error
    pub fn user_message(&self) -> String {
        match self {
            Self::CredentialsRejected(message) => message.clone(),
            Self::Network(_) => "Unable to reach the server. Please try again.".to_string(),
            Self::RefreshRejected(_) | Self::MalformedToken(_) | Self::MissingSession => {
                "Your session has expired. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for failures that end the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MalformedToken(_) | Self::RefreshRejected(_))
    }

    pub(crate) fn storage<T: std::fmt::Display>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }
}
