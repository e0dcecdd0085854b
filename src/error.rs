//! Error handling for the Tradedash client

use std::fmt;
use thiserror::Error;
use tradedash_auth::AuthError;

/// Unified error type for the Tradedash client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session and authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-2xx response from the dashboard API
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// HTTP status of a failed API call, if that is what this is
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Auth(AuthError::Api { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// True when the session is gone and the user has to sign in again
    pub fn requires_login(&self) -> bool {
        match self {
            Error::Auth(err) => err.is_terminal() || matches!(err, AuthError::MissingSession),
            _ => false,
        }
    }
}
