//! Configuration options for the Tradedash client

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Configuration options for the Tradedash client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Refresh expired tokens before API calls and retry once on 401
    pub auto_refresh_token: bool,

    /// Keep the token pair on disk between runs
    pub persist_session: bool,

    /// Where the token pair is kept when `persist_session` is on
    pub session_file: PathBuf,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Tokens this close to expiry are refreshed early
    pub refresh_margin: Duration,

    /// Load the user profile after sign-in
    pub fetch_profile: bool,

    /// Route protected pages redirect to
    pub login_path: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            session_file: PathBuf::from(".tradedash/session.json"),
            request_timeout: Some(Duration::from_secs(30)),
            refresh_margin: Duration::ZERO,
            fetch_profile: true,
            login_path: "/login".to_string(),
        }
    }
}

impl ClientOptions {
    /// Read overrides from `TRADEDASH_*` environment variables
    pub fn from_env() -> Result<Self, Error> {
        let mut options = Self::default();

        if let Ok(path) = std::env::var("TRADEDASH_SESSION_FILE") {
            options.session_file = PathBuf::from(path);
        }
        if let Ok(secs) = std::env::var("TRADEDASH_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::config(format!("invalid TRADEDASH_REQUEST_TIMEOUT_SECS: {}", secs)))?;
            options.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Ok(value) = std::env::var("TRADEDASH_AUTO_REFRESH") {
            options.auto_refresh_token = parse_flag("TRADEDASH_AUTO_REFRESH", &value)?;
        }
        if let Ok(value) = std::env::var("TRADEDASH_PERSIST_SESSION") {
            options.persist_session = parse_flag("TRADEDASH_PERSIST_SESSION", &value)?;
        }

        Ok(options)
    }

    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    pub fn with_session_file(mut self, value: impl Into<PathBuf>) -> Self {
        self.session_file = value.into();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_refresh_margin(mut self, value: Duration) -> Self {
        self.refresh_margin = value;
        self
    }

    pub fn with_fetch_profile(mut self, value: bool) -> Self {
        self.fetch_profile = value;
        self
    }

    pub fn with_login_path(mut self, value: &str) -> Self {
        self.login_path = value.to_string();
        self
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("invalid {}: {}", name, value))),
    }
}
