//! Tradedash Rust Client Library
//!
//! Client for the Tradedash trading-strategy platform: the signed-in session
//! (token pair, claims, refresh, logout), route gating by role, and authorized
//! access to the dashboard REST API.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;

use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::Client;
use url::Url;

pub use tradedash_auth as auth;
pub use tradedash_auth::{
    AuthError, AuthStatus, Claims, Gate, GateDecision, Identity, Role, SessionState,
};

use crate::api::ApiClient;
use crate::config::ClientOptions;
use crate::error::Error;
use tradedash_auth::{
    AuthBackend, FileTokenStore, HttpAuthBackend, MemoryTokenStore, SessionOptions, TokenStore,
};

/// The main entry point for the Tradedash client
///
/// Build one at startup and pass it down to whatever renders the dashboard.
pub struct Dashboard {
    /// The base URL of the dashboard API
    pub url: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Client options
    pub options: ClientOptions,
    session: Arc<SessionState>,
}

impl Dashboard {
    /// Create a new client with default options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tradedash::Dashboard;
    ///
    /// # async fn run() -> Result<(), tradedash::error::Error> {
    /// let dashboard = Dashboard::new("https://api.tradedash.example")?;
    /// dashboard.session().initialize().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(url: &str) -> Result<Self, Error> {
        Self::new_with_options(url, ClientOptions::default())
    }

    /// Create a new client with custom options
    pub fn new_with_options(url: &str, options: ClientOptions) -> Result<Self, Error> {
        let store: Arc<dyn TokenStore> = if options.persist_session {
            Arc::new(FileTokenStore::new(&options.session_file))
        } else {
            Arc::new(MemoryTokenStore::new())
        };
        Self::with_store(url, options, store)
    }

    /// Create a client on top of a caller-supplied token store
    pub fn with_store(
        url: &str,
        options: ClientOptions,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, Error> {
        Url::parse(url)?;

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let backend: Arc<dyn AuthBackend> =
            Arc::new(HttpAuthBackend::new(url, http_client.clone()));
        let session_options = SessionOptions::default()
            .with_refresh_margin(options.refresh_margin)
            .with_fetch_profile(options.fetch_profile);
        let session = Arc::new(SessionState::new(backend, store, session_options));

        info!("Tradedash client ready for {}", url);
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            http_client,
            options,
            session,
        })
    }

    /// Create a client from `TRADEDASH_API_URL` and the other `TRADEDASH_*` variables
    pub fn from_env() -> Result<Self, Error> {
        let url = std::env::var("TRADEDASH_API_URL")
            .map_err(|_| Error::config("TRADEDASH_API_URL must be set"))?;
        Self::new_with_options(&url, ClientOptions::from_env()?)
    }

    /// The session shared by every part of the application
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Authorized REST client for the dashboard screens
    pub fn api(&self) -> ApiClient {
        ApiClient::new(
            &self.url,
            self.http_client.clone(),
            self.session.clone(),
            self.options.auto_refresh_token,
        )
    }

    /// Gate for a protected route using the configured login path
    pub fn gate(&self, required_role: Option<Role>) -> Gate {
        Gate::new(required_role).with_login_path(&self.options.login_path)
    }

    /// Decide what a protected route should do for the current session
    pub fn guard(&self, gate: &Gate, requested_location: &str) -> GateDecision {
        let claims = self.session.claims();
        gate.decide(self.session.status(), claims.as_ref(), requested_location)
    }

    /// Like [`Dashboard::guard`], but an expired token gets its refresh first
    pub async fn resolve(&self, gate: &Gate, requested_location: &str) -> GateDecision {
        if self.session.access_token().is_some() {
            if let Err(err) = self.session.authorized_token().await {
                debug!("Session could not be renewed for {}: {}", requested_location, err);
            }
        }
        self.guard(gate, requested_location)
    }

    /// Load the persisted session. Terminal failures leave the client signed out.
    pub async fn start(&self) -> AuthStatus {
        if let Err(err) = self.session.initialize().await {
            warn!("Stored session could not be restored: {}", err);
        }
        self.session.status()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::api::ApiClient;
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::Dashboard;
    pub use tradedash_auth::{AuthStatus, Gate, GateDecision, Role};
}
