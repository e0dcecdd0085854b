//! Tradedash session client
//!
//! This crate owns the client side of authentication for the Tradedash
//! dashboard: the access/refresh token pair, decoded claims, refresh, logout and
//! route gating.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tradedash_auth::{HttpAuthBackend, MemoryTokenStore, SessionOptions, SessionState};
//!
//! # async fn run() -> Result<(), tradedash_auth::AuthError> {
//! let backend = HttpAuthBackend::new("https://api.example.com", reqwest::Client::new());
//! let session = SessionState::new(
//!     Arc::new(backend),
//!     Arc::new(MemoryTokenStore::new()),
//!     SessionOptions::default(),
//! );
//!
//! session.initialize().await?;
//! session.login("trader@example.com", "hunter2").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod claims;
pub mod error;
pub mod gate;
pub mod session;
pub mod storage;

pub use backend::{
    AuthBackend, AuthPayload, HttpAuthBackend, LoginRequest, RefreshPayload, UserProfile,
};
pub use claims::{Claims, Role};
pub use error::AuthError;
pub use gate::{Gate, GateDecision};
pub use session::{AuthStatus, Identity, SessionOptions, SessionState};
pub use storage::{
    FileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
