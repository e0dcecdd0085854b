//! Session lifecycle: token pair, decoded claims, refresh and logout

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{broadcast, Mutex};

use crate::backend::{AuthBackend, AuthPayload, LoginRequest, UserProfile};
use crate::claims::Claims;
use crate::error::AuthError;
use crate::storage::{TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Authentication status exposed to the rest of the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    Unauthenticated,
    /// Initial load or a refresh in flight
    Loading,
    Authenticated,
}

/// Session behaviour options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Tokens this close to expiry are treated as expired
    pub refresh_margin: Duration,
    /// Enrich the session with `GET /users/profile` after validation
    pub fetch_profile: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::ZERO,
            fetch_profile: true,
        }
    }
}

impl SessionOptions {
    pub fn with_refresh_margin(mut self, value: Duration) -> Self {
        self.refresh_margin = value;
        self
    }

    pub fn with_fetch_profile(mut self, value: bool) -> Self {
        self.fetch_profile = value;
        self
    }
}

/// Who the signed-in user is, as best known
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Profile(UserProfile),
    /// Profile unavailable; token claims stand in
    Claims(Claims),
}

impl Identity {
    pub fn display_name(&self) -> String {
        match self {
            Self::Profile(profile) => profile
                .name
                .clone()
                .or_else(|| profile.email.clone())
                .unwrap_or_else(|| "Unknown user".to_string()),
            Self::Claims(claims) => claims
                .extra
                .get("name")
                .or_else(|| claims.extra.get("email"))
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| claims.id.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    access_token: Option<String>,
    refresh_token: Option<String>,
    claims: Option<Claims>,
    profile: Option<UserProfile>,
    status: AuthStatus,
}

#[derive(Debug, Default)]
struct RefreshLedger {
    generation: u64,
    last_failure: Option<String>,
}

impl RefreshLedger {
    fn outcome(&self) -> Result<(), AuthError> {
        match &self.last_failure {
            None => Ok(()),
            Some(reason) => Err(AuthError::RefreshRejected(reason.clone())),
        }
    }
}

/// Single source of truth for "is the caller signed in, and as whom"
///
/// Construct one per application and hand it to whatever needs it. All state
/// changes go through the async operations below. Locks are never held across
/// a network call.
pub struct SessionState {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn TokenStore>,
    options: SessionOptions,
    inner: RwLock<Inner>,
    /// Bumped whenever the session is replaced or cleared
    epoch: AtomicU64,
    alive: AtomicBool,
    refresh_gate: Mutex<RefreshLedger>,
    refresh_generation: AtomicU64,
    status_change: broadcast::Sender<AuthStatus>,
}

impl SessionState {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        store: Arc<dyn TokenStore>,
        options: SessionOptions,
    ) -> Self {
        let (status_change, _) = broadcast::channel(16);
        Self {
            backend,
            store,
            options,
            inner: RwLock::new(Inner {
                status: AuthStatus::Loading,
                ..Default::default()
            }),
            epoch: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            refresh_gate: Mutex::new(RefreshLedger::default()),
            refresh_generation: AtomicU64::new(0),
            status_change,
        }
    }

    /// Restore the session from durable storage
    pub async fn initialize(&self) -> Result<AuthStatus, AuthError> {
        let epoch = self.current_epoch();
        let access_token = self.store.load(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.store.load(REFRESH_TOKEN_KEY)?;

        {
            let mut inner = self.write();
            inner.access_token = access_token.clone();
            inner.refresh_token = refresh_token;
            inner.claims = None;
            inner.profile = None;
        }

        match access_token {
            None => {
                debug!("No stored access token");
                self.set_status(AuthStatus::Unauthenticated);
                Ok(AuthStatus::Unauthenticated)
            }
            Some(token) => {
                self.set_status(AuthStatus::Loading);
                self.validate(&token, epoch).await
            }
        }
    }

    /// Decode `token` (the held access token) and bring the session in line with it.
    ///
    /// A malformed token clears the session. An expired one is refreshed.
    /// A token other than the held one replaces it, in memory and in storage.
    pub async fn decode_and_validate(&self, token: &str) -> Result<AuthStatus, AuthError> {
        if self.access_token().as_deref() == Some(token) {
            let epoch = self.current_epoch();
            return self.validate(token, epoch).await;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(err) = self.store.store(ACCESS_TOKEN_KEY, token) {
            warn!("Could not persist access token, clearing session: {}", err);
            self.clear();
            return Err(err);
        }
        {
            let mut inner = self.write();
            inner.access_token = Some(token.to_string());
            inner.claims = None;
            inner.profile = None;
        }
        self.validate(token, epoch).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthStatus, AuthError> {
        let epoch = self.current_epoch();
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let payload = self
            .backend
            .login(&request)
            .await
            .map_err(rejected_credentials)?;
        self.ensure_current(epoch)?;

        info!("Login succeeded for {}", email);
        self.start_session(payload).await
    }

    /// Create an account upstream and sign in with the returned tokens
    pub async fn register(&self, fields: &serde_json::Value) -> Result<AuthStatus, AuthError> {
        let epoch = self.current_epoch();
        let payload = self
            .backend
            .register(fields)
            .await
            .map_err(rejected_credentials)?;
        self.ensure_current(epoch)?;

        info!("Registration succeeded");
        self.start_session(payload).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Callers that queue up behind an in-flight refresh share its outcome instead
    /// of issuing a second request. Any failure signs the user out.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let observed = self.refresh_generation.load(Ordering::SeqCst);
        let mut ledger = self.refresh_gate.lock().await;

        if ledger.generation != observed {
            debug!("Reusing outcome of concurrent refresh");
            return ledger.outcome();
        }

        self.run_refresh(&mut ledger).await
    }

    /// Refresh only if `stale_token` is still the held access token.
    ///
    /// A caller that got a 401 for a token some earlier refresh already replaced
    /// picks up the replacement instead of spending the refresh token again.
    pub async fn refresh_if_current(&self, stale_token: &str) -> Result<(), AuthError> {
        let mut ledger = self.refresh_gate.lock().await;

        match self.access_token() {
            Some(current) if current != stale_token => {
                debug!("Access token already replaced, skipping refresh");
                Ok(())
            }
            None if ledger.last_failure.is_some() => ledger.outcome(),
            None => Err(AuthError::MissingSession),
            Some(_) => self.run_refresh(&mut ledger).await,
        }
    }

    async fn run_refresh(&self, ledger: &mut RefreshLedger) -> Result<(), AuthError> {
        let outcome = self.refresh_locked().await;

        ledger.generation += 1;
        ledger.last_failure = match &outcome {
            Ok(()) => None,
            Err(AuthError::RefreshRejected(reason)) => Some(reason.clone()),
            Err(other) => Some(other.to_string()),
        };
        self.refresh_generation
            .store(ledger.generation, Ordering::SeqCst);

        outcome
    }

    /// Notify the backend (best effort) and drop the session
    pub async fn logout(&self) {
        let access_token = self.read().access_token.clone();

        match access_token {
            Some(token) => {
                if let Err(err) = self.backend.logout(&token).await {
                    warn!("Backend logout failed, clearing local session anyway: {}", err);
                }
                info!("Logged out");
            }
            None => debug!("Logout without an active session"),
        }

        self.clear();
    }

    /// Fetch the profile for the current access token and keep it on success
    pub async fn fetch_profile(&self) -> Result<UserProfile, AuthError> {
        let epoch = self.current_epoch();
        let token = self.access_token().ok_or(AuthError::MissingSession)?;
        self.load_profile(&token, epoch).await
    }

    /// An access token that is valid right now, refreshing once if it has expired
    pub async fn authorized_token(&self) -> Result<String, AuthError> {
        let held = {
            let inner = self.read();
            inner
                .access_token
                .clone()
                .map(|token| (token, inner.claims.clone()))
        };

        match held {
            None => Err(AuthError::MissingSession),
            Some((token, Some(claims))) if !claims.is_expired(self.margin_secs()) => Ok(token),
            Some((_, Some(_))) => {
                self.refresh().await?;
                self.access_token().ok_or(AuthError::MissingSession)
            }
            Some((token, None)) => {
                self.decode_and_validate(&token).await?;
                self.access_token().ok_or(AuthError::MissingSession)
            }
        }
    }

    /// Current status. A held token past its expiry never reports `Authenticated`:
    /// it reads `Loading` while a refresh token can still renew it.
    pub fn status(&self) -> AuthStatus {
        let inner = self.read();
        match inner.status {
            AuthStatus::Authenticated => match (&inner.access_token, &inner.claims) {
                (Some(_), Some(claims)) if !claims.is_expired(self.margin_secs()) => {
                    AuthStatus::Authenticated
                }
                (Some(_), _) if inner.refresh_token.is_some() => AuthStatus::Loading,
                _ => AuthStatus::Unauthenticated,
            },
            other => other,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::Authenticated
    }

    pub fn claims(&self) -> Option<Claims> {
        self.read().claims.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read().profile.clone()
    }

    /// Profile when available, token claims otherwise
    pub fn identity(&self) -> Option<Identity> {
        let inner = self.read();
        match (&inner.profile, &inner.claims) {
            (Some(profile), _) => Some(Identity::Profile(profile.clone())),
            (None, Some(claims)) => Some(Identity::Claims(claims.clone())),
            (None, None) => None,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.read().refresh_token.is_some()
    }

    /// Receiver notified on every status transition
    pub fn on_status_change(&self) -> broadcast::Receiver<AuthStatus> {
        self.status_change.subscribe()
    }

    /// Stop applying results of in-flight operations. Used on unmount or reload.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        debug!("Session shut down");
    }

    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn validate(&self, token: &str, epoch: u64) -> Result<AuthStatus, AuthError> {
        let claims = match Claims::decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!("Discarding session: {}", err);
                self.ensure_current(epoch)?;
                self.clear();
                return Err(err);
            }
        };

        if claims.is_expired(self.margin_secs()) {
            debug!(
                "Access token for {} expired at {}, refreshing",
                claims.id, claims.exp
            );
            self.ensure_current(epoch)?;
            self.set_status(AuthStatus::Loading);
            self.refresh().await?;
            return Ok(AuthStatus::Authenticated);
        }

        self.adopt(token, claims, epoch).await
    }

    /// Install a decoded, unexpired token, then try to enrich with the profile
    async fn adopt(&self, token: &str, claims: Claims, epoch: u64) -> Result<AuthStatus, AuthError> {
        self.ensure_current(epoch)?;

        info!("Session authenticated as {} ({})", claims.id, claims.role);
        {
            let mut inner = self.write();
            inner.access_token = Some(token.to_string());
            inner.claims = Some(claims);
        }
        self.set_status(AuthStatus::Authenticated);

        if self.options.fetch_profile {
            match self.load_profile(token, epoch).await {
                Ok(_) => {}
                Err(AuthError::Superseded) => return Err(AuthError::Superseded),
                Err(err) => warn!("{}; using token claims as identity", err),
            }
        }

        Ok(AuthStatus::Authenticated)
    }

    async fn load_profile(&self, token: &str, epoch: u64) -> Result<UserProfile, AuthError> {
        let profile = self
            .backend
            .profile(token)
            .await
            .map_err(|err| AuthError::ProfileFetchFailed(err.to_string()))?;
        self.ensure_current(epoch)?;

        self.write().profile = Some(profile.clone());
        Ok(profile)
    }

    async fn refresh_locked(&self) -> Result<(), AuthError> {
        let epoch = self.current_epoch();
        let refresh_token = self.read().refresh_token.clone();
        let Some(refresh_token) = refresh_token else {
            return self.fail_refresh("no refresh token available");
        };

        self.set_status(AuthStatus::Loading);
        let result = self.backend.refresh(&refresh_token).await;
        self.ensure_current(epoch)?;

        let payload = match result {
            Ok(payload) => payload,
            Err(err) => return self.fail_refresh(err),
        };

        let claims = match Claims::decode(&payload.token) {
            Ok(claims) => claims,
            Err(err) => return self.fail_refresh(err),
        };
        if claims.is_expired(self.margin_secs()) {
            return self.fail_refresh("backend issued an already expired access token");
        }

        if let Err(err) = self.store.store(ACCESS_TOKEN_KEY, &payload.token) {
            return self.fail_refresh(err);
        }
        if let Some(rotated) = &payload.refresh_token {
            if let Err(err) = self.store.store(REFRESH_TOKEN_KEY, rotated) {
                return self.fail_refresh(err);
            }
            self.write().refresh_token = Some(rotated.clone());
        }

        debug!("Access token refreshed");
        self.adopt(&payload.token, claims, epoch).await.map(|_| ())
    }

    fn fail_refresh<T: std::fmt::Display>(&self, reason: T) -> Result<(), AuthError> {
        let reason = reason.to_string();
        warn!("Refresh failed, signing out: {}", reason);
        self.clear();
        Err(AuthError::RefreshRejected(reason))
    }

    /// Persist a freshly issued token pair and validate it
    async fn start_session(&self, payload: AuthPayload) -> Result<AuthStatus, AuthError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(err) = self.persist_pair(&payload) {
            warn!("Could not persist new session, clearing storage: {}", err);
            self.clear();
            return Err(err);
        }

        {
            let mut inner = self.write();
            inner.access_token = Some(payload.token.clone());
            inner.refresh_token = payload.refresh_token.clone();
            inner.claims = None;
            inner.profile = payload
                .user
                .and_then(|user| serde_json::from_value::<UserProfile>(user).ok());
        }

        self.validate(&payload.token, epoch).await
    }

    fn persist_pair(&self, payload: &AuthPayload) -> Result<(), AuthError> {
        self.store.store(ACCESS_TOKEN_KEY, &payload.token)?;
        match &payload.refresh_token {
            Some(refresh_token) => self.store.store(REFRESH_TOKEN_KEY, refresh_token),
            None => self.store.remove(REFRESH_TOKEN_KEY),
        }
    }

    /// Drop every piece of session state, in memory and in storage
    fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        {
            let mut inner = self.write();
            inner.access_token = None;
            inner.refresh_token = None;
            inner.claims = None;
            inner.profile = None;
        }

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(err) = self.store.remove(key) {
                warn!("Failed to erase {} from token storage: {}", key, err);
            }
        }

        self.set_status(AuthStatus::Unauthenticated);
    }

    fn set_status(&self, status: AuthStatus) {
        let previous = std::mem::replace(&mut self.write().status, status);
        if previous != status {
            info!("Session status {:?} -> {:?}", previous, status);
            if self.status_change.send(status).is_err() {
                debug!("No listeners for status change {:?}", status);
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, epoch: u64) -> Result<(), AuthError> {
        if self.is_live() && self.current_epoch() == epoch {
            Ok(())
        } else {
            debug!("Dropping result of a superseded session operation");
            Err(AuthError::Superseded)
        }
    }

    fn margin_secs(&self) -> i64 {
        i64::try_from(self.options.refresh_margin.as_secs()).unwrap_or(i64::MAX)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Login/register failures the user can act on become `CredentialsRejected`
fn rejected_credentials(err: AuthError) -> AuthError {
    match err {
        AuthError::Api { status, message } if (400..500).contains(&status) => {
            AuthError::CredentialsRejected(message)
        }
        other => other,
    }
}
