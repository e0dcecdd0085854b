//! Route guarding on top of the session status

use crate::claims::{Claims, Role};
use crate::session::AuthStatus;

/// What a protected route should do for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Render,
    /// Session is still resolving; show a spinner, never redirect
    ShowLoading,
    RedirectToLogin { return_to: String },
}

/// Guard for a protected route, optionally restricted to a single role
#[derive(Debug, Clone)]
pub struct Gate {
    pub required_role: Option<Role>,
    pub login_path: String,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            required_role: None,
            login_path: "/login".to_string(),
        }
    }
}

impl Gate {
    pub fn new(required_role: Option<Role>) -> Self {
        Self {
            required_role,
            ..Default::default()
        }
    }

    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_path = path.to_string();
        self
    }

    pub fn decide(
        &self,
        status: AuthStatus,
        claims: Option<&Claims>,
        requested_location: &str,
    ) -> GateDecision {
        let redirect = || GateDecision::RedirectToLogin {
            return_to: requested_location.to_string(),
        };

        match status {
            AuthStatus::Loading => GateDecision::ShowLoading,
            AuthStatus::Unauthenticated => redirect(),
            AuthStatus::Authenticated => match (self.required_role, claims) {
                (None, _) => GateDecision::Render,
                (Some(required), Some(claims)) if claims.role == required => GateDecision::Render,
                _ => redirect(),
            },
        }
    }

    /// Login URL carrying the originally requested location
    pub fn login_redirect_url(&self, return_to: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("returnTo", return_to)
            .finish();
        format!("{}?{}", self.login_path, query)
    }

    /// Where to send a user right after signing in
    pub fn post_login_target(&self, return_to: Option<&str>, role: Role) -> String {
        match return_to {
            Some(location)
                if location.starts_with('/')
                    && !location.starts_with("//")
                    && location != self.login_path =>
            {
                location.to_string()
            }
            _ => role.landing_path().to_string(),
        }
    }
}
