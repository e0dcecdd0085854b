//! REST contract of the authentication backend

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Credentials for `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login or registration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Successful refresh. `refresh_token` is only present when the backend rotates it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// User record served by `GET /users/profile`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { data: UserProfile },
    Bare(UserProfile),
}

impl From<ProfileEnvelope> for UserProfile {
    fn from(envelope: ProfileEnvelope) -> Self {
        match envelope {
            ProfileEnvelope::Wrapped { data } => data,
            ProfileEnvelope::Bare(profile) => profile,
        }
    }
}

/// Endpoints the session core depends on
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError>;

    async fn register(&self, fields: &serde_json::Value) -> Result<AuthPayload, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, AuthError>;

    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;

    async fn profile(&self, access_token: &str) -> Result<UserProfile, AuthError>;
}

/// [`AuthBackend`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    url: String,
    http_client: Client,
}

impl HttpAuthBackend {
    pub fn new(url: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError> {
        let response = self
            .http_client
            .post(self.endpoint("/auth/login"))
            .json(request)
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    async fn register(&self, fields: &serde_json::Value) -> Result<AuthPayload, AuthError> {
        let response = self
            .http_client
            .post(self.endpoint("/auth/register"))
            .json(fields)
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshPayload, AuthError> {
        let response = self
            .http_client
            .post(self.endpoint("/auth/refresh-token"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http_client
            .post(self.endpoint("/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }

    async fn profile(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        let response = self
            .http_client
            .get(self.endpoint("/users/profile"))
            .bearer_auth(access_token)
            .send()
            .await?;

        let envelope: ProfileEnvelope = expect_success(response).await?.json().await?;
        Ok(envelope.into())
    }
}

/// Turn a non-2xx response into [`AuthError::Api`], preferring the backend's
/// `error` or `message` field over the raw body
async fn expect_success(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!("Auth backend returned {}: {}", status, body);

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                body
            }
        });

    Err(AuthError::Api {
        status: status.as_u16(),
        message,
    })
}
