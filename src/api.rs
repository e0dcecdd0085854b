//! Authorized calls to the dashboard REST API

use std::sync::Arc;

use log::debug;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tradedash_auth::{AuthError, SessionState};

use crate::error::Error;
use crate::fetch::{ensure_success, FetchBuilder};

/// REST client that attaches the session's bearer token to every request
///
/// A 401 answer triggers a single session refresh and one retry when automatic
/// refresh is enabled. Requests that carried an already replaced token just retry. If the refresh fails the session is already cleared and
/// the caller gets the [`AuthError::RefreshRejected`] back.
#[derive(Clone)]
pub struct ApiClient {
    url: String,
    http_client: Client,
    session: Arc<SessionState>,
    auto_refresh_token: bool,
}

impl ApiClient {
    pub(crate) fn new(
        url: &str,
        http_client: Client,
        session: Arc<SessionState>,
        auto_refresh_token: bool,
    ) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            http_client,
            session,
            auto_refresh_token,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.get_with_query(path, &[]).await
    }

    /// GET with query parameters, e.g. marketplace filters and paging
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, Error> {
        let response = self.send(Method::GET, path, query, None::<&()>).await?;
        Ok(response.json().await?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, &[], Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, &[], Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PATCH, path, &[], Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        self.send(Method::DELETE, path, &[], None::<&()>).await?;
        Ok(())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response, Error> {
        let url = format!("{}{}", self.url, path);
        let mut request = FetchBuilder::new(&self.http_client, &url, method.clone()).query(query);
        if let Some(body) = body {
            request = request.json(body)?;
        }

        let token = self.bearer_token().await?;
        let response = request.clone().bearer_auth(&token).execute_raw().await?;

        if response.status() != StatusCode::UNAUTHORIZED || !self.auto_refresh_token {
            return ensure_success(response).await;
        }

        debug!("{} {} returned 401, refreshing session", method, path);
        self.session.refresh_if_current(&token).await?;

        let token = self.bearer_token().await?;
        let response = request.bearer_auth(&token).execute_raw().await?;
        ensure_success(response).await
    }

    async fn bearer_token(&self) -> Result<String, Error> {
        if self.auto_refresh_token {
            Ok(self.session.authorized_token().await?)
        } else {
            self.session
                .access_token()
                .ok_or(Error::Auth(AuthError::MissingSession))
        }
    }
}
