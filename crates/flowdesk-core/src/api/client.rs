//! API client for the tenant auth and workflow REST backend.
//!
//! Every call goes through [`ApiClient::send`]. Authenticated calls first ask
//! the [`RefreshCoordinator`] for a fresh access token, attach it as a bearer
//! credential, and retry exactly once after a refresh when the server answers
//! 401 or 500.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::config::Config;

use super::ApiError;

/// One call to the backend.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    body: Option<Value>,
    auth: bool,
    slug: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            auth: false,
            slug: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// JSON body to send
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Require a bearer token, refreshing against `slug`'s tenant if needed
    pub fn authenticated(mut self, slug: &str) -> Self {
        self.auth = true;
        self.slug = Some(slug.to_string());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn requires_auth(&self) -> bool {
        self.auth
    }
}

/// API client for the workflow backend.
/// Clone is cheap - reqwest::Client and the session state are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    /// Create a client from the loaded configuration
    pub fn new(config: &Config, credentials: Arc<CredentialStore>) -> Result<Self, ApiError> {
        Self::with_parts(
            config.base_url(),
            credentials,
            config.request_timeout(),
            config.refresh_timeout(),
        )
    }

    pub fn with_parts(
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        request_timeout: Duration,
        refresh_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let refresher = RefreshCoordinator::new(
            client.clone(), // Cheap clone, shares connection pool
            base_url.clone(),
            Arc::clone(&credentials),
            refresh_timeout,
        );

        Ok(Self {
            client,
            base_url,
            credentials,
            refresher,
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Replace the bearer credential with the currently stored access token.
    /// Without a stored token the request goes out unauthenticated.
    fn apply_bearer(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        headers.remove(header::AUTHORIZATION);
        if let Some(token) = self.credentials.access_token() {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(())
    }

    async fn dispatch(&self, request: &ApiRequest, headers: &HeaderMap) -> Result<Response, ApiError> {
        let url = self.url(&request.endpoint);
        debug!(method = %request.method, url = %url, auth = request.auth, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(url = %url, status = %response.status(), "Response received");
        Ok(response)
    }

    /// Parse the body as JSON; empty or unparsable bodies count as absent.
    async fn read_body(response: Response) -> Option<Value> {
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "Failed to read response body");
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&text).ok()
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED || status == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Send a request and return its parsed body.
    pub async fn send(&self, request: ApiRequest) -> Result<Option<Value>, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if request.auth {
            if let Err(e) = self.refresher.ensure_fresh_token(request.slug.as_deref()).await {
                debug!(error = %e, "No fresh token before request");
            }
            self.apply_bearer(&mut headers)?;
        }

        let mut response = self.dispatch(&request, &headers).await?;

        if request.auth && Self::should_retry(response.status()) {
            let status = response.status();
            match self.refresher.ensure_fresh_token(request.slug.as_deref()).await {
                Ok(()) => {
                    warn!(endpoint = %request.endpoint, %status, "Retrying request with refreshed token");
                    self.apply_bearer(&mut headers)?;
                    response = self.dispatch(&request, &headers).await?;
                }
                Err(e) => {
                    warn!(endpoint = %request.endpoint, %status, error = %e, "Token refresh failed, not retrying");
                }
            }
        }

        let status = response.status();
        let body = Self::read_body(response).await;

        if !status.is_success() {
            return Err(ApiError::from_status(status, body));
        }
        Ok(body)
    }

    /// Send a request and deserialize its body into `T`
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let endpoint = request.endpoint.clone();
        let body = self
            .send(request)
            .await?
            .ok_or_else(|| ApiError::InvalidResponse(format!("Empty response from {}", endpoint)))?;
        serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", endpoint, e)))
    }
}
