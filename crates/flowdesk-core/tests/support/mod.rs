//! Shared helpers for the wiremock-driven integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use wiremock::MockServer;

use flowdesk_core::{ApiClient, CredentialStore, RefreshCoordinator};

pub const TENANT: &str = "acme";

/// Unsigned JWT whose `exp` is `offset_secs` from now.
pub fn jwt_expiring_in(offset_secs: i64, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({ "exp": Utc::now().timestamp() + offset_secs, "sub": subject }).to_string(),
    );
    format!("{}.{}.test-signature", header, payload)
}

pub fn valid_token(subject: &str) -> String {
    jwt_expiring_in(3600, subject)
}

pub fn expired_token(subject: &str) -> String {
    jwt_expiring_in(-60, subject)
}

/// Store holding an optional access token, a refresh token and the tenant.
pub fn session(access: Option<&str>, refresh: Option<&str>) -> Arc<CredentialStore> {
    let store = CredentialStore::in_memory();
    store.set_tokens(access, refresh).expect("set tokens");
    store.set_tenant_slug(TENANT).expect("set tenant");
    Arc::new(store)
}

pub fn coordinator(server: &MockServer, credentials: Arc<CredentialStore>) -> RefreshCoordinator {
    coordinator_with_timeout(server, credentials, Duration::from_secs(5))
}

pub fn coordinator_with_timeout(
    server: &MockServer,
    credentials: Arc<CredentialStore>,
    timeout: Duration,
) -> RefreshCoordinator {
    RefreshCoordinator::new(reqwest::Client::new(), server.uri(), credentials, timeout)
}

pub fn api_client(server: &MockServer, credentials: Arc<CredentialStore>) -> ApiClient {
    ApiClient::with_parts(
        server.uri(),
        credentials,
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .expect("build api client")
}

pub fn refresh_path() -> String {
    format!("/tenant_auth/{}/token-refresh", TENANT)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
