//! Single-flight access-token refresh.
//!
//! Every authenticated call asks the coordinator for a fresh token before it
//! goes out. When the stored access token is missing or about to expire, the
//! first caller starts one exchange of the refresh token against
//! `POST /tenant_auth/{slug}/token-refresh`; every caller that arrives while
//! that exchange is pending awaits the same shared outcome instead of starting
//! its own. The backend may rotate refresh tokens on use, so a second
//! concurrent exchange would present an already-consumed token.
//!
//! The exchange runs on its own tokio task. A guard owned by that task clears
//! the in-flight handle when the task ends, whichever way it ends, so a later
//! call can always start a new attempt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::claims;
use super::CredentialStore;

/// Why a refresh did not produce a usable access token.
///
/// `Clone` so every waiter on a shared exchange receives the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token stored")]
    MissingRefreshToken,

    #[error("No tenant selected")]
    MissingTenant,

    #[error("Refresh rejected with status {0}")]
    Rejected(u16),

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),

    #[error("Refresh response did not contain an access token")]
    MissingAccessToken,

    #[error("Refresh timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

pub type RefreshResult = Result<(), RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    generation: u64,
    outcome: SharedRefresh,
}

#[derive(Default)]
struct RefreshSlot {
    next_generation: u64,
    current: Option<InFlight>,
}

struct Inner {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    timeout: Duration,
    slot: Mutex<RefreshSlot>,
}

/// Tokens returned by a successful exchange
struct RefreshedTokens {
    access: String,
    refresh: Option<String>,
}

/// Clears the in-flight handle it was created for when dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slot = self.inner.lock_slot();
        if slot.current.as_ref().map(|f| f.generation) == Some(self.generation) {
            slot.current = None;
            debug!(generation = self.generation, "Refresh handle cleared");
        }
    }
}

/// Coordinates token refreshes for one session.
/// Clone is cheap and clones share the same in-flight handle.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                credentials,
                timeout,
                slot: Mutex::new(RefreshSlot::default()),
            }),
        }
    }

    /// Whether an exchange is currently pending
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_slot().current.is_some()
    }

    /// Make sure a usable access token is stored, refreshing it if needed.
    ///
    /// `slug` selects the tenant for the exchange and falls back to the stored
    /// tenant. Fails immediately, without a network call, when no refresh
    /// token or tenant is available. A failed refresh leaves the stored
    /// credentials untouched.
    pub async fn ensure_fresh_token(&self, slug: Option<&str>) -> RefreshResult {
        match self.begin(slug)? {
            Some(outcome) => outcome.await,
            None => Ok(()),
        }
    }

    /// Returns `None` when the current token is usable, otherwise the pending
    /// exchange to wait on (joining one already in flight).
    fn begin(&self, slug: Option<&str>) -> Result<Option<SharedRefresh>, RefreshError> {
        let credentials = &self.inner.credentials;
        let mut slot = self.inner.lock_slot();

        if !claims::is_expired(credentials.access_token().as_deref()) {
            return Ok(None);
        }

        let refresh = credentials
            .refresh_token()
            .ok_or(RefreshError::MissingRefreshToken)?;
        let tenant = slug
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| credentials.tenant_slug())
            .ok_or(RefreshError::MissingTenant)?;

        if let Some(ref in_flight) = slot.current {
            debug!(generation = in_flight.generation, "Joining in-flight token refresh");
            return Ok(Some(in_flight.outcome.clone()));
        }

        let inner = Arc::clone(&self.inner);
        let exchange = async move { inner.exchange(&tenant, &refresh).await }.boxed();

        Ok(Some(self.start(&mut slot, exchange)))
    }

    /// Spawn `work` as the new in-flight exchange. The caller holds the slot
    /// lock, so no other handle can be installed in between.
    fn start(&self, slot: &mut RefreshSlot, work: BoxFuture<'static, RefreshResult>) -> SharedRefresh {
        slot.next_generation += 1;
        let generation = slot.next_generation;

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            generation,
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });

        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(RefreshError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        slot.current = Some(InFlight {
            generation,
            outcome: outcome.clone(),
        });
        debug!(generation, "Started token refresh");

        outcome
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, RefreshSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn exchange(&self, tenant: &str, refresh: &str) -> RefreshResult {
        let url = format!("{}/tenant_auth/{}/token-refresh", self.base_url, tenant);
        info!(tenant, "Refreshing access token");

        let result = match tokio::time::timeout(self.timeout, self.request_tokens(&url, refresh)).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::TimedOut(self.timeout)),
        };

        match result {
            Ok(tokens) => {
                let rotated = tokens.refresh.is_some();
                let next_refresh = tokens.refresh.as_deref().unwrap_or(refresh);
                if let Err(e) = self.credentials.set_tokens(Some(&tokens.access), Some(next_refresh)) {
                    warn!(error = %e, "Failed to persist refreshed tokens");
                }
                debug!(tenant, rotated, "Access token refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(tenant, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    async fn request_tokens(&self, url: &str, refresh: &str) -> Result<RefreshedTokens, RefreshError> {
        let response = self
            .http
            .post(url)
            .json(&json!({ "refresh": refresh }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        // Tokens may be nested under `data`.
        let tokens = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);
        let access = tokens
            .get("access")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::MissingAccessToken)?;
        let refresh = tokens
            .get("refresh")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(RefreshedTokens {
            access: access.to_string(),
            refresh,
        })
    }
}
