use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Credential file name in the data directory
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Access tokens are kept for a day; the server-side lifetime is shorter.
const ACCESS_TOKEN_TTL_DAYS: i64 = 1;

/// Refresh token, tenant and identity values outlive the access token.
const SESSION_VALUE_TTL_DAYS: i64 = 7;

/// Fallback display name when a session is restored without an email
const UNKNOWN_USER: &str = "User";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Named values held by the store. Each has its own lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
    TenantSlug,
    UserEmail,
    TenantUserId,
    TenantId,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 6] = [
        CredentialKey::AccessToken,
        CredentialKey::RefreshToken,
        CredentialKey::TenantSlug,
        CredentialKey::UserEmail,
        CredentialKey::TenantUserId,
        CredentialKey::TenantId,
    ];

    pub fn ttl(self) -> Duration {
        match self {
            CredentialKey::AccessToken => Duration::days(ACCESS_TOKEN_TTL_DAYS),
            _ => Duration::days(SESSION_VALUE_TTL_DAYS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredValue {
    fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Point-in-time copy of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub tenant_slug: Option<String>,
    pub user_email: Option<String>,
    pub tenant_user_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// Identity recovered from persisted credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub email: String,
    pub tenant_slug: String,
}

/// Small durable store for the session credentials.
///
/// Values behave like browser cookies: each one expires independently and
/// reads as absent afterwards. When opened with a path, every mutation
/// rewrites the backing JSON file.
pub struct CredentialStore {
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<CredentialKey, StoredValue>>,
}

impl CredentialStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open a file-backed store, loading whatever is already on disk.
    /// A missing file is an empty store; an unreadable one is logged and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match Self::read_file(&path) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable credential file");
                BTreeMap::new()
            }
        };
        debug!(path = %path.display(), entries = values.len(), "Credential store opened");
        Self {
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    /// Open `credentials.json` inside `dir`
    pub fn open_in(dir: &Path) -> Self {
        Self::open(dir.join(CREDENTIALS_FILE))
    }

    fn read_file(path: &Path) -> anyhow::Result<BTreeMap<CredentialKey, StoredValue>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<CredentialKey, StoredValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, values: &BTreeMap<CredentialKey, StoredValue>) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(path, contents).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Read a value as of `now`
    pub fn get_at(&self, key: CredentialKey, now: DateTime<Utc>) -> Option<String> {
        self.lock()
            .get(&key)
            .filter(|stored| stored.is_live_at(now))
            .map(|stored| stored.value.clone())
    }

    pub fn get(&self, key: CredentialKey) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    /// Apply a batch of writes and removals as of `now`, pruning expired values.
    fn update_at(
        &self,
        now: DateTime<Utc>,
        writes: &[(CredentialKey, &str)],
        removals: &[CredentialKey],
    ) -> Result<(), StoreError> {
        let mut values = self.lock();
        values.retain(|_, stored| stored.is_live_at(now));
        for (key, value) in writes {
            values.insert(
                *key,
                StoredValue {
                    value: (*value).to_string(),
                    expires_at: now + key.ttl(),
                },
            );
        }
        for key in removals {
            values.remove(key);
        }
        self.persist(&values)
    }

    pub fn set_at(&self, key: CredentialKey, value: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.update_at(now, &[(key, value)], &[])
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(CredentialKey::AccessToken)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(CredentialKey::RefreshToken)
    }

    pub fn tenant_slug(&self) -> Option<String> {
        self.get(CredentialKey::TenantSlug)
    }

    pub fn user_email(&self) -> Option<String> {
        self.get(CredentialKey::UserEmail)
    }

    pub fn tenant_user_id(&self) -> Option<String> {
        self.get(CredentialKey::TenantUserId)
    }

    pub fn tenant_id(&self) -> Option<String> {
        self.get(CredentialKey::TenantId)
    }

    /// Store new tokens. An absent argument leaves the current value untouched.
    pub fn set_tokens(&self, access: Option<&str>, refresh: Option<&str>) -> Result<(), StoreError> {
        let mut writes = Vec::with_capacity(2);
        if let Some(access) = access.filter(|t| !t.is_empty()) {
            writes.push((CredentialKey::AccessToken, access));
        }
        if let Some(refresh) = refresh.filter(|t| !t.is_empty()) {
            writes.push((CredentialKey::RefreshToken, refresh));
        }
        self.update_at(Utc::now(), &writes, &[])
    }

    pub fn set_tenant_slug(&self, slug: &str) -> Result<(), StoreError> {
        self.set_at(CredentialKey::TenantSlug, slug, Utc::now())
    }

    pub fn set_user_email(&self, email: &str) -> Result<(), StoreError> {
        self.set_at(CredentialKey::UserEmail, email, Utc::now())
    }

    pub fn set_tenant_info(&self, user_id: Option<&str>, tenant_id: Option<&str>) -> Result<(), StoreError> {
        let mut writes = Vec::with_capacity(2);
        if let Some(user_id) = user_id {
            writes.push((CredentialKey::TenantUserId, user_id));
        }
        if let Some(tenant_id) = tenant_id {
            writes.push((CredentialKey::TenantId, tenant_id));
        }
        self.update_at(Utc::now(), &writes, &[])
    }

    /// Remove every stored value (sign-out)
    pub fn clear(&self) -> Result<(), StoreError> {
        debug!("Clearing stored credentials");
        self.update_at(Utc::now(), &[], &CredentialKey::ALL)
    }

    pub fn snapshot(&self) -> CredentialBundle {
        let now = Utc::now();
        CredentialBundle {
            access_token: self.get_at(CredentialKey::AccessToken, now),
            refresh_token: self.get_at(CredentialKey::RefreshToken, now),
            tenant_slug: self.get_at(CredentialKey::TenantSlug, now),
            user_email: self.get_at(CredentialKey::UserEmail, now),
            tenant_user_id: self.get_at(CredentialKey::TenantUserId, now),
            tenant_id: self.get_at(CredentialKey::TenantId, now),
        }
    }

    /// The signed-in identity, if both an access token and a tenant are stored
    pub fn restore_session(&self) -> Option<SignedInUser> {
        let bundle = self.snapshot();
        bundle.access_token.as_ref()?;
        let tenant_slug = bundle.tenant_slug?;
        Some(SignedInUser {
            email: bundle.user_email.unwrap_or_else(|| UNKNOWN_USER.to_string()),
            tenant_slug,
        })
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token values stay out of logs.
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("keys", &self.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
