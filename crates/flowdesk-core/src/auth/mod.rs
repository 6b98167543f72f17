//! Session credentials and token lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: durable access/refresh token, tenant and identity values,
//!   each with its own expiry
//! - `claims`: access-token expiry checks with a safety margin
//! - `RefreshCoordinator`: single-flight token refresh shared by all callers
//! - `Keychain`: optional OS-level storage for remembered passwords

pub mod claims;
pub mod credentials;
pub mod keychain;
pub mod refresh;

pub use credentials::{CredentialBundle, CredentialKey, CredentialStore, SignedInUser, StoreError};
pub use keychain::Keychain;
pub use refresh::{RefreshCoordinator, RefreshError, RefreshResult};
