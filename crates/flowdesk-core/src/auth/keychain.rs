use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "flowdesk";

/// Passwords remembered in the OS keychain, one per tenant account.
pub struct Keychain;

impl Keychain {
    /// Keychain user name for an account: `tenant/email`
    pub fn account(tenant: &str, email: &str) -> String {
        format!("{}/{}", tenant, email.to_lowercase())
    }

    fn entry(tenant: &str, email: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &Self::account(tenant, email))
            .context("Failed to create keyring entry")
    }

    /// Store the password for an account
    pub fn store(tenant: &str, email: &str, password: &str) -> Result<()> {
        Self::entry(tenant, email)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Retrieve the remembered password for an account
    pub fn get_password(tenant: &str, email: &str) -> Result<String> {
        Self::entry(tenant, email)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Forget the remembered password for an account
    pub fn delete(tenant: &str, email: &str) -> Result<()> {
        Self::entry(tenant, email)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }

    pub fn has_credentials(tenant: &str, email: &str) -> bool {
        Self::entry(tenant, email)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }
}
