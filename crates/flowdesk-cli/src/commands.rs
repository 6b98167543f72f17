//! Command handlers. Each one resolves the tenant, calls the API client and
//! prints the result as text or JSON.

use std::io::{self, Write};

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::warn;

use flowdesk_core::auth::{claims, Keychain};
use flowdesk_core::models::{RequestStatus, StepState, WorkflowApplication, WorkflowRequest};
use flowdesk_core::{ApiClient, ApiError, Config};

/// Password taken from the environment instead of prompting
const PASSWORD_ENV: &str = "FLOWDESK_PASSWORD";

/// Turn an API failure into a user-facing error, keeping the source for logs.
fn report(err: ApiError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn prompt_password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    if password.is_empty() {
        return Err(anyhow!("{} is required", label));
    }
    Ok(password)
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Prompt for a new password twice, returning both entries
fn prompt_new_password() -> Result<(String, String)> {
    let password = prompt_password("New password")?;
    let confirm = prompt_password("Confirm password")?;
    Ok((password, confirm))
}

fn print_message(body: Option<&Value>, fallback: &str) {
    let message = body
        .and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback);
    println!("{}", message);
}

pub struct Session {
    config: Config,
    api: ApiClient,
    tenant: Option<String>,
    json: bool,
}

impl Session {
    pub fn new(config: Config, api: ApiClient, tenant: Option<String>, json: bool) -> Self {
        Self {
            config,
            api,
            tenant,
            json,
        }
    }

    /// Tenant from `--tenant`, then the stored session, then the config
    fn tenant(&self) -> Result<String> {
        self.tenant
            .clone()
            .or_else(|| self.api.credentials().tenant_slug())
            .or_else(|| self.config.last_tenant.clone())
            .ok_or_else(|| anyhow!("No tenant selected. Pass --tenant <slug>."))
    }

    /// Email from the command line, then the last one signed in with
    fn email(&self, email: Option<String>) -> Result<String> {
        email
            .filter(|e| !e.trim().is_empty())
            .or_else(|| self.config.last_email.clone())
            .ok_or_else(|| anyhow!("No email given. Pass the email to sign in with."))
    }

    fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn print_body(&self, body: Option<Value>, fallback: &str) -> Result<()> {
        if self.json {
            return self.print_json(&body.unwrap_or(Value::Null));
        }
        print_message(body.as_ref(), fallback);
        Ok(())
    }

    // ===== Account =====

    pub async fn signup(&self, email: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let password = prompt_password("Password")?;
        let reenter = prompt_password("Re-enter password")?;
        let body = self
            .api
            .signup(&tenant, email, &password, &reenter)
            .await
            .map_err(report)?;
        self.print_body(body, "Verification code sent. Finish with `flowdesk verify`.")
    }

    pub async fn verify(&self, email: &str, code: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let password = prompt_password("Password")?;
        let reenter = prompt_password("Re-enter password")?;
        let body = self
            .api
            .verify_signup(&tenant, email, &password, &reenter, code)
            .await
            .map_err(report)?;
        self.print_body(body, "Account created. Sign in with `flowdesk signin`.")
    }

    pub async fn send_verification(&self, email: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let body = self.api.send_verification(&tenant, email).await.map_err(report)?;
        self.print_body(body, "Verification code sent.")
    }

    pub async fn signin(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        let tenant = self.tenant()?;
        let email = self.email(email)?;
        let email = email.as_str();

        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ if Keychain::has_credentials(&tenant, email) => {
                let answer = prompt_line("Use stored password? [Y/n]: ")?;
                if answer.to_lowercase() != "n" {
                    Keychain::get_password(&tenant, email)?
                } else {
                    prompt_password("Password")?
                }
            }
            _ => prompt_password("Password")?,
        };

        let signin = self.api.signin(&tenant, email, &password).await.map_err(report)?;

        if remember {
            if let Err(e) = Keychain::store(&tenant, email, &password) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_tenant = Some(tenant.clone());
        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        if self.json {
            return self.print_json(&serde_json::json!({
                "tenant": tenant,
                "email": email,
                "tenant_user_id": signin.tenant_user_id,
                "tenant_id": signin.tenant_id,
            }));
        }
        println!(
            "{}",
            signin.message.as_deref().unwrap_or("Signed in.")
        );
        Ok(())
    }

    pub async fn signout(&self) -> Result<()> {
        let tenant = match self.tenant() {
            Ok(tenant) => tenant,
            Err(e) => {
                // Nothing to revoke server-side, but local tokens still go.
                self.api.credentials().clear()?;
                return Err(e);
            }
        };
        let email = self.api.credentials().user_email();

        let result = self.api.signout(&tenant).await;

        if let Some(email) = email {
            if Keychain::has_credentials(&tenant, &email) {
                if let Err(e) = Keychain::delete(&tenant, &email) {
                    warn!(error = %e, "Failed to delete stored password");
                }
            }
        }

        match result {
            Ok(()) => println!("Signed out."),
            // Local credentials are gone either way.
            Err(e) => println!("Signed out locally ({}).", e.user_message()),
        }
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let credentials = self.api.credentials();
        let Some(user) = credentials.restore_session() else {
            return Err(anyhow!("Not signed in. Run `flowdesk signin <email>`."));
        };

        let expires_at = credentials
            .access_token()
            .as_deref()
            .and_then(claims::decode_claims)
            .and_then(|c| c.expires_at());
        let expired = claims::is_expired(credentials.access_token().as_deref());

        if self.json {
            return self.print_json(&serde_json::json!({
                "email": user.email,
                "tenant": user.tenant_slug,
                "access_token_expires_at": expires_at.map(|t| t.to_rfc3339()),
                "access_token_expired": expired,
            }));
        }

        println!("{} @ {}", user.email, user.tenant_slug);
        match expires_at {
            Some(at) if expired => println!("Access token expired {} (will refresh on next call)", at.to_rfc3339()),
            Some(at) => println!("Access token valid until {}", at.to_rfc3339()),
            None => println!("Access token expiry unknown"),
        }
        Ok(())
    }

    pub async fn change_password(&self) -> Result<()> {
        let tenant = self.tenant()?;
        let old = prompt_password("Current password")?;
        let (new, confirm) = prompt_new_password()?;
        let body = self
            .api
            .change_password(&tenant, &old, &new, &confirm)
            .await
            .map_err(report)?;
        self.print_body(body, "Password changed.")
    }

    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let body = self.api.forgot_password(&tenant, email).await.map_err(report)?;
        self.print_body(body, "Reset code sent. Finish with `flowdesk reset-password`.")
    }

    pub async fn reset_password(&self, email: &str, otp: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let (new, confirm) = prompt_new_password()?;
        let body = self
            .api
            .reset_password(&tenant, email, otp, &new, &confirm)
            .await
            .map_err(report)?;
        self.print_body(body, "Password reset.")
    }

    // ===== Workflows =====

    pub async fn templates(&self) -> Result<()> {
        let tenant = self.tenant()?;
        let templates = self.api.templates(&tenant).await.map_err(report)?;
        if self.json {
            return self.print_json(&templates);
        }
        if templates.is_empty() {
            println!("No workflow templates.");
        }
        for template in &templates {
            println!(
                "{:>6}  {}  - {}",
                template.id,
                template.display_name(),
                template.display_description()
            );
        }
        Ok(())
    }

    pub async fn apply(&self, definition_id: &str, title: String, description: Option<String>) -> Result<()> {
        if title.trim().is_empty() {
            return Err(anyhow!("A title is required"));
        }
        let tenant = self.tenant()?;
        let application = WorkflowApplication {
            title,
            description,
            requester_description: None,
        };
        let body = self
            .api
            .apply_workflow(&tenant, definition_id, &application)
            .await
            .map_err(report)?;
        self.print_body(body, "Request submitted.")
    }

    pub async fn status(&self, request_id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let status = self.api.request_status(&tenant, request_id).await.map_err(report)?;
        if self.json {
            return self.print_json(&status);
        }
        print_status(&status);
        Ok(())
    }

    pub async fn my_requests(&self) -> Result<()> {
        let tenant = self.tenant()?;
        let requests = self.api.my_workflows(&tenant).await.map_err(report)?;
        self.print_requests(&requests, "You have not submitted any requests.")
    }

    pub async fn pending(&self) -> Result<()> {
        let tenant = self.tenant()?;
        let requests = self.api.pending_approvals(&tenant).await.map_err(report)?;
        self.print_requests(&requests, "Nothing waiting on your approval.")
    }

    pub async fn approve(&self, request_id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let body = self.api.approve_request(&tenant, request_id).await.map_err(report)?;
        self.print_body(body, "Request approved.")
    }

    pub async fn reject(&self, request_id: &str, reason: &str) -> Result<()> {
        let tenant = self.tenant()?;
        let body = self
            .api
            .reject_request(&tenant, request_id, reason)
            .await
            .map_err(report)?;
        self.print_body(body, "Request rejected.")
    }

    fn print_requests(&self, requests: &[WorkflowRequest], empty: &str) -> Result<()> {
        if self.json {
            return self.print_json(&requests);
        }
        if requests.is_empty() {
            println!("{}", empty);
        }
        for request in requests {
            println!(
                "{:>6}  {:<10}  {}{}",
                request.identifier().unwrap_or("-"),
                request.status_display(),
                request.title.as_deref().unwrap_or("(untitled)"),
                request
                    .requested_by
                    .as_deref()
                    .map(|by| format!("  [{}]", by))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }
}

fn print_status(status: &RequestStatus) {
    let info = &status.request_info;
    println!(
        "#{}  {}",
        info.request_id.as_deref().unwrap_or("?"),
        info.title.as_deref().unwrap_or("(untitled)")
    );
    println!("Status: {}", info.status.as_deref().unwrap_or("pending"));
    if let Some(ref by) = info.requested_by {
        println!("Requested by: {}", by);
    }
    if let Some(ref at) = info.date_submitted {
        println!("Submitted: {}", at);
    }
    println!(
        "Progress: {} of {} steps ({:.0}%)",
        status.progress.steps_completed, status.progress.total_steps, status.progress.percentage
    );

    for (index, step) in status.approval_workflow.iter().enumerate() {
        let marker = match step.state() {
            StepState::Completed => "[x]",
            StepState::Rejected => "[!]",
            StepState::Current => "[>]",
            StepState::Waiting => "[ ]",
        };
        let mut line = format!(
            "  {} {}. {}",
            marker,
            index + 1,
            step.role.as_deref().unwrap_or("Approver")
        );
        if let Some(ref by) = step.approved_by {
            line.push_str(&format!(" - {}", by));
        }
        if let Some(ref at) = step.action_at {
            line.push_str(&format!(" ({})", at));
        }
        println!("{}", line);
        if let Some(ref reason) = step.rejection_reason {
            println!("      \"{}\"", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use flowdesk_core::CredentialStore;

    fn session(config: Config, credentials: Arc<CredentialStore>, tenant: Option<&str>) -> Session {
        // Nothing listens here; these tests must never reach the network.
        let api = ApiClient::with_parts(
            "http://127.0.0.1:9",
            credentials,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        Session::new(config, api, tenant.map(str::to_string), false)
    }

    #[test]
    fn test_email_falls_back_to_last_email() {
        let config = Config {
            last_email: Some("ann@acme.test".to_string()),
            ..Config::default()
        };
        let session = session(config, Arc::new(CredentialStore::in_memory()), Some("acme"));

        assert_eq!(session.email(None).unwrap(), "ann@acme.test");
        assert_eq!(session.email(Some("  ".to_string())).unwrap(), "ann@acme.test");
        assert_eq!(session.email(Some("bob@acme.test".to_string())).unwrap(), "bob@acme.test");
    }

    #[test]
    fn test_email_required_without_history() {
        let session = session(Config::default(), Arc::new(CredentialStore::in_memory()), Some("acme"));
        assert!(session.email(None).is_err());
    }

    #[tokio::test]
    async fn test_signout_without_tenant_still_clears_credentials() {
        let credentials = Arc::new(CredentialStore::in_memory());
        credentials.set_tokens(Some("access"), Some("refresh")).unwrap();
        credentials.set_user_email("ann@acme.test").unwrap();
        let session = session(Config::default(), credentials.clone(), None);

        assert!(session.signout().await.is_err());
        assert_eq!(credentials.access_token(), None);
        assert_eq!(credentials.refresh_token(), None);
        assert_eq!(credentials.user_email(), None);
    }
}
