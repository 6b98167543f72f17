//! Tenant authentication endpoints under `/tenant_auth/{slug}/`.

use serde_json::{json, Value};
use tracing::{info, warn};

use super::client::{ApiClient, ApiRequest};
use super::ApiError;

/// Tokens and tenant identifiers returned by sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct SigninResponse {
    pub message: Option<String>,
    pub access: String,
    pub refresh: Option<String>,
    pub tenant_user_id: Option<String>,
    pub tenant_id: Option<String>,
}

fn id_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SigninResponse {
    /// Tokens are nested under `data`, or sit at the top level.
    pub fn from_body(body: &Value) -> Result<Self, ApiError> {
        let tokens = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
        let access = tokens
            .get("access")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Sign-in response did not contain an access token".to_string()))?;

        Ok(Self {
            message: body.get("message").and_then(Value::as_str).map(str::to_string),
            access: access.to_string(),
            refresh: tokens.get("refresh").and_then(Value::as_str).map(str::to_string),
            tenant_user_id: id_field(body, "tenant_user_id"),
            tenant_id: id_field(body, "tenant_id"),
        })
    }
}

fn auth_endpoint(slug: &str, action: &str) -> String {
    format!("/tenant_auth/{}/{}", slug, action)
}

impl ApiClient {
    /// Start sign-up; the server emails a verification code
    pub async fn signup(
        &self,
        slug: &str,
        email: &str,
        password: &str,
        reenter_password: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.send(ApiRequest::post(auth_endpoint(slug, "signup")).json(json!({
            "email": email,
            "password": password,
            "reenter_password": reenter_password,
        })))
        .await
    }

    /// Finish sign-up with the emailed verification code
    pub async fn verify_signup(
        &self,
        slug: &str,
        email: &str,
        password: &str,
        reenter_password: &str,
        verification_key: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.send(ApiRequest::post(auth_endpoint(slug, "signup")).json(json!({
            "email": email,
            "password": password,
            "reenter_password": reenter_password,
            "verification_key": verification_key,
        })))
        .await
    }

    /// Ask the server to resend the verification code
    pub async fn send_verification(&self, slug: &str, email: &str) -> Result<Option<Value>, ApiError> {
        self.send(ApiRequest::post(auth_endpoint(slug, "send-verification")).json(json!({
            "email": email,
            "tenant_slug": slug,
        })))
        .await
    }

    /// Sign in and store the session credentials
    pub async fn signin(&self, slug: &str, email: &str, password: &str) -> Result<SigninResponse, ApiError> {
        let body = self
            .send(ApiRequest::post(auth_endpoint(slug, "signin")).json(json!({
                "email": email,
                "password": password,
            })))
            .await?
            .ok_or_else(|| ApiError::InvalidResponse("Empty sign-in response".to_string()))?;

        let signin = SigninResponse::from_body(&body)?;

        let credentials = self.credentials();
        credentials.set_tokens(Some(&signin.access), signin.refresh.as_deref())?;
        credentials.set_tenant_slug(slug)?;
        credentials.set_user_email(email)?;
        credentials.set_tenant_info(signin.tenant_user_id.as_deref(), signin.tenant_id.as_deref())?;

        info!(tenant = slug, "Signed in");
        Ok(signin)
    }

    /// Revoke the refresh token on the server. Local credentials are cleared
    /// whether or not the server call succeeds.
    pub async fn signout(&self, slug: &str) -> Result<(), ApiError> {
        let refresh = self.credentials().refresh_token();
        let result = self
            .send(
                ApiRequest::post(auth_endpoint(slug, "signout"))
                    .json(json!({ "refresh": refresh }))
                    .authenticated(slug),
            )
            .await;

        let cleared = self.credentials().clear();
        if let Err(ref e) = result {
            warn!(tenant = slug, error = %e, "Server sign-out failed; local credentials cleared");
        } else {
            info!(tenant = slug, "Signed out");
        }
        result?;
        cleared?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        slug: &str,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.send(
            ApiRequest::post(auth_endpoint(slug, "change-password"))
                .json(json!({
                    "old_password": old_password,
                    "new_password": new_password,
                    "confirm_password": confirm_password,
                }))
                .authenticated(slug),
        )
        .await
    }

    /// Request a password-reset code by email
    pub async fn forgot_password(&self, slug: &str, email: &str) -> Result<Option<Value>, ApiError> {
        self.send(ApiRequest::post(auth_endpoint(slug, "forgot-password")).json(json!({
            "tenant_slug": slug,
            "email": email,
        })))
        .await
    }

    pub async fn reset_password(
        &self,
        slug: &str,
        email: &str,
        otp: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Option<Value>, ApiError> {
        self.send(ApiRequest::post(auth_endpoint(slug, "reset-password")).json(json!({
            "tenant_slug": slug,
            "email": email,
            "otp": otp,
            "new_password": new_password,
            "confirm_password": confirm_password,
        })))
        .await
    }
}
