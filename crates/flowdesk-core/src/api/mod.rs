//! REST API client module for the tenant workflow backend.
//!
//! This module provides the `ApiClient` gateway plus the auth and workflow
//! endpoints built on it. Authenticated calls carry an
//! `Authorization: Bearer <access token>` header and are refreshed through
//! the session's `RefreshCoordinator`.

pub mod auth;
pub mod client;
pub mod error;
pub mod workflows;

pub use auth::SigninResponse;
pub use client::{ApiClient, ApiRequest};
pub use error::ApiError;
