//! Client library for the flowdesk multi-tenant workflow-approval backend.
//!
//! - `auth`: credential store, token expiry checks, single-flight refresh
//! - `api`: the request gateway and the auth/workflow endpoints
//! - `models`: workflow templates, requests and approval status
//! - `config`: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiRequest};
pub use auth::{CredentialStore, RefreshCoordinator, RefreshError};
pub use config::Config;
