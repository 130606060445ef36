//! Core library for the TRS student records client.
//!
//! - `api`: the shared, token-aware HTTP client and its error types
//! - `auth`: the session store, session events and token storage
//! - `models`: user profile and request/response types
//! - `config`: backend URL and storage selection

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ErrorKind, FieldErrors};
pub use auth::{ErrorInfo, Session, SessionEvent, SessionObserver, SessionState, SessionStore};
pub use config::{Config, StorageBackend};
pub use models::{Department, RegistrationRequest, Role, RoleType, UserProfile};

use std::sync::Arc;

use anyhow::Result;

/// Build the process-wide client and session store from `config`, with the
/// client's headers attached to the session. Call `initialize` on the
/// returned store to pick up a persisted token.
pub fn connect(config: &Config) -> Result<(ApiClient, Arc<SessionStore>)> {
    let client = ApiClient::new(config.api_base_url())?;
    let store = Arc::new(SessionStore::new(client.clone(), config.token_store()?));
    client.attach(&store);
    Ok((client, store))
}
