//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: login/logout/rehydration and session-changed events
//! - `Session`: the in-memory token + profile pair
//! - `TokenStore`: durable storage for the token (file, keychain, memory)

pub mod session;
pub mod store;
pub mod token_store;

pub use session::{ErrorInfo, Session, SessionEvent, SessionObserver, SessionState};
pub use store::SessionStore;
pub use token_store::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY, USER_KEY,
};
