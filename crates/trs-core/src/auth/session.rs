use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ErrorKind, FieldErrors};
use crate::models::UserProfile;

/// Error payload recorded on the session after a failed login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Per-field messages; empty unless `kind` is `Validation`
    #[serde(default)]
    pub fields: FieldErrors,
}

impl ErrorInfo {
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ApiError>() {
            Some(api_err) => Self {
                kind: api_err.kind(),
                message: match api_err {
                    ApiError::InvalidCredentials(message) => message.clone(),
                    other => other.to_string(),
                },
                fields: api_err.field_errors().cloned().unwrap_or_default(),
            },
            None => Self {
                kind: ErrorKind::Other,
                message: format!("{:#}", err),
                fields: FieldErrors::default(),
            },
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// In-memory authentication state.
///
/// `token` is set iff the session is authenticated; `user` is only ever set
/// alongside a token. Fields are private so the pair can only change
/// together through `authenticate` and `clear`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
    error: Option<ErrorInfo>,
    authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.authenticated_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    /// Replace token and user together and clear any previous error
    pub(crate) fn authenticate(&mut self, token: String, user: Option<UserProfile>) {
        self.token = Some(token);
        self.user = user;
        self.error = None;
        self.authenticated_at = Some(Utc::now());
    }

    /// Reinstate a persisted token. The original login time is unknown.
    pub(crate) fn restore(&mut self, token: String, user: Option<UserProfile>) {
        self.token = Some(token);
        self.user = user;
        self.error = None;
        self.authenticated_at = None;
    }

    pub(crate) fn record_error(&mut self, error: ErrorInfo) {
        self.error = Some(error);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Emitted by the session store on every transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Authenticated {
        token: String,
        username: Option<String>,
    },
    Unauthenticated,
}

impl SessionEvent {
    pub fn state(&self) -> SessionState {
        match self {
            SessionEvent::Authenticated { .. } => SessionState::Authenticated,
            SessionEvent::Unauthenticated => SessionState::Unauthenticated,
        }
    }
}

/// Something that must track session changes synchronously, such as the
/// HTTP client's default headers.
///
/// Callbacks run while the store's transition is still in progress. They
/// may read the store (`user()`, `snapshot()`), but must not call `login`,
/// `logout` or `initialize` from inside `session_changed`.
pub trait SessionObserver: Send + Sync {
    fn session_changed(&self, event: &SessionEvent);
}
