use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Unauthorized - token may be invalid")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification callers use to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Field-keyed messages, shown next to the offending input
    Validation,
    /// Bad credentials or a rejected token
    Authentication,
    /// Network failure or timeout
    Transport,
    Other,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Keys the backend uses for messages not tied to a single field
const GENERAL_ERROR_KEYS: [&str; 2] = ["detail", "non_field_errors"];

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let fields = FieldErrors::parse(body);
        let message = fields
            .as_ref()
            .and_then(|f| f.general_message())
            .unwrap_or_else(|| Self::truncate_body(body));

        match status.as_u16() {
            400 => match fields {
                Some(fields) if !fields.is_empty() => ApiError::Validation(fields),
                _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
            },
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::InvalidCredentials(_) | ApiError::Unauthorized => ErrorKind::Authentication,
            ApiError::Network(_) => ErrorKind::Transport,
            _ => ErrorKind::Other,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Field-keyed validation messages, e.g. `{"username": ["This field is required."]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Parse an error body. Values may be a string, a list of strings, or a
    /// nested object (flattened as `parent.child`). Returns `None` when the
    /// body is not a JSON object.
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        let mut map = BTreeMap::new();
        for (key, value) in object {
            Self::collect(key, value, &mut map);
        }
        Some(Self(map))
    }

    fn collect(key: &str, value: &Value, map: &mut BTreeMap<String, Vec<String>>) {
        match value {
            Value::String(s) => map.entry(key.to_string()).or_default().push(s.clone()),
            Value::Array(items) => {
                for item in items {
                    Self::collect(key, item, map);
                }
            }
            Value::Object(nested) => {
                for (child, value) in nested {
                    Self::collect(&format!("{}.{}", key, child), value, map);
                }
            }
            Value::Null => {}
            other => map.entry(key.to_string()).or_default().push(other.to_string()),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// True for keys that carry form-level messages rather than naming an input
    pub fn is_general(field: &str) -> bool {
        GENERAL_ERROR_KEYS.contains(&field)
    }

    /// True when at least one message is tied to a specific input field
    pub fn has_field_errors(&self) -> bool {
        self.0.keys().any(|k| !Self::is_general(k))
    }

    /// The first message not tied to a specific field, if any
    pub fn general_message(&self) -> Option<String> {
        GENERAL_ERROR_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key))
            .flat_map(|msgs| msgs.first())
            .next()
            .cloned()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}
