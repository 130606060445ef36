//! REST API client module for the TRS backend.
//!
//! This module provides the `ApiClient`, the single shared transport used
//! for every backend call. Authenticated requests carry
//! `Authorization: Token <key>`, where the key comes from the login
//! endpoint.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, ErrorKind, FieldErrors};
