//! Shared HTTP client for the TRS REST API.
//!
//! One `ApiClient` is configured per process and cloned wherever requests
//! are made. Clones share the connection pool and the default-header map,
//! so a token installed through one clone is sent by all of them.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{SessionEvent, SessionObserver, SessionStore};
use crate::models::{LoginRequest, LoginResponse, RegistrationRequest, Role, UserProfile};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Scheme used in the Authorization header for backend-issued tokens
const TOKEN_SCHEME: &str = "Token";

/// API client for the TRS backend.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    headers: Arc<RwLock<header::HeaderMap>>,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g. `https://host/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    /// Have this client's default headers follow `store`'s session
    pub fn attach(&self, store: &SessionStore) {
        store.add_observer(Arc::new(self.clone()));
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `Authorization: Token <token>` on every subsequent request
    pub fn set_token(&self, token: &str) -> Result<()> {
        let mut value = header::HeaderValue::from_str(&format!("{} {}", TOKEN_SCHEME, token))
            .context("Token contains characters not allowed in a header")?;
        value.set_sensitive(true);
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(header::AUTHORIZATION, value);
        debug!("Authorization header set");
        Ok(())
    }

    /// Stop sending the Authorization header
    pub fn clear_token(&self) {
        self.headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(header::AUTHORIZATION);
        debug!("Authorization header cleared");
    }

    /// Current Authorization header value, if one is installed
    pub fn authorization(&self) -> Option<String> {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn default_headers(&self) -> header::HeaderMap {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .headers(self.default_headers())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send {} request to {}", method, path))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, self.request(Method::GET, path))
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, self.request(Method::POST, path).json(body))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PUT, path, self.request(Method::PUT, path).json(body))
            .await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PATCH, path, self.request(Method::PATCH, path).json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(ApiError::Network)
            .with_context(|| format!("Failed to send DELETE request to {}", path))?;
        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Endpoints =====

    /// Exchange credentials for a token and the user's profile.
    /// Rejections come back as `ApiError::InvalidCredentials`, or as
    /// `ApiError::Validation` when a specific field is at fault (e.g. blank).
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        // The backend answers bad credentials with 400 (form-level message),
        // 401 or 403 depending on its authentication classes
        self.post("/login/", &body)
            .await
            .map_err(|err| match err.downcast::<ApiError>() {
                Ok(ApiError::Validation(fields)) if !fields.has_field_errors() => {
                    let message = fields
                        .general_message()
                        .unwrap_or_else(|| "Invalid Credentials".to_string());
                    anyhow::Error::from(ApiError::InvalidCredentials(message))
                }
                Ok(ApiError::Unauthorized) => anyhow::Error::from(ApiError::InvalidCredentials(
                    "Invalid Credentials".to_string(),
                )),
                Ok(ApiError::AccessDenied(message)) => {
                    anyhow::Error::from(ApiError::InvalidCredentials(message))
                }
                Ok(other) => anyhow::Error::from(other),
                Err(err) => err,
            })
    }

    /// Create a student account. Returns the created profile.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<UserProfile> {
        self.post("/register/", request).await
    }

    pub async fn fetch_roles(&self) -> Result<Vec<Role>> {
        self.get("/roles/").await
    }

    pub async fn fetch_student(&self, username: &str) -> Result<UserProfile> {
        self.get(&format!("/students/{}/", username)).await
    }

    pub async fn fetch_teacher(&self, username: &str) -> Result<UserProfile> {
        self.get(&format!("/teachers/{}/", username)).await
    }
}

impl SessionObserver for ApiClient {
    fn session_changed(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Authenticated { token, .. } => {
                if let Err(e) = self.set_token(token) {
                    warn!(error = %e, "Failed to install session token");
                }
            }
            SessionEvent::Unauthenticated => self.clear_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use crate::models::RoleType;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(format!("{}/api/", server.uri())).expect("client")
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(client.url("/login/"), "http://localhost:8000/api/login/");
        assert_eq!(client.url("roles/"), "http://localhost:8000/api/roles/");
    }

    #[test]
    fn test_token_header_lifecycle() {
        let client = ApiClient::new("http://localhost:8000/api").unwrap();
        assert_eq!(client.authorization(), None);

        let shared = client.clone();
        client.set_token("abc123").unwrap();
        assert_eq!(shared.authorization().as_deref(), Some("Token abc123"));
        assert_eq!(
            shared.default_headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        shared.clear_token();
        assert_eq!(client.authorization(), None);
        assert!(client.set_token("bad\ntoken").is_err());
        assert_eq!(client.authorization(), None);
    }

    #[test]
    fn test_observer_follows_session_events() {
        let client = ApiClient::new("http://localhost:8000/api").unwrap();
        client.session_changed(&SessionEvent::Authenticated {
            token: "xyz".to_string(),
            username: None,
        });
        assert_eq!(client.authorization().as_deref(), Some("Token xyz"));

        client.session_changed(&SessionEvent::Unauthenticated);
        assert_eq!(client.authorization(), None);
    }

    #[tokio::test]
    async fn test_authorization_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/roles/"))
            .and(header_eq("Authorization", "Token abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.set_token("abc123").unwrap();
        let roles = client.fetch_roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].id, RoleType::Admin);
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/students/1604001/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"username": "1604001"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.set_token("abc123").unwrap();
        client.clear_token();
        let user = client.fetch_student("1604001").await.unwrap();
        assert_eq!(user.username, "1604001");

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .and(body_json(json!({"username": "alice", "password": "secret"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "key": "abc123",
                "user": {"username": "alice", "roles": [{"id": 2}], "department": "CSE"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client.login("alice", "secret").await.unwrap();
        assert_eq!(response.key, "abc123");
        assert_eq!(response.user.username, "alice");
        // Logging in through the client alone does not touch headers
        assert_eq!(client.authorization(), None);
    }

    #[tokio::test]
    async fn test_login_rejection_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"detail": "Invalid Credentials"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.login("alice", "wrong").await.unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().expect("ApiError");
        assert!(matches!(api_err, ApiError::InvalidCredentials(m) if m == "Invalid Credentials"));
        assert_eq!(api_err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_login_form_error_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"non_field_errors": ["Unable to log in with provided credentials."]}),
            ))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.login("alice", "wrong").await.unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().expect("ApiError");
        assert!(
            matches!(api_err, ApiError::InvalidCredentials(m) if m.starts_with("Unable to log in"))
        );
        assert_eq!(api_err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_register_form_error_is_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"non_field_errors": ["Passwords are too similar."]})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .register(&RegistrationRequest::new("1604001", "1604001"))
            .await
            .unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().expect("ApiError");
        assert_eq!(api_err.kind(), ErrorKind::Validation);
        assert_eq!(
            api_err.field_errors().and_then(|f| f.get("non_field_errors")),
            Some(&["Passwords are too similar.".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_register_surfaces_field_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "username": ["user with this username already exists."],
                "phone_number": ["Ensure this field has no more than 16 characters."]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .register(&RegistrationRequest::new("1604001", "pw"))
            .await
            .unwrap_err();
        let fields = err
            .downcast_ref::<ApiError>()
            .and_then(ApiError::field_errors)
            .expect("field errors");
        assert_eq!(fields.iter().count(), 2);
        assert!(fields.get("username").is_some());
    }

    #[tokio::test]
    async fn test_transport_error_is_classified() {
        // Nothing listens on port 9 on test hosts
        let client = ApiClient::new("http://127.0.0.1:9/api").unwrap();
        let err = client.fetch_roles().await.unwrap_err();
        let api_err = err.downcast_ref::<ApiError>().expect("ApiError");
        assert_eq!(api_err.kind(), ErrorKind::Transport);
    }
}
