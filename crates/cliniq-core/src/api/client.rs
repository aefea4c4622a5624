//! HTTP client for the clinic platform's authentication API.
//!
//! This module owns the wire-level contract: the login, token-verify and
//! token-refresh endpoints, plus `send` for arbitrary bearer-authenticated
//! requests. Session bookkeeping (persistence, renewal policy) lives in
//! `auth::SessionManager`; nothing here touches the store.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint (credentials in, token pair out)
const LOGIN_PATH: &str = "/users/api/auth/login/";

/// Token verification endpoint (validity signalled by HTTP status only)
const VERIFY_PATH: &str = "/users/api/token/verify/";

/// Token refresh endpoint (refresh token in, new access token out)
const REFRESH_PATH: &str = "/users/api/token/refresh/";

/// HTTP request timeout in seconds.
/// 30s allows for slow clinic-network links while still failing fast enough.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Wire types
// ============================================================================

/// Successful login response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    /// Raw role string; normalized to `models::Role` by the session manager
    pub user_type: String,
    pub user: LoginUser,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub patient_id: Option<i64>,
    #[serde(default)]
    pub clinic_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Error bodies carry a human-readable `detail` field when the backend has
/// something to say.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

// ============================================================================
// Request options
// ============================================================================

/// Caller-facing request shape for `send` / `authenticated_request`.
///
/// `Authorization` and `Content-Type: application/json` are attached as
/// defaults; a caller-supplied header with the same name shadows them.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::default()
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// API client for the clinic platform.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Exchange credentials for a token pair and user record.
    ///
    /// A rejected login surfaces the response's `detail` message as
    /// `ApiError::InvalidCredentials`; no panic on any input.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .context("Failed to send login request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.detail)
                .unwrap_or_else(|| "Login failed".to_string());
            debug!(%status, "login rejected by server");
            return Err(ApiError::InvalidCredentials(detail).into());
        }

        response
            .json()
            .await
            .context("Failed to parse login response")
    }

    /// Check whether an access token is still accepted by the backend.
    /// Validity is carried by the HTTP status alone.
    pub async fn verify(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .post(self.url(VERIFY_PATH))
            .json(&json!({ "token": token }))
            .send()
            .await
            .context("Failed to send token verify request")?;

        Ok(response.status().is_success())
    }

    /// Exchange a refresh token for a new access token.
    /// The refresh token itself is not rotated by this endpoint.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refresh": refresh_token }))
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %ApiError::truncate_body(&body), "token refresh rejected");
            return Err(ApiError::RefreshFailed.into());
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;
        Ok(parsed.access)
    }

    /// Issue an arbitrary request with bearer auth attached.
    ///
    /// The raw response is returned regardless of status; interpreting
    /// business-level errors is the caller's job.
    pub async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        token: &str,
    ) -> Result<reqwest::Response> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Access token is not a valid header value")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Caller headers land last so they shadow the defaults
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            headers.insert(name, value);
        }

        let mut request = self
            .client
            .request(options.method.clone(), self.url(path))
            .headers(headers);
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", options.method, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{
            "access": "A1",
            "refresh": "R1",
            "user_type": "doctor",
            "user": {
                "id": 7,
                "username": "doc1",
                "email": "d@x.com",
                "first_name": "A",
                "last_name": "B",
                "is_superuser": false
            },
            "doctor_id": 7
        }"#;

        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access, "A1");
        assert_eq!(resp.user_type, "doctor");
        assert_eq!(resp.user.id, 7);
        assert_eq!(resp.doctor_id, Some(7));
        assert_eq!(resp.patient_id, None);
        assert_eq!(resp.clinic_id, None);
    }

    #[test]
    fn test_parse_login_response_without_optional_ids() {
        let json = r#"{
            "access": "A1",
            "refresh": "R1",
            "user_type": "superuser",
            "user": {
                "id": 1,
                "username": "root",
                "email": "root@x.com",
                "first_name": "Root",
                "last_name": "User",
                "is_superuser": true
            }
        }"#;

        let resp: LoginResponse = serde_json::from_str(json).unwrap();
        assert!(resp.user.is_superuser);
        assert_eq!(resp.doctor_id, None);
    }

    #[test]
    fn test_request_options_default_is_get() {
        let options = RequestOptions::get();
        assert_eq!(options.method, Method::GET);
        assert!(options.body.is_none());
        assert!(options.headers.is_empty());
    }

    #[test]
    fn test_url_join_handles_missing_slash() {
        let client = ApiClient::new("https://api.example.com/").unwrap();
        assert_eq!(
            client.url("/appointments/api/list/"),
            "https://api.example.com/appointments/api/list/"
        );
        assert_eq!(
            client.url("appointments/api/list/"),
            "https://api.example.com/appointments/api/list/"
        );
    }
}
