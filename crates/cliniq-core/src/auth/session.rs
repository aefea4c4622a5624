//! Session lifecycle: login, logout, restoration at startup, and transparent
//! access-token renewal for authenticated requests.
//!
//! `SessionManager` is the single source of truth for "who is logged in" and
//! the only path the rest of the app uses for authenticated network I/O. It
//! owns an `ApiClient` and a `KeyValueStore`, both injected so tests can fake
//! the backend and the storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, LoginResponse, RequestOptions};
use crate::models::{Role, User};
use crate::store::{keys, KeyValueStore};

/// Extra attempts after a 401 triggers a token renewal. Hard cap: a second
/// consecutive 401 is handed back to the caller unmodified.
const MAX_AUTH_RETRIES: usize = 1;

/// In-memory session state. Either fully logged in or fully logged out;
/// a partially-populated session is unrepresentable.
#[derive(Debug, Clone)]
pub enum Session {
    LoggedOut,
    LoggedIn {
        user: User,
        access_token: String,
        refresh_token: String,
        logged_in_at: DateTime<Utc>,
    },
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        match self {
            Session::LoggedIn { user, .. } => Some(user),
            Session::LoggedOut => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, Session::LoggedIn { .. })
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::LoggedIn { logged_in_at, .. } => Some(*logged_in_at),
            Session::LoggedOut => None,
        }
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn KeyValueStore>,
    session: RwLock<Session>,
    /// True only until the initial `restore_session` completes
    loading: AtomicBool,
    /// Serializes token renewals so concurrent 401 holders trigger one
    /// refresh call between them
    renew_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api,
            store,
            session: RwLock::new(Session::LoggedOut),
            loading: AtomicBool::new(true),
            renew_gate: Mutex::new(()),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub async fn current_user(&self) -> Option<User> {
        self.session.read().await.user().cloned()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_logged_in()
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    /// True during initial session restoration at process start.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Re-establish the session from persisted credentials at startup.
    ///
    /// Restoration either fully succeeds (stored user parsed and token
    /// confirmed valid by the backend) or fully fails, wiping every persisted
    /// session key. Network and parse failures fail closed: a stale or
    /// unverified user is never left logged in. The loading flag drops
    /// exactly once, whatever the outcome.
    pub async fn restore_session(&self) -> Result<Option<User>> {
        let outcome = match self.try_restore().await {
            Ok(user) => Ok(user),
            Err(e) => {
                warn!(error = %e, "session restore failed, clearing stored session");
                self.clear_session_keys().map(|_| None)
            }
        };
        self.loading.store(false, Ordering::SeqCst);
        outcome
    }

    async fn try_restore(&self) -> Result<Option<User>> {
        let token = self.store.get(keys::USER_TOKEN)?;
        let user_json = self.store.get(keys::USER)?;

        let (Some(token), Some(user_json)) = (token, user_json) else {
            debug!("no stored credentials, starting logged out");
            self.clear_session_keys()?;
            return Ok(None);
        };

        if !self.api.verify(&token).await? {
            info!("stored access token rejected by server, clearing session");
            self.clear_session_keys()?;
            return Ok(None);
        }

        let user: User =
            serde_json::from_str(&user_json).context("Stored user record is corrupt")?;
        let refresh_token = self.store.get(keys::REFRESH_TOKEN)?.unwrap_or_default();
        let logged_in_at = self
            .store
            .get(keys::LOGGED_IN_AT)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        info!(username = %user.username, role = %user.role, "session restored");
        *self.session.write().await = Session::LoggedIn {
            user: user.clone(),
            access_token: token,
            refresh_token,
            logged_in_at,
        };
        Ok(Some(user))
    }

    /// Authenticate against the backend and persist the session.
    ///
    /// On success every session key is written in one atomic batch; on any
    /// failure neither the store nor the in-memory session is touched. A
    /// rejected login carries the server's `detail` message.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ApiError::EmptyCredentials.into());
        }

        let response = self.api.login(username, password).await?;
        let user = Self::build_user(&response)?;

        let user_json = serde_json::to_string(&user)?;
        let doctor_id = id_string(response.doctor_id);
        let patient_id = id_string(response.patient_id);
        let clinic_id = id_string(response.clinic_id);
        let logged_in_at = Utc::now();
        let logged_in_at_str = logged_in_at.to_rfc3339();

        self.store.set_many(&[
            (keys::USER_TOKEN, response.access.as_str()),
            (keys::REFRESH_TOKEN, response.refresh.as_str()),
            (keys::USER, user_json.as_str()),
            (keys::ROLE, response.user_type.as_str()),
            (keys::DOCTOR_ID, doctor_id.as_str()),
            (keys::PATIENT_ID, patient_id.as_str()),
            (keys::CLINIC_ID, clinic_id.as_str()),
            (keys::LOGGED_IN_AT, logged_in_at_str.as_str()),
        ])?;

        *self.session.write().await = Session::LoggedIn {
            user: user.clone(),
            access_token: response.access,
            refresh_token: response.refresh,
            logged_in_at,
        };

        info!(username = %user.username, role = %user.role, "login succeeded");
        Ok(user)
    }

    /// Wipe all local storage and reset the in-memory session.
    ///
    /// Purely local: the server is not notified, and requests already in
    /// flight are not cancelled.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().context("Failed to clear local storage")?;
        *self.session.write().await = Session::LoggedOut;
        info!("logged out, local storage cleared");
        Ok(())
    }

    // ========================================================================
    // Authenticated I/O
    // ========================================================================

    /// Issue a bearer-authenticated request, renewing the access token and
    /// retrying at most once on a 401.
    ///
    /// Fails with `ApiError::NoToken` before any network I/O when no access
    /// token is stored. Every non-401 response (2xx, other 4xx, 5xx) is
    /// returned to the caller unmodified. A failed renewal forces logout and
    /// surfaces `ApiError::RefreshFailed`.
    pub async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<reqwest::Response> {
        let mut token = self
            .store
            .get(keys::USER_TOKEN)?
            .ok_or(ApiError::NoToken)?;

        for attempt in 0..=MAX_AUTH_RETRIES {
            let response = self.api.send(path, &options, &token).await?;
            if response.status() != StatusCode::UNAUTHORIZED || attempt == MAX_AUTH_RETRIES {
                return Ok(response);
            }
            debug!(path, "access token rejected, attempting renewal");
            token = self.renew_access_token(&token).await?;
        }
        unreachable!("retry loop always returns before exhausting attempts")
    }

    /// Obtain a fresh access token after a 401.
    ///
    /// Renewals serialize behind `renew_gate`: whichever caller gets there
    /// first performs the refresh, and callers that were queued behind it
    /// find the replaced token in the store and skip their own refresh call.
    async fn renew_access_token(&self, stale_token: &str) -> Result<String> {
        let _gate = self.renew_gate.lock().await;

        if let Some(current) = self.store.get(keys::USER_TOKEN)? {
            if current != stale_token {
                debug!("access token already renewed by a concurrent caller");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.store.get(keys::REFRESH_TOKEN)? else {
            warn!("401 with no refresh token stored, logging out");
            self.logout().await?;
            return Err(ApiError::RefreshFailed.into());
        };

        match self.api.refresh(&refresh_token).await {
            Ok(access) => {
                // The refresh token is not rotated by this flow
                self.store.set(keys::USER_TOKEN, &access)?;
                if let Session::LoggedIn { access_token, .. } = &mut *self.session.write().await {
                    *access_token = access.clone();
                }
                debug!("access token renewed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, logging out");
                self.logout().await?;
                Err(ApiError::RefreshFailed.into())
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn build_user(response: &LoginResponse) -> Result<User> {
        let role: Role = response.user_type.parse().map_err(|_| {
            ApiError::InvalidResponse(format!("unknown user_type: {}", response.user_type))
        })?;

        Ok(User {
            id: response.user.id,
            username: response.user.username.clone(),
            email: response.user.email.clone(),
            first_name: response.user.first_name.clone(),
            last_name: response.user.last_name.clone(),
            role,
            is_superuser: response.user.is_superuser,
            doctor_id: response.doctor_id,
            patient_id: response.patient_id,
            clinic_id: response.clinic_id,
        })
    }

    fn clear_session_keys(&self) -> Result<()> {
        self.store.remove_many(&[
            keys::USER_TOKEN,
            keys::REFRESH_TOKEN,
            keys::USER,
            keys::ROLE,
            keys::DOCTOR_ID,
            keys::PATIENT_ID,
            keys::CLINIC_ID,
            keys::LOGGED_IN_AT,
        ])
    }
}

fn id_string(id: Option<i64>) -> String {
    id.map(|n| n.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_accessors() {
        let session = Session::LoggedOut;
        assert!(!session.is_logged_in());
        assert!(session.user().is_none());
        assert!(session.logged_in_at().is_none());
    }

    #[test]
    fn test_id_string_formats_optionals() {
        assert_eq!(id_string(Some(7)), "7");
        assert_eq!(id_string(None), "");
    }

    #[test]
    fn test_build_user_normalizes_role() {
        let response: LoginResponse = serde_json::from_str(
            r#"{
                "access": "A1",
                "refresh": "R1",
                "user_type": "clinic_admin",
                "user": {
                    "id": 3,
                    "username": "admin1",
                    "email": "a@x.com",
                    "first_name": "C",
                    "last_name": "D",
                    "is_superuser": false
                },
                "clinic_id": 12
            }"#,
        )
        .unwrap();

        let user = SessionManager::build_user(&response).unwrap();
        assert_eq!(user.role, Role::ClinicAdmin);
        assert_eq!(user.clinic_id, Some(12));
    }

    #[test]
    fn test_build_user_rejects_unknown_role() {
        let response: LoginResponse = serde_json::from_str(
            r#"{
                "access": "A1",
                "refresh": "R1",
                "user_type": "janitor",
                "user": {
                    "id": 3,
                    "username": "u",
                    "email": "u@x.com",
                    "first_name": "U",
                    "last_name": "V"
                }
            }"#,
        )
        .unwrap();

        let err = SessionManager::build_user(&response).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::InvalidResponse(_))
        ));
    }
}
