//! cliniq-core - client-side session and API core for the Cliniq clinic
//! management platform.
//!
//! The library centers on [`auth::SessionManager`], which owns the
//! authentication lifecycle (login, logout, restoration at startup) and the
//! renew-and-retry wrapper every authenticated request goes through. It is
//! backed by a pluggable [`store::KeyValueStore`] and the thin
//! [`api::ApiClient`] over the platform's auth endpoints.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;

pub use api::{ApiClient, ApiError, RequestOptions};
pub use auth::{CredentialStore, Session, SessionManager};
pub use config::Config;
pub use models::{Role, User};
pub use store::{FileStore, KeyValueStore, MemoryStore};
