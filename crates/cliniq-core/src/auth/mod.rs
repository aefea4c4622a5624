//! Authentication: session lifecycle and remembered credentials.
//!
//! This module provides:
//! - `SessionManager`: login, logout, startup restoration, and the
//!   renew-and-retry wrapper for authenticated requests
//! - `CredentialStore`: opt-in OS-keychain storage of login credentials

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionManager};
