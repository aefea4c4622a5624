//! Domain types shared across the library.
//!
//! These are the shapes the rest of the app (screens, CLI) consumes;
//! wire-level response types live next to the API client.

pub mod user;

pub use user::{Role, User};
