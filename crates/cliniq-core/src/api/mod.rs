//! Remote API plumbing: endpoint client, request options, error taxonomy.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginResponse, LoginUser, RequestOptions};
pub use error::ApiError;
