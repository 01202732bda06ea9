//! Client for the hosted backend (REST tables, RPC, and auth).
//!
//! # Architecture
//!
//! - The backend is source of truth - catalog, orders, profiles, carts
//! - Row-level security decides what each request may see; every call is
//!   made either with the project's anon key or on behalf of a signed-in
//!   user with their access token ([`Bearer`])
//! - Multi-step operations (order creation, coupon validation) are RPCs
//!   whose internals are opaque here
//!
//! # Example
//!
//! ```rust,ignore
//! use naxstore_storefront::backend::{Bearer, BackendClient, Query};
//!
//! let client = BackendClient::new(&config.backend);
//! let rows: Vec<ProductRow> = client
//!     .select(&Query::table("products").select(PRODUCT_SELECT), Bearer::Anon)
//!     .await?;
//! ```

mod auth;
mod client;
pub mod conversions;
mod query;
pub mod rows;

pub use auth::{AuthClient, AuthSession, AuthUser, SignUpOutcome};
pub use client::BackendClient;
pub use query::Query;

use thiserror::Error;

/// Error code the REST layer uses when a single-row lookup matched nothing.
const NO_ROWS_CODE: &str = "PGRST116";

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Credentials a request is made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bearer<'a> {
    /// Project anon key; sees only what RLS exposes to anonymous visitors.
    Anon,
    /// A signed-in user's access token.
    User(&'a str),
}

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST or RPC layer returned an error body.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The auth service rejected the request.
    #[error("Auth error: {0}")]
    Auth(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

impl BackendError {
    /// Backend error code, if the response carried one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Message from the backend's error body, if it sent one.
    #[must_use]
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } | Self::Auth(message) => Some(message),
            _ => None,
        }
    }

    /// Whether a single-row lookup simply found no rows.
    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        self.code() == Some(NO_ROWS_CODE)
    }

    /// Whether the write collided with a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.code() == Some(UNIQUE_VIOLATION_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: Option<&str>) -> BackendError {
        BackendError::Api {
            status: 406,
            code: code.map(String::from),
            message: "JSON object requested, multiple (or no) rows returned".to_string(),
        }
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("product 12".to_string());
        assert_eq!(err.to_string(), "Not found: product 12");

        let err = BackendError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_no_rows_detection() {
        assert!(api(Some("PGRST116")).is_no_rows());
        assert!(!api(Some("42501")).is_no_rows());
        assert!(!api(None).is_no_rows());
        assert!(!BackendError::Auth("bad".to_string()).is_no_rows());
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(api(Some("23505")).is_unique_violation());
        assert!(!api(Some("PGRST116")).is_unique_violation());
    }
}
