//! End-to-end tests for the NaxStore storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # Start Postgres for sessions, then the storefront
//! cargo run -p naxstore-storefront
//!
//! # Run the ignored end-to-end tests
//! cargo test -p naxstore-integration-tests -- --ignored
//! ```
//!
//! `STOREFRONT_TEST_URL` overrides the default `http://localhost:3000`.
//! Signed-in tests also need `NAXSTORE_TEST_EMAIL` and
//! `NAXSTORE_TEST_PASSWORD` for an existing confirmed account; they skip
//! themselves when the variables are unset.

use reqwest::{Client, Response};
use serde_json::Value;

/// Storefront base URL, without a trailing slash.
#[must_use]
pub fn base_url() -> String {
    std::env::var("STOREFRONT_TEST_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Credentials for the signed-in tests, if configured.
#[must_use]
pub fn test_credentials() -> Option<(String, String)> {
    let email = std::env::var("NAXSTORE_TEST_EMAIL").ok()?;
    let password = std::env::var("NAXSTORE_TEST_PASSWORD").ok()?;
    Some((email, password))
}

/// A visitor: one cookie jar, one session.
pub struct Visitor {
    client: Client,
    base_url: String,
}

impl Visitor {
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .cookie_store(true)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// # Errors
    ///
    /// Returns the transport error if the request cannot be sent.
    pub async fn get(&self, path: &str) -> reqwest::Result<Response> {
        self.client.get(self.url(path)).send().await
    }

    /// # Errors
    ///
    /// Returns the transport error if the request cannot be sent.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> reqwest::Result<Response> {
        self.client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
    }

    /// # Errors
    ///
    /// Returns the transport error if the request cannot be sent.
    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Result<Response> {
        self.send(reqwest::Method::POST, path, body).await
    }

    /// Sign in, returning the response body.
    ///
    /// # Errors
    ///
    /// Returns the transport or decode error.
    pub async fn login(&self, email: &str, password: &str) -> reqwest::Result<Value> {
        self.post(
            "/api/auth/login",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await?
        .json()
        .await
    }
}

impl Default for Visitor {
    fn default() -> Self {
        Self::new()
    }
}
