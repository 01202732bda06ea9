//! Auth service client: password sign-in, sign-up, token refresh, sign-out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Response, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::UserId;

use super::BackendError;
use crate::config::BackendConfig;

/// Fallback lifetime when the auth service omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Identity returned by the auth service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata captured at sign-up (e.g. `full_name`).
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    /// `full_name` from sign-up metadata, if present and non-blank.
    #[must_use]
    pub fn metadata_full_name(&self) -> Option<&str> {
        self.user_metadata
            .get("full_name")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `avatar_url` from sign-up metadata.
    #[must_use]
    pub fn metadata_avatar_url(&self) -> Option<&str> {
        self.user_metadata
            .get("avatar_url")
            .and_then(serde_json::Value::as_str)
    }
}

/// A signed-in session.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// When the access token expires, relative to `issued` if the service
    /// did not send an absolute timestamp.
    #[must_use]
    pub fn expires_at(&self, issued: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| {
                issued + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
            })
    }
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Accounts are auto-confirmed; the user is signed in.
    SignedIn(AuthSession),
    /// A confirmation email was sent; no session yet.
    ConfirmationPending(AuthUser),
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
}

/// Error body shapes used by the auth service.
#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the backend auth service.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    auth_url: String,
    anon_key: String,
}

impl AuthClient {
    /// Create a new auth client.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        let base = config.url.as_str().trim_end_matches('/');
        Self {
            inner: Arc::new(AuthClientInner {
                client: reqwest::Client::new(),
                auth_url: format!("{base}/auth/v1"),
                anon_key: config.anon_key.expose_secret().to_string(),
            }),
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Auth` with the service's message on bad credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let response = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        parse_json(response).await
    }

    /// Create an account, storing `full_name` in the user metadata.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Auth` if the service rejects the sign-up.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome, BackendError> {
        let response = self
            .post("signup")
            .json(&SignUpRequest {
                email,
                password,
                data: SignUpMetadata { full_name },
            })
            .send()
            .await?;
        let body: serde_json::Value = parse_json(response).await?;

        if body.get("access_token").is_some() {
            Ok(SignUpOutcome::SignedIn(serde_json::from_value(body)?))
        } else if let Some(user) = body.get("user") {
            Ok(SignUpOutcome::ConfirmationPending(serde_json::from_value(
                user.clone(),
            )?))
        } else {
            Ok(SignUpOutcome::ConfirmationPending(serde_json::from_value(
                body,
            )?))
        }
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Auth` if the refresh token is expired or revoked.
    #[instrument(skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let response = self
            .post("token")
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant { refresh_token })
            .send()
            .await?;
        parse_json(response).await
    }

    /// Revoke the session belonging to `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip_all)]
    pub async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .post("logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        check_status(response).await.map(drop)
    }

    /// Look up the user owning `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Auth` if the token is invalid.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .inner
            .client
            .get(format!("{}/user", self.inner.auth_url))
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        parse_json(response).await
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .client
            .post(format!("{}/{path}", self.inner.auth_url))
            .header("apikey", &self.inner.anon_key)
    }
}

async fn check_status(response: Response) -> Result<String, BackendError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(BackendError::RateLimited(retry_after));
    }

    let text = response.text().await?;

    if !status.is_success() {
        let message = auth_error_message(&text).unwrap_or_else(|| status.to_string());
        tracing::warn!(status = %status, message = %message, "Auth service rejected request");
        return Err(BackendError::Auth(message));
    }

    Ok(text)
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let text = check_status(response).await?;
    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse auth response"
        );
        BackendError::Parse(e)
    })
}

fn auth_error_message(body: &str) -> Option<String> {
    let parsed: AuthErrorBody = serde_json::from_str(body).ok()?;
    parsed.error_description.or(parsed.msg).or(parsed.message)
}
