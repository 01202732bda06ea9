//! Session and authentication route handlers.
//!
//! Sign-in and sign-up go through the backend auth service; the resulting
//! tokens never leave the session. Every handler answers with the current
//! user (or `null`) so the client can re-render.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use naxstore_core::{Email, User};

use crate::backend::SignUpOutcome;
use crate::error::{AppError, BackendResultExt, Result, add_breadcrumb};
use crate::middleware::OptionalUser;
use crate::models::AuthTokens;
use crate::services::session_watcher::{self, AuthEvent, Transition};
use crate::state::AppState;

/// Minimum password length accepted at sign-up.
const MIN_PASSWORD_LEN: usize = 6;

const CONFIRMATION_MESSAGE: &str =
    "Sign up successful! Please check your email to confirm your account.";

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Transition> for SessionResponse {
    fn from(transition: Transition) -> Self {
        Self {
            user: transition.user,
            message: transition.message,
        }
    }
}

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Sign-up form data.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Restore whoever the session says is signed in.
#[instrument(skip(state, session))]
pub async fn session(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<SessionResponse>> {
    let transition = session_watcher::restore(&state, &session).await?;
    Ok(Json(transition.into()))
}

/// Sign in with email and password.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<Json<SessionResponse>> {
    let email = Email::parse_normalized(&form.email)?;
    if form.password.is_empty() {
        return Err(AppError::BadRequest("Password is required.".to_string()));
    }

    let auth_session = state
        .auth()
        .sign_in_with_password(email.as_str(), &form.password)
        .await
        .or_message("Login failed.")?;

    // Rotate the session id on privilege change
    session.cycle_id().await?;

    let tokens = AuthTokens::from_session(&auth_session, Utc::now());
    let transition = session_watcher::signed_in(
        &state,
        &session,
        AuthEvent::SignedIn,
        tokens,
        &auth_session.user,
    )
    .await?;

    add_breadcrumb("auth", "Signed in", None);
    tracing::info!(user_id = %auth_session.user.id, "User signed in");
    Ok(Json(transition.into()))
}

/// Create an account.
///
/// When the backend requires email confirmation no one is signed in yet and
/// the response says so.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<SignUpForm>,
) -> Result<Json<SessionResponse>> {
    let email = Email::parse_normalized(&form.email)?;
    let full_name = form.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::BadRequest("Full name is required.".to_string()));
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    let outcome = state
        .auth()
        .sign_up(email.as_str(), &form.password, full_name)
        .await
        .or_message("Sign up failed.")?;

    match outcome {
        SignUpOutcome::SignedIn(auth_session) => {
            session.cycle_id().await?;
            let tokens = AuthTokens::from_session(&auth_session, Utc::now());
            let transition = session_watcher::signed_in(
                &state,
                &session,
                AuthEvent::SignedIn,
                tokens,
                &auth_session.user,
            )
            .await?;
            tracing::info!(user_id = %auth_session.user.id, "User signed up");
            Ok(Json(transition.into()))
        }
        SignUpOutcome::ConfirmationPending(identity) => {
            tracing::info!(user_id = %identity.id, "Sign-up awaiting email confirmation");
            Ok(Json(SessionResponse {
                user: None,
                message: Some(CONFIRMATION_MESSAGE.to_string()),
            }))
        }
    }
}

/// Sign out.
///
/// The backend token is revoked best-effort; the session is cleared
/// regardless.
#[instrument(skip(state, session, current))]
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(current): OptionalUser,
) -> Result<Json<SessionResponse>> {
    let user_id = current.as_ref().map(|c| c.user.id);
    if let Some(current) = &current
        && let Err(e) = state.auth().sign_out(&current.tokens.access_token).await
    {
        tracing::warn!(error = %e, "Backend sign-out failed; clearing session anyway");
    }

    let transition = session_watcher::signed_out(&state, &session, user_id, true).await?;
    Ok(Json(transition.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::routes::test_support::{Client, app};

    #[tokio::test]
    async fn test_guest_session_is_empty() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, body) = client.send("GET", "/api/session", None).await;
        assert_eq!(status, 200);
        assert!(body["user"].is_null());
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_guest_logout_says_logged_out() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, body) = client.send("POST", "/api/auth/logout", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Logged out.");
    }

    #[tokio::test]
    async fn test_signup_validates_before_calling_backend() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, body) = client
            .send(
                "POST",
                "/api/auth/signup",
                Some(serde_json::json!({
                    "fullName": "Ana",
                    "email": "ana@naxstore.test",
                    "password": "123"
                })),
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Password must be at least 6 characters.");
    }

    #[test]
    fn test_session_response_omits_empty_message() {
        let body = serde_json::to_value(SessionResponse {
            user: None,
            message: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "user": null }));
    }
}
