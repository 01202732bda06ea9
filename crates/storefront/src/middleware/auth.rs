//! Authentication extractors.
//!
//! The signed-in user and their tokens live in the session. Extracting a
//! user refreshes an access token that is about to expire; a token that
//! cannot be refreshed signs the visitor out.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tower_sessions::Session;

use naxstore_core::User;

use crate::models::{AuthTokens, session_keys};
use crate::services::Caller;
use crate::services::session_watcher;
use crate::state::AppState;

/// The signed-in user with valid tokens.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub tokens: AuthTokens,
}

impl CurrentUser {
    #[must_use]
    pub fn caller(&self) -> Caller<'_> {
        Caller::new(self.user.id, &self.tokens.access_token)
    }
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(RequireUser(current): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", current.user.name)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

/// Extractor for routes that behave differently for guests.
pub struct OptionalUser(pub Option<CurrentUser>);

/// Rejection for [`RequireUser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No one is signed in.
    Unauthorized,
    /// The stored session could not be refreshed and was cleared.
    SessionExpired,
    /// The session layer is missing or its store failed.
    SessionUnavailable,
}

impl AuthRejection {
    const fn message(self) -> &'static str {
        match self {
            Self::Unauthorized => "Please sign in to continue.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::SessionUnavailable => "Internal server error",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized | Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::SessionUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.message() }))).into_response()
    }
}

/// Load the signed-in user, refreshing tokens near expiry.
async fn current_user(
    state: &AppState,
    session: &Session,
) -> Result<Option<CurrentUser>, AuthRejection> {
    let stored = async {
        let user = session.get::<User>(session_keys::CURRENT_USER).await?;
        let tokens = session.get::<AuthTokens>(session_keys::AUTH).await?;
        Ok::<_, tower_sessions::session::Error>(user.zip(tokens))
    };
    let Some((user, mut tokens)) = stored.await.map_err(|e| {
        tracing::error!(error = %e, "Failed to read auth session");
        AuthRejection::SessionUnavailable
    })?
    else {
        return Ok(None);
    };

    let threshold = chrono::Duration::from_std(state.config().timers.token_refresh_threshold)
        .unwrap_or_else(|_| chrono::Duration::minutes(5));
    let now = Utc::now();
    if tokens.needs_refresh(now, threshold) {
        match state.auth().refresh_session(&tokens.refresh_token).await {
            Ok(fresh) => {
                tokens = AuthTokens::from_session(&fresh, now);
                session_watcher::token_refreshed(session, &tokens)
                    .await
                    .map_err(|_| AuthRejection::SessionUnavailable)?;
                tracing::debug!(user_id = %user.id, "Access token refreshed");
            }
            Err(e) => {
                tracing::info!(error = %e, user_id = %user.id, "Token refresh failed; signing out");
                session_watcher::signed_out(state, session, Some(user.id), false)
                    .await
                    .map_err(|_| AuthRejection::SessionUnavailable)?;
                return Err(AuthRejection::SessionExpired);
            }
        }
    }

    tracing::Span::current().record("user_id", tracing::field::display(user.id));
    Ok(Some(CurrentUser { user, tokens }))
}

fn session_of(parts: &Parts) -> Result<Session, AuthRejection> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or(AuthRejection::SessionUnavailable)
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = session_of(parts)?;
        current_user(state, &session)
            .await?
            .map(Self)
            .ok_or(AuthRejection::Unauthorized)
    }
}

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = session_of(parts)?;
        match current_user(state, &session).await {
            Ok(current) => Ok(Self(current)),
            Err(AuthRejection::SessionExpired) => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status() {
        assert_eq!(
            AuthRejection::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::SessionExpired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::SessionUnavailable.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
