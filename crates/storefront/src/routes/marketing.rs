//! Banner, newsletter, and analytics handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::{AnalyticsEventType, Banner};

use crate::error::{BackendResultExt, Result};
use crate::middleware::OptionalUser;
use crate::services::{analytics, newsletter};
use crate::state::AppState;

use super::{MessageBody, caller_of, message};

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub banner: Option<Banner>,
}

/// The active promotional banner, if any.
pub async fn banner(State(state): State<AppState>) -> Result<Json<BannerResponse>> {
    let banner = state
        .banners()
        .active()
        .await
        .or_message("Failed to load banner.")?;
    Ok(Json(BannerResponse { banner }))
}

#[derive(Debug, Deserialize)]
pub struct NewsletterForm {
    pub email: String,
}

/// Subscribe an address to the newsletter.
#[instrument(skip_all)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(form): Json<NewsletterForm>,
) -> Result<Json<MessageBody>> {
    let msg = newsletter::subscribe(state.backend(), &form.email).await?;
    Ok(message(msg))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventForm {
    pub event_type: AnalyticsEventType,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Record a client-side analytics event. Always accepted; delivery is
/// best-effort.
pub async fn track_event(
    State(state): State<AppState>,
    OptionalUser(current): OptionalUser,
    Json(form): Json<EventForm>,
) -> StatusCode {
    let metadata = if form.metadata.is_null() {
        serde_json::json!({})
    } else {
        form.metadata
    };
    analytics::track(
        state.backend(),
        caller_of(current.as_ref()),
        form.event_type,
        metadata,
    );
    StatusCode::ACCEPTED
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use crate::routes::test_support::{Client, app};

    #[tokio::test]
    async fn test_events_are_accepted() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, _) = client
            .send(
                "POST",
                "/api/events",
                Some(json!({ "eventType": "page_view", "metadata": { "view": "home" } })),
            )
            .await;
        assert_eq!(status, 202);

        let (status, _) = client
            .send("POST", "/api/events", Some(json!({ "eventType": "scroll" })))
            .await;
        assert_eq!(status, 422);
    }

    #[tokio::test]
    async fn test_newsletter_rejects_bad_email() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let (status, body) = client
            .send("POST", "/api/newsletter", Some(json!({ "email": "nope" })))
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Invalid email address");
    }
}
