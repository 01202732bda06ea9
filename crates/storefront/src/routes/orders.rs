//! Order history and live tracking handlers (requires auth).

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use naxstore_core::{Order, OrderPublicId};

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, RequireUser};
use crate::state::AppState;

/// Order history, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Json<Vec<Order>> {
    let data = state.user_data().get(current.caller()).await;
    Json(data.orders.clone())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order: Order,
    /// Whether a live tracking simulation is running or finished for it.
    pub live: bool,
}

async fn cached_order(
    state: &AppState,
    current: &CurrentUser,
    id: OrderPublicId,
) -> Result<Order> {
    let data = state.user_data().get(current.caller()).await;
    data.orders
        .iter()
        .find(|o| o.id == id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))
}

/// Tracking view for one order, showing simulated progress if any.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn tracking(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<OrderPublicId>,
) -> Result<Json<TrackingView>> {
    if let Some(order) = state.tracking().get(current.user.id, id).await {
        return Ok(Json(TrackingView { order, live: true }));
    }
    let order = cached_order(&state, &current, id).await?;
    Ok(Json(TrackingView { order, live: false }))
}

/// Start live tracking for one order. Starting it again is a no-op.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn start_tracking(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<OrderPublicId>,
) -> Result<Json<TrackingView>> {
    if let Some(order) = state.tracking().get(current.user.id, id).await {
        return Ok(Json(TrackingView { order, live: true }));
    }
    let order = cached_order(&state, &current, id).await?;
    let order = state.tracking().start(current.caller(), order).await;
    Ok(Json(TrackingView { order, live: true }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::routes::test_support::{Client, app};

    #[tokio::test]
    async fn test_tracking_requires_sign_in() {
        let (router, _) = app(vec![]).await;
        let mut client = Client::new(router);

        let id = "1a2b3c4d-0000-4000-8000-000000000000";
        let (status, _) = client
            .send("POST", &format!("/api/orders/{id}/tracking"), None)
            .await;
        assert_eq!(status, 401);
        let (status, _) = client.send("GET", "/api/orders", None).await;
        assert_eq!(status, 401);
    }
}
