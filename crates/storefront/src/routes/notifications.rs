//! Notification route handlers (requires auth).

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use naxstore_core::{Notification, NotificationId};

use crate::error::{BackendResultExt, Result};
use crate::middleware::RequireUser;
use crate::services::notifications;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsView {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl NotificationsView {
    fn new(notifications: Vec<Notification>) -> Self {
        Self {
            unread_count: notifications.iter().filter(|n| !n.is_read).count(),
            notifications,
        }
    }
}

/// The user's notifications, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Json<NotificationsView> {
    let data = state.user_data().get(current.caller()).await;
    Json(NotificationsView::new(data.notifications.clone()))
}

/// Mark one notification as read.
#[instrument(skip(state, current), fields(user_id = %current.user.id))]
pub async fn read(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
    Path(id): Path<NotificationId>,
) -> Result<Json<NotificationsView>> {
    notifications::mark_as_read(state.backend(), current.caller(), id)
        .await
        .or_message("Failed to update notification.")?;

    let mut list = state.user_data().get(current.caller()).await.notifications.clone();
    notifications::mark_read_locally(&mut list, &[id]);
    let cached = list.clone();
    state
        .user_data()
        .update(current.user.id, move |data| data.notifications = cached)
        .await;
    Ok(Json(NotificationsView::new(list)))
}

/// Mark every unread notification as read.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn read_all(
    State(state): State<AppState>,
    RequireUser(current): RequireUser,
) -> Result<Json<NotificationsView>> {
    let mut list = state.user_data().get(current.caller()).await.notifications.clone();
    let ids = notifications::mark_all_as_read(state.backend(), current.caller(), &list)
        .await
        .or_message("Failed to update notifications.")?;

    notifications::mark_read_locally(&mut list, &ids);
    let cached = list.clone();
    state
        .user_data()
        .update(current.user.id, move |data| data.notifications = cached)
        .await;
    Ok(Json(NotificationsView::new(list)))
}
