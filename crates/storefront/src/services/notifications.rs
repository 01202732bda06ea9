//! In-app notifications.

use tracing::instrument;

use naxstore_core::{Notification, NotificationId, NotificationType};

use crate::backend::conversions::notification_from_row;
use crate::backend::rows::{NewNotification, NotificationRow};
use crate::backend::{BackendClient, BackendError, Query};
use crate::services::Caller;

#[derive(serde::Serialize)]
struct ReadFlag {
    is_read: bool,
}

/// The user's notifications, newest first.
///
/// # Errors
///
/// Returns `BackendError` if the lookup fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn fetch(
    backend: &BackendClient,
    caller: Caller<'_>,
) -> Result<Vec<Notification>, BackendError> {
    let rows: Vec<NotificationRow> = backend
        .select(
            &Query::table("notifications")
                .select("*")
                .eq("user_id", caller.user_id)
                .order("created_at", false),
            caller.bearer(),
        )
        .await?;
    Ok(rows.into_iter().map(notification_from_row).collect())
}

/// Store a notification for the caller. Guests get nothing.
///
/// # Errors
///
/// Returns `BackendError` if the insert fails.
#[instrument(skip(backend, caller, metadata))]
pub async fn add(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    message: &str,
    kind: NotificationType,
    metadata: Option<&serde_json::Value>,
) -> Result<Option<Notification>, BackendError> {
    let Some(caller) = caller else {
        return Ok(None);
    };

    let rows: Vec<NotificationRow> = backend
        .insert_returning(
            &Query::table("notifications").select("*"),
            &NewNotification {
                user_id: caller.user_id,
                message,
                kind,
                metadata,
            },
            caller.bearer(),
        )
        .await?;
    Ok(rows.into_iter().next().map(notification_from_row))
}

/// Mark one notification read.
///
/// # Errors
///
/// Returns `BackendError` if the update fails.
pub async fn mark_as_read(
    backend: &BackendClient,
    caller: Caller<'_>,
    id: NotificationId,
) -> Result<(), BackendError> {
    backend
        .update(
            &Query::table("notifications").eq("id", id),
            &ReadFlag { is_read: true },
            caller.bearer(),
        )
        .await
}

/// Mark every currently unread notification read.
///
/// Returns the ids that were updated. Nothing unread means no request.
///
/// # Errors
///
/// Returns `BackendError` if the update fails.
pub async fn mark_all_as_read(
    backend: &BackendClient,
    caller: Caller<'_>,
    notifications: &[Notification],
) -> Result<Vec<NotificationId>, BackendError> {
    let unread = unread_ids(notifications);
    if unread.is_empty() {
        return Ok(unread);
    }
    backend
        .update(
            &Query::table("notifications").is_in("id", &unread),
            &ReadFlag { is_read: true },
            caller.bearer(),
        )
        .await?;
    Ok(unread)
}

#[must_use]
pub fn unread_ids(notifications: &[Notification]) -> Vec<NotificationId> {
    notifications
        .iter()
        .filter(|n| !n.is_read)
        .map(|n| n.id)
        .collect()
}

/// Apply a read flag locally after the backend accepted it.
pub fn mark_read_locally(notifications: &mut [Notification], ids: &[NotificationId]) {
    for n in notifications.iter_mut().filter(|n| ids.contains(&n.id)) {
        n.is_read = true;
    }
}
