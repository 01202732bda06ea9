//! Fire-and-forget analytics events.

use serde::Serialize;
use serde_json::Value;

use naxstore_core::AnalyticsEventType;

use crate::backend::{BackendClient, BackendError, Bearer};
use crate::services::Caller;

#[derive(Serialize)]
struct LogEventArgs<'a> {
    p_event_type: AnalyticsEventType,
    p_metadata: &'a Value,
}

/// Record one event and wait for the result.
///
/// # Errors
///
/// Returns `BackendError` if the RPC fails.
pub async fn log_event(
    backend: &BackendClient,
    bearer: Bearer<'_>,
    event: AnalyticsEventType,
    metadata: &Value,
) -> Result<(), BackendError> {
    backend
        .rpc::<_, Value>(
            "log_event",
            &LogEventArgs {
                p_event_type: event,
                p_metadata: metadata,
            },
            bearer,
        )
        .await
        .map(drop)
}

/// Record an event in the background. Failures are logged and dropped.
pub fn track(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    event: AnalyticsEventType,
    metadata: Value,
) {
    let backend = backend.clone();
    let token = caller.map(|c| c.token.to_string());
    tokio::spawn(async move {
        let bearer = token.as_deref().map_or(Bearer::Anon, Bearer::User);
        if let Err(e) = log_event(&backend, bearer, event, &metadata).await {
            tracing::warn!(error = %e, event = %event, "Failed to log analytics event");
        }
    });
}
