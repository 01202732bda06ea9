//! Newsletter sign-up.

use serde::Serialize;
use tracing::instrument;

use naxstore_core::Email;

use crate::backend::{BackendClient, Bearer};
use crate::error::{BackendResultExt, Result};

pub const SUBSCRIBED_MESSAGE: &str = "Thanks for subscribing!";

#[derive(Serialize)]
struct SubscribeArgs<'a> {
    p_email: &'a str,
}

/// Subscribe `email`. An address that is already subscribed counts as success.
///
/// # Errors
///
/// Returns `AppError::Email` for an invalid address and `AppError::Backend`
/// if the RPC fails for any other reason.
#[instrument(skip_all)]
pub async fn subscribe(backend: &BackendClient, email: &str) -> Result<&'static str> {
    let email = Email::parse_normalized(email)?;

    match backend
        .rpc::<_, serde_json::Value>(
            "subscribe_to_newsletter",
            &SubscribeArgs {
                p_email: email.as_str(),
            },
            Bearer::Anon,
        )
        .await
    {
        Ok(_) => Ok(SUBSCRIBED_MESSAGE),
        Err(e) if e.is_unique_violation() => {
            tracing::debug!("Address already subscribed");
            Ok(SUBSCRIBED_MESSAGE)
        }
        Err(e) => Err(e).or_message("Subscription failed. Please try again."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::fixtures::offline_backend;

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let err = subscribe(&offline_backend(), "not-an-email").await.unwrap_err();
        assert!(matches!(err, AppError::Email(_)));
    }
}
