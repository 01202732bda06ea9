//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use naxstore_core::EmailError;

use crate::backend::BackendError;
use crate::services::checkout::CheckoutError;
use crate::services::shopper::ShopperError;

/// Client-facing message for backend failures without a more specific one.
const BACKEND_FAILURE_MESSAGE: &str = "External service error";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend operation failed; `message` is safe to show the visitor.
    #[error("{message}: {source}")]
    Backend {
        message: String,
        #[source]
        source: BackendError,
    },

    /// Personal shopper model call failed.
    #[error("Shopper error: {0}")]
    Shopper(#[from] ShopperError),

    /// Checkout precondition or validation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Invalid email address.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// Session store read or write failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// A required dependency is not configured or reachable.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for AppError {
    fn from(source: BackendError) -> Self {
        Self::Backend {
            message: BACKEND_FAILURE_MESSAGE.to_string(),
            source,
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Backend { source, .. } => match source {
                BackendError::Auth(_) => StatusCode::UNAUTHORIZED,
                BackendError::NotFound(_) => StatusCode::NOT_FOUND,
                BackendError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Shopper(ShopperError::NotConfigured) | Self::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Shopper(_) => StatusCode::BAD_GATEWAY,
            Self::Checkout(_) | Self::Email(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal details are never exposed.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Backend { message, source } => match source {
                BackendError::Auth(msg) => msg.clone(),
                _ => message.clone(),
            },
            Self::Shopper(_) => ShopperError::CLIENT_MESSAGE.to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Email(_) => "Invalid email address".to_string(),
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Unavailable(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
        }
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Backend { source, .. } => !matches!(
                source,
                BackendError::Auth(_) | BackendError::NotFound(_) | BackendError::RateLimited(_)
            ),
            Self::Shopper(_) | Self::Session(_) | Self::Internal(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = Json(serde_json::json!({ "error": self.client_message() }));
        (self.status(), body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Attach a client-facing message to a failed backend call.
pub trait BackendResultExt<T> {
    /// # Errors
    ///
    /// Returns `AppError::Backend` carrying `message` if `self` is an error.
    fn or_message(self, message: &str) -> Result<T>;
}

impl<T> BackendResultExt<T> for std::result::Result<T, BackendError> {
    fn or_message(self, message: &str) -> Result<T> {
        self.map_err(|source| AppError::Backend {
            message: message.to_string(),
            source,
        })
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api_error() -> BackendError {
        BackendError::Api {
            status: 500,
            code: None,
            message: "relation does not exist".to_string(),
        }
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Unavailable("test".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(get_status(api_error().into()), StatusCode::BAD_GATEWAY);
        assert_eq!(
            get_status(BackendError::Auth("Invalid login credentials".to_string()).into()),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_backend_message_hides_details() {
        let err: AppError = api_error().into();
        assert_eq!(err.client_message(), "External service error");

        let err = Err::<(), _>(api_error())
            .or_message("Failed to add item.")
            .unwrap_err();
        assert_eq!(err.client_message(), "Failed to add item.");
        assert!(err.to_string().contains("relation does not exist"));
    }

    #[test]
    fn test_auth_message_is_passed_through() {
        let err: AppError = BackendError::Auth("Invalid login credentials".to_string()).into();
        assert_eq!(err.client_message(), "Invalid login credentials");
    }

    #[test]
    fn test_internal_message_hidden() {
        let err = AppError::Internal("db password is hunter2".to_string());
        assert_eq!(err.client_message(), "Internal server error");
    }
}
