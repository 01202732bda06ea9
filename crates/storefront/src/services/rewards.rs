//! Coupons and reward points.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::Coupon;

use crate::backend::{BackendClient, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::{Caller, bearer_for};

const INVALID_COUPON: &str = "Invalid or expired coupon code.";
const COUPON_CHECK_FAILED: &str = "Could not validate coupon. Please try again.";

#[derive(Serialize)]
struct ValidateCouponArgs<'a> {
    p_code: &'a str,
}

#[derive(Deserialize)]
struct PointsRow {
    points_balance: i64,
}

#[derive(Serialize)]
struct PointsUpdate {
    points_balance: i64,
}

/// Validate `code` with the backend.
///
/// The caller stores the returned coupon in the session.
///
/// # Errors
///
/// Returns `AppError::BadRequest` for a blank, unknown, or expired code and
/// `AppError::Backend` if validation could not be performed.
#[instrument(skip(backend, caller))]
pub async fn apply_coupon(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    code: &str,
) -> Result<Coupon> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::BadRequest(INVALID_COUPON.to_string()));
    }

    let coupon: Option<Coupon> = backend
        .rpc(
            "validate_coupon",
            &ValidateCouponArgs { p_code: code },
            bearer_for(caller.as_ref()),
        )
        .await
        .or_message(COUPON_CHECK_FAILED)?;

    coupon.ok_or_else(|| AppError::BadRequest(INVALID_COUPON.to_string()))
}

#[must_use]
pub fn applied_message(coupon: &Coupon) -> String {
    format!("Coupon \"{}\" applied!", coupon.code)
}

pub const REMOVED_MESSAGE: &str = "Coupon removed.";

/// Add `points` to the caller's balance. Returns the new balance.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the user has no reward points row and
/// `AppError::Backend` if the read or write fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn add_points(backend: &BackendClient, caller: Caller<'_>, points: i64) -> Result<i64> {
    let query = Query::table("reward_points").eq("user_id", caller.user_id);
    let row: Option<PointsRow> = backend
        .select_one(&query.clone().select("points_balance"), caller.bearer())
        .await
        .or_message("Failed to update points.")?;
    let Some(row) = row else {
        return Err(AppError::NotFound("reward points".to_string()));
    };

    let balance = row.points_balance.saturating_add(points);
    backend
        .update(
            &query,
            &PointsUpdate {
                points_balance: balance,
            },
            caller.bearer(),
        )
        .await
        .or_message("Failed to update points.")?;

    tracing::info!(points, balance, "Reward points added");
    Ok(balance)
}

#[must_use]
pub fn points_message(points: i64) -> String {
    format!("{points} points earned!")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{FakeBackend, offline_backend, user};
    use naxstore_core::{DiscountType, UserRole};
    use rust_decimal::Decimal;
    use serde_json::json;

    #[tokio::test]
    async fn test_blank_code_rejected_without_request() {
        let err = apply_coupon(&offline_backend(), None, "   ").await.unwrap_err();
        assert_eq!(err.client_message(), INVALID_COUPON);
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_validation_failure() {
        let err = apply_coupon(&offline_backend(), None, "SAVE10")
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), COUPON_CHECK_FAILED);
    }

    #[tokio::test]
    async fn test_valid_code_returns_coupon() {
        let (fake, backend) = FakeBackend::start().await;
        fake.on_rpc(
            "validate_coupon",
            json!({ "code": "SAVE10", "type": "percentage", "value": 10 }),
        );

        let coupon = apply_coupon(&backend, None, " SAVE10 ").await.unwrap();
        assert_eq!(coupon.code, "SAVE10");
        assert_eq!(coupon.discount_type, DiscountType::Percentage);
        assert_eq!(coupon.value, Decimal::from(10));
        assert_eq!(fake.rpc_args("validate_coupon")[0]["p_code"], "SAVE10");
    }

    #[tokio::test]
    async fn test_unknown_code_is_invalid() {
        let (fake, backend) = FakeBackend::start().await;
        fake.on_rpc("validate_coupon", serde_json::Value::Null);

        let err = apply_coupon(&backend, None, "NOPE").await.unwrap_err();
        assert_eq!(err.client_message(), INVALID_COUPON);
    }

    #[tokio::test]
    async fn test_add_points_updates_balance() {
        let (fake, backend) = FakeBackend::start().await;
        let user = user(UserRole::User);
        let caller = Caller::new(user.id, "token");

        let err = add_points(&backend, caller, 5).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        fake.seed(
            "reward_points",
            vec![json!({ "user_id": user.id, "points_balance": 10 })],
        );
        assert_eq!(add_points(&backend, caller, 5).await.unwrap(), 15);
        assert_eq!(fake.rows("reward_points")[0]["points_balance"], 15);
    }

    #[test]
    fn test_messages() {
        let coupon = Coupon {
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percentage,
            value: Decimal::from(10),
        };
        assert_eq!(applied_message(&coupon), "Coupon \"SAVE10\" applied!");
        assert_eq!(points_message(129), "129 points earned!");
    }
}
