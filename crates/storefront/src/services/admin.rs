//! Admin panel: users, sellers, products, and orders.
//!
//! Every operation requires the admin role; row-level security enforces the
//! same on the backend.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use naxstore_core::{
    CategoryId, OrderId, OrderStatus, OrderSummary, Product, ProductId, RewardTier, User, UserId,
    UserRole,
};

use crate::backend::conversions::{
    DEFAULT_COMMISSION_RATE, order_summary_from_row, placeholder_image,
};
use crate::backend::rows::{
    IdRow, OrderItemTitleRow, OrderRow, ProfileRefRow, ProfileRow, SellerRow,
};
use crate::backend::{BackendClient, BackendError, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::Caller;
use crate::services::catalog::{CatalogService, DEFAULT_CATEGORY, url_seed};

const USER_SELECT: &str = "*, sellers(*), reward_points(*)";

fn require_admin(user: &User) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Admin access required.".to_string()))
    }
}

/// Backend failure whose message embeds the backend's own explanation.
fn detailed(prefix: &str) -> impl FnOnce(BackendError) -> AppError + '_ {
    move |source| AppError::Backend {
        message: format!(
            "{prefix}{}",
            source.api_message().unwrap_or("Unknown error")
        ),
        source,
    }
}

// =============================================================================
// Users
// =============================================================================

/// A profile as listed in the admin users table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: UserId,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub updated_at: Option<DateTime<Utc>>,
    pub tier: RewardTier,
    pub points_balance: i64,
    pub seller: Option<SellerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerInfo {
    pub business_name: Option<String>,
    pub is_verified: bool,
    pub commission_rate: Decimal,
}

impl From<SellerRow> for SellerInfo {
    fn from(row: SellerRow) -> Self {
        Self {
            business_name: row.business_name,
            is_verified: row.is_verified.unwrap_or(false),
            commission_rate: row.commission_rate.unwrap_or(DEFAULT_COMMISSION_RATE),
        }
    }
}

impl From<ProfileRow> for AdminUser {
    fn from(row: ProfileRow) -> Self {
        let rewards = row.reward_points.into_iter().next();
        Self {
            id: row.id,
            full_name: row.full_name,
            role: row.role,
            updated_at: row.updated_at,
            tier: rewards.as_ref().and_then(|r| r.tier).unwrap_or_default(),
            points_balance: rewards.map_or(0, |r| r.points_balance),
            seller: row.sellers.map(SellerInfo::from),
        }
    }
}

/// Column the users table is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSortKey {
    FullName,
    Role,
    #[default]
    UpdatedAt,
    Tier,
    PointsBalance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Sort order for [`users`]. Defaults to most recently active first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct UserSort {
    #[serde(default)]
    pub key: UserSortKey,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Compare optional values; `None` sorts last in either direction.
fn cmp_present<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::Ascending => a.cmp(&b),
            SortDirection::Descending => b.cmp(&a),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort users in place. The sort is stable.
pub fn sort_users(users: &mut [AdminUser], sort: UserSort) {
    let dir = sort.direction;
    users.sort_by(|a, b| match sort.key {
        UserSortKey::FullName => cmp_present(
            a.full_name.as_deref().map(str::to_lowercase),
            b.full_name.as_deref().map(str::to_lowercase),
            dir,
        ),
        UserSortKey::Role => cmp_present(Some(a.role.as_str()), Some(b.role.as_str()), dir),
        UserSortKey::UpdatedAt => cmp_present(a.updated_at, b.updated_at, dir),
        UserSortKey::Tier => cmp_present(Some(a.tier), Some(b.tier), dir),
        UserSortKey::PointsBalance => {
            cmp_present(Some(a.points_balance), Some(b.points_balance), dir)
        }
    });
}

/// All profiles with their seller and reward rows, sorted.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the lookup fails.
#[instrument(skip(backend, caller, admin), fields(admin_id = %admin.id))]
pub async fn users(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
    sort: UserSort,
) -> Result<Vec<AdminUser>> {
    require_admin(admin)?;
    let rows: Vec<ProfileRow> = backend
        .select(&Query::table("profiles").select(USER_SELECT), caller.bearer())
        .await
        .or_message("Failed to load users.")?;

    let mut users: Vec<AdminUser> = rows.into_iter().map(AdminUser::from).collect();
    sort_users(&mut users, sort);
    Ok(users)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Serialize)]
struct ProfileUpdate<'a> {
    full_name: &'a str,
    role: UserRole,
}

/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the update fails.
#[instrument(skip(backend, caller, admin, update), fields(admin_id = %admin.id))]
pub async fn update_user(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
    user_id: UserId,
    update: &UserUpdate,
) -> Result<&'static str> {
    require_admin(admin)?;
    backend
        .update(
            &Query::table("profiles").eq("id", user_id),
            &ProfileUpdate {
                full_name: update.full_name.trim(),
                role: update.role,
            },
            caller.bearer(),
        )
        .await
        .map_err(detailed("Error: "))?;

    tracing::info!(user_id = %user_id, role = %update.role, "User updated");
    Ok("User updated successfully!")
}

#[derive(Serialize)]
struct VerifySellerArgs {
    seller_id_to_verify: UserId,
}

/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the RPC fails.
#[instrument(skip(backend, caller, admin), fields(admin_id = %admin.id))]
pub async fn verify_seller(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
    seller_id: UserId,
) -> Result<&'static str> {
    require_admin(admin)?;
    backend
        .rpc::<_, serde_json::Value>(
            "verify_seller",
            &VerifySellerArgs {
                seller_id_to_verify: seller_id,
            },
            caller.bearer(),
        )
        .await
        .map_err(detailed("Failed to verify seller: "))?;

    tracing::info!(seller_id = %seller_id, "Seller verified");
    Ok("Seller verified successfully!")
}

/// Seller profiles, for assigning a product to a seller.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the lookup fails.
pub async fn sellers(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
) -> Result<Vec<ProfileRefRow>> {
    require_admin(admin)?;
    backend
        .select(
            &Query::table("profiles")
                .select("id, full_name")
                .eq("role", UserRole::Seller),
            caller.bearer(),
        )
        .await
        .or_message("Failed to load sellers.")
}

// =============================================================================
// Products
// =============================================================================

/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins.
pub async fn products(catalog: &CatalogService, admin: &User) -> Result<Arc<Vec<Product>>> {
    require_admin(admin)?;
    Ok(catalog.ensure_loaded().await)
}

/// Admin product form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProductInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub base_price: Decimal,
    pub seller_id: UserId,
}

#[derive(Debug, Serialize)]
struct ProductPayload<'a> {
    title: &'a str,
    description: &'a str,
    base_price: Decimal,
    seller_id: UserId,
    category_id: CategoryId,
    images: Vec<String>,
}

impl<'a> ProductPayload<'a> {
    fn from_input(input: &'a AdminProductInput) -> Self {
        let title = input.title.trim();
        Self {
            title,
            description: &input.description,
            base_price: input.base_price,
            seller_id: input.seller_id,
            category_id: DEFAULT_CATEGORY,
            images: vec![placeholder_image(url_seed(title))],
        }
    }
}

/// Create a product, or update `product_id` when given, then refresh the
/// catalog.
///
/// Saving sets the image to a placeholder seeded by the title.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins, `AppError::BadRequest` for
/// a blank title or non-positive price, and `AppError::Backend` if the write
/// fails.
#[instrument(skip(backend, catalog, caller, admin, input), fields(admin_id = %admin.id))]
pub async fn save_product(
    backend: &BackendClient,
    catalog: &CatalogService,
    caller: Caller<'_>,
    admin: &User,
    product_id: Option<ProductId>,
    input: &AdminProductInput,
) -> Result<String> {
    require_admin(admin)?;
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title is required.".to_string()));
    }
    if input.base_price <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Price must be greater than zero.".to_string(),
        ));
    }

    let payload = ProductPayload::from_input(input);
    let verb = if let Some(id) = product_id {
        backend
            .update(
                &Query::table("products").eq("id", id),
                &payload,
                caller.bearer(),
            )
            .await
            .map_err(detailed("Error: "))?;
        "updated"
    } else {
        backend
            .insert(&Query::table("products"), &payload, caller.bearer())
            .await
            .map_err(detailed("Error: "))?;
        "created"
    };

    if let Err(e) = catalog.refresh().await {
        tracing::warn!(error = %e, "Catalog refresh after product save failed");
    }
    Ok(format!("Product {verb} successfully!"))
}

// =============================================================================
// Orders
// =============================================================================

/// All orders, newest first.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the lookup fails.
#[instrument(skip(backend, caller, admin), fields(admin_id = %admin.id))]
pub async fn orders(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
) -> Result<Vec<OrderSummary>> {
    require_admin(admin)?;
    let rows: Vec<OrderRow> = backend
        .select(
            &Query::table("orders")
                .select("*")
                .order("created_at", false),
            caller.bearer(),
        )
        .await
        .or_message("Failed to load orders.")?;
    Ok(rows.iter().map(order_summary_from_row).collect())
}

/// Line items of one order with their product titles.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the lookup fails.
pub async fn order_items(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
    order_id: OrderId,
) -> Result<Vec<OrderItemTitleRow>> {
    require_admin(admin)?;
    backend
        .select(
            &Query::table("order_items")
                .select("*, products(title)")
                .eq("order_id", order_id),
            caller.bearer(),
        )
        .await
        .or_message("Failed to load order items.")
}

#[derive(Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// the update fails.
#[instrument(skip(backend, caller, admin), fields(admin_id = %admin.id))]
pub async fn update_order_status(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
    order_id: OrderId,
    status: OrderStatus,
) -> Result<&'static str> {
    require_admin(admin)?;
    backend
        .update(
            &Query::table("orders").eq("id", order_id),
            &StatusUpdate { status },
            caller.bearer(),
        )
        .await
        .map_err(detailed("Error updating status: "))?;

    tracing::info!(order_id = %order_id, %status, "Order status updated");
    Ok("Order status updated!")
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub total_revenue: Decimal,
    pub order_count: usize,
    pub open_orders: usize,
    pub user_count: usize,
}

impl AdminDashboard {
    #[must_use]
    pub fn compute(orders: &[OrderSummary], user_count: usize) -> Self {
        Self {
            total_revenue: orders
                .iter()
                .filter(|o| o.status != OrderStatus::Cancelled)
                .map(|o| o.total)
                .sum(),
            order_count: orders.len(),
            open_orders: orders.iter().filter(|o| o.status.is_open()).count(),
            user_count,
        }
    }
}

/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins and `AppError::Backend` if
/// either lookup fails.
#[instrument(skip(backend, caller, admin), fields(admin_id = %admin.id))]
pub async fn dashboard(
    backend: &BackendClient,
    caller: Caller<'_>,
    admin: &User,
) -> Result<AdminDashboard> {
    require_admin(admin)?;
    let profiles_query = Query::table("profiles").select("id");
    let (orders, profiles) = tokio::join!(
        orders(backend, caller, admin),
        backend.select::<IdRow<UserId>>(&profiles_query, caller.bearer()),
    );
    let profiles = profiles.or_message("Failed to load dashboard.")?;
    Ok(AdminDashboard::compute(&orders?, profiles.len()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{offline_backend, user};
    use chrono::TimeZone;
    use naxstore_core::OrderPublicId;
    use uuid::Uuid;

    fn admin_user(
        n: u128,
        name: Option<&str>,
        updated_day: Option<u32>,
        tier: RewardTier,
        points: i64,
    ) -> AdminUser {
        AdminUser {
            id: UserId::new(Uuid::from_u128(n)),
            full_name: name.map(String::from),
            role: UserRole::User,
            updated_at: updated_day.map(|d| Utc.with_ymd_and_hms(2025, 5, d, 0, 0, 0).unwrap()),
            tier,
            points_balance: points,
            seller: None,
        }
    }

    fn sample() -> Vec<AdminUser> {
        vec![
            admin_user(1, Some("bea"), Some(3), RewardTier::Gold, 40),
            admin_user(2, None, None, RewardTier::Bronze, 0),
            admin_user(3, Some("Ana"), Some(9), RewardTier::Platinum, 900),
            admin_user(4, Some("Caio"), Some(1), RewardTier::Silver, 120),
        ]
    }

    fn ids(users: &[AdminUser]) -> Vec<u128> {
        users.iter().map(|u| u.id.as_uuid().as_u128()).collect()
    }

    #[test]
    fn test_default_sort_is_recent_first_missing_last() {
        let mut users = sample();
        sort_users(&mut users, UserSort::default());
        assert_eq!(ids(&users), vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_name_sort_ignores_case_and_keeps_missing_last() {
        let mut users = sample();
        sort_users(
            &mut users,
            UserSort {
                key: UserSortKey::FullName,
                direction: SortDirection::Ascending,
            },
        );
        assert_eq!(ids(&users), vec![3, 1, 4, 2]);

        sort_users(
            &mut users,
            UserSort {
                key: UserSortKey::FullName,
                direction: SortDirection::Descending,
            },
        );
        assert_eq!(ids(&users), vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_tier_sort_uses_rank() {
        let mut users = sample();
        sort_users(
            &mut users,
            UserSort {
                key: UserSortKey::Tier,
                direction: SortDirection::Ascending,
            },
        );
        assert_eq!(ids(&users), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_points_sort_descending() {
        let mut users = sample();
        sort_users(
            &mut users,
            UserSort {
                key: UserSortKey::PointsBalance,
                direction: SortDirection::Descending,
            },
        );
        assert_eq!(ids(&users), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_sort_deserializes_from_query_values() {
        let sort: UserSort =
            serde_json::from_str(r#"{"key": "points_balance", "direction": "ascending"}"#).unwrap();
        assert_eq!(sort.key, UserSortKey::PointsBalance);
        assert_eq!(sort.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_admin_user_from_profile_defaults() {
        let row: ProfileRow = serde_json::from_str(
            r#"{"id": "6c1f8a52-1111-4a5b-9c3d-000000000001", "role": "seller",
                "sellers": {"id": "6c1f8a52-1111-4a5b-9c3d-000000000001"}}"#,
        )
        .unwrap();
        let user = AdminUser::from(row);
        assert_eq!(user.tier, RewardTier::Bronze);
        assert_eq!(user.points_balance, 0);
        let seller = user.seller.unwrap();
        assert!(!seller.is_verified);
        assert_eq!(seller.commission_rate, DEFAULT_COMMISSION_RATE);
    }

    #[test]
    fn test_product_payload() {
        let input = AdminProductInput {
            title: " Star Map ".to_string(),
            description: "Poster".to_string(),
            base_price: Decimal::from(15),
            seller_id: UserId::new(Uuid::nil()),
        };
        let json = serde_json::to_value(ProductPayload::from_input(&input)).unwrap();
        assert_eq!(json["title"], "Star Map");
        assert_eq!(json["category_id"], 1);
        assert_eq!(
            json["images"][0],
            "https://picsum.photos/seed/Star+Map/600/600"
        );
    }

    #[test]
    fn test_dashboard_figures() {
        let summary = |id: i64, status: OrderStatus, total: i64| OrderSummary {
            id: OrderPublicId::new(Uuid::from_u128(u128::try_from(id).unwrap())),
            internal_id: OrderId::new(id),
            user_id: None,
            date: Utc::now(),
            status,
            total: Decimal::from(total),
        };
        let orders = vec![
            summary(1, OrderStatus::Delivered, 100),
            summary(2, OrderStatus::Shipped, 40),
            summary(3, OrderStatus::Cancelled, 70),
            summary(4, OrderStatus::PendingPayment, 10),
        ];
        let dash = AdminDashboard::compute(&orders, 12);
        assert_eq!(dash.total_revenue, Decimal::from(150));
        assert_eq!(dash.order_count, 4);
        assert_eq!(dash.open_orders, 2);
        assert_eq!(dash.user_count, 12);
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        let backend = offline_backend();
        let seller = user(UserRole::Seller);
        let caller = Caller::new(seller.id, "t");
        let err = users(&backend, caller, &seller, UserSort::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = update_order_status(&backend, caller, &seller, OrderId::new(1), OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_detailed_message_embeds_backend_text() {
        let err = detailed("Error updating status: ")(BackendError::Api {
            status: 403,
            code: Some("42501".to_string()),
            message: "permission denied".to_string(),
        });
        assert_eq!(err.client_message(), "Error updating status: permission denied");
    }
}
