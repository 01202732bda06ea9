//! Seller portal: listings, orders, commissions, and the dashboard.
//!
//! Order data is reached through the seller's own products and order items,
//! one query at a time, and joined here. Row-level security on `orders`
//! does not allow a seller to embed it directly.

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use naxstore_core::{Commission, OrderId, OrderItemId, OrderSummary, Product, ProductId, User};

use crate::backend::conversions::{DEFAULT_COMMISSION_RATE, order_summary_from_row};
use crate::backend::rows::{
    CommissionRow, IdRow, OrderItemRefRow, OrderItemTitleRow, OrderRefRow, OrderRow,
};
use crate::backend::{BackendClient, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::Caller;
use crate::services::catalog::CatalogService;

const ORDERS_FAILED: &str = "Failed to load your orders.";
const COMMISSIONS_FAILED: &str = "Failed to load commission data.";

fn require_seller(user: &User) -> Result<()> {
    if user.is_seller() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Seller account required.".to_string()))
    }
}

/// The seller's own listings, from the catalog snapshot.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-sellers.
pub async fn products(catalog: &CatalogService, seller: &User) -> Result<Vec<Product>> {
    require_seller(seller)?;
    Ok(catalog
        .ensure_loaded()
        .await
        .iter()
        .filter(|p| p.seller_id == seller.id)
        .cloned()
        .collect())
}

/// Orders containing at least one of the seller's products, newest first.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-sellers and `AppError::Backend` if
/// any lookup fails.
#[instrument(skip(backend, caller, seller), fields(seller_id = %seller.id))]
pub async fn orders(
    backend: &BackendClient,
    caller: Caller<'_>,
    seller: &User,
) -> Result<Vec<OrderSummary>> {
    require_seller(seller)?;
    let products = product_ids(backend, caller, seller).await?;
    orders_for_products(backend, caller, &products).await
}

async fn product_ids(
    backend: &BackendClient,
    caller: Caller<'_>,
    seller: &User,
) -> Result<Vec<ProductId>> {
    let rows: Vec<IdRow<ProductId>> = backend
        .select(
            &Query::table("products")
                .select("id")
                .eq("seller_id", seller.id),
            caller.bearer(),
        )
        .await
        .or_message(ORDERS_FAILED)?;
    Ok(rows.into_iter().map(|r| r.id).collect())
}

async fn orders_for_products(
    backend: &BackendClient,
    caller: Caller<'_>,
    products: &[ProductId],
) -> Result<Vec<OrderSummary>> {
    if products.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<OrderItemRefRow> = backend
        .select(
            &Query::table("order_items")
                .select("order_id")
                .is_in("product_id", products),
            caller.bearer(),
        )
        .await
        .or_message(ORDERS_FAILED)?;
    let order_ids: BTreeSet<OrderId> = items.into_iter().map(|i| i.order_id).collect();
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<OrderRow> = backend
        .select(
            &Query::table("orders")
                .select("*")
                .is_in("id", &order_ids)
                .order("created_at", false),
            caller.bearer(),
        )
        .await
        .or_message(ORDERS_FAILED)?;
    Ok(rows.iter().map(order_summary_from_row).collect())
}

/// The seller's commissions, newest first.
///
/// Commissions whose order item, product, or order cannot be found are
/// skipped.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-sellers and `AppError::Backend` if
/// any lookup fails.
#[instrument(skip(backend, caller, seller), fields(seller_id = %seller.id))]
pub async fn commissions(
    backend: &BackendClient,
    caller: Caller<'_>,
    seller: &User,
) -> Result<Vec<Commission>> {
    require_seller(seller)?;

    let rows: Vec<CommissionRow> = backend
        .select(
            &Query::table("commissions")
                .select("*")
                .order("created_at", false),
            caller.bearer(),
        )
        .await
        .or_message(COMMISSIONS_FAILED)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<OrderItemTitleRow> = backend
        .select(
            &Query::table("order_items")
                .select("id, order_id, products(title)")
                .is_in("id", rows.iter().map(|c| c.order_item_id)),
            caller.bearer(),
        )
        .await
        .or_message(COMMISSIONS_FAILED)?;

    let order_ids: BTreeSet<OrderId> = items.iter().map(|i| i.order_id).collect();
    let orders: Vec<OrderRefRow> = if order_ids.is_empty() {
        Vec::new()
    } else {
        backend
            .select(
                &Query::table("orders")
                    .select("id, public_id")
                    .is_in("id", &order_ids),
                caller.bearer(),
            )
            .await
            .or_message(COMMISSIONS_FAILED)?
    };

    Ok(join_commissions(rows, &items, &orders))
}

/// Join commission rows with their order items and orders.
#[must_use]
pub fn join_commissions(
    rows: Vec<CommissionRow>,
    items: &[OrderItemTitleRow],
    orders: &[OrderRefRow],
) -> Vec<Commission> {
    let items: HashMap<OrderItemId, &OrderItemTitleRow> = items.iter().map(|i| (i.id, i)).collect();
    let orders: HashMap<OrderId, &OrderRefRow> = orders.iter().map(|o| (o.id, o)).collect();

    rows.into_iter()
        .filter_map(|c| {
            let item = items.get(&c.order_item_id)?;
            let product = item.products.as_ref()?;
            let order = orders.get(&item.order_id)?;
            Some(Commission {
                id: c.id,
                amount: c.amount,
                rate: c.commission_rate,
                date: c.created_at,
                order_item_id: c.order_item_id,
                order_public_id: order.public_id,
                product_name: product.title.clone(),
            })
        })
        .collect()
}

/// Seller dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerDashboard {
    pub product_count: usize,
    pub order_count: usize,
    pub total_sales: Decimal,
    pub pending_orders: usize,
    /// Sales less the platform commission.
    pub net_earnings: Decimal,
}

impl SellerDashboard {
    #[must_use]
    pub fn compute(product_count: usize, orders: &[OrderSummary], rate: Decimal) -> Self {
        let total_sales: Decimal = orders.iter().map(|o| o.total).sum();
        Self {
            product_count,
            order_count: orders.len(),
            total_sales,
            pending_orders: orders.iter().filter(|o| o.status.is_open()).count(),
            net_earnings: (total_sales * (Decimal::ONE - rate)).round_dp(2),
        }
    }
}

/// # Errors
///
/// Returns the errors of [`orders`].
#[instrument(skip(backend, caller, seller), fields(seller_id = %seller.id))]
pub async fn dashboard(
    backend: &BackendClient,
    caller: Caller<'_>,
    seller: &User,
) -> Result<SellerDashboard> {
    require_seller(seller)?;
    let products = product_ids(backend, caller, seller).await?;
    let orders = orders_for_products(backend, caller, &products).await?;
    Ok(SellerDashboard::compute(
        products.len(),
        &orders,
        seller.commission_rate.unwrap_or(DEFAULT_COMMISSION_RATE),
    ))
}
