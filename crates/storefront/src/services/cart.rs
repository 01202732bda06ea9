//! Cart synchronization.
//!
//! The session-held [`CartState`] is the visitor's cart. For a signed-in
//! visitor every mutation is written to the backend `cart_items` table
//! first; the session copy changes only once the write succeeds.

use chrono::{DateTime, Utc};
use tracing::instrument;

use naxstore_core::cart::RemovedItem;
use naxstore_core::{Cart, CartId, CartItem, CartStatus, Coupon, Product, ProductId, ProductSummary};

use crate::backend::rows::{CartItemRow, CartItemUpsert, CartRow, NewCart};
use crate::backend::{BackendClient, BackendError, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::models::CartState;
use crate::services::Caller;
use crate::services::catalog::fetch_products;

const CART_ITEMS: &str = "cart_items";
const CONFLICT_TARGET: &str = "cart_id,product_id,variant_id";

#[derive(serde::Serialize)]
struct QuantityUpdate {
    quantity: u32,
}

/// Find the user's active cart, creating one if there is none.
///
/// # Errors
///
/// Returns `BackendError` if the lookup or insert fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn ensure_cart(
    backend: &BackendClient,
    caller: Caller<'_>,
) -> std::result::Result<CartId, BackendError> {
    let existing: Option<CartRow> = backend
        .select_one(
            &Query::table("carts")
                .select("id")
                .eq("user_id", caller.user_id)
                .eq("status", CartStatus::Active)
                .limit(1),
            caller.bearer(),
        )
        .await?;
    if let Some(cart) = existing {
        return Ok(cart.id);
    }

    let created: Vec<CartRow> = backend
        .insert_returning(
            &Query::table("carts").select("id"),
            &NewCart {
                user_id: caller.user_id,
            },
            caller.bearer(),
        )
        .await?;
    created
        .into_iter()
        .next()
        .map(|c| c.id)
        .ok_or_else(|| BackendError::NotFound("inserted cart row".to_string()))
}

async fn remote_lines(
    backend: &BackendClient,
    caller: Caller<'_>,
    cart_id: CartId,
) -> std::result::Result<Vec<CartItemRow>, BackendError> {
    backend
        .select(
            &Query::table(CART_ITEMS)
                .select("product_id,quantity")
                .eq("cart_id", cart_id),
            caller.bearer(),
        )
        .await
}

/// Merge the guest cart in `state` into the user's remote cart, then load
/// the merged cart into `state`.
///
/// Guest lines are merged only while `state` has no remote cart yet. Once
/// it has one, its lines already live remotely and this only reloads them,
/// so repeated session loads never add the same quantities twice.
///
/// Rows for products missing from `catalog` are fetched by id before the
/// lines are resolved. On failure `state` is left as it was.
///
/// # Errors
///
/// Returns `BackendError` if any backend call fails.
#[instrument(skip_all, fields(user_id = %caller.user_id, guest_lines = state.items.items().len()))]
pub async fn merge_and_load(
    backend: &BackendClient,
    caller: Caller<'_>,
    catalog: &[Product],
    state: &mut CartState,
) -> std::result::Result<(), BackendError> {
    let cart_id = ensure_cart(backend, caller).await?;

    if state.cart_id.is_none() && !state.items.is_empty() {
        let existing = remote_lines(backend, caller, cart_id).await?;
        let merged = state.items.merge_quantities(
            existing
                .iter()
                .map(|row| (row.product_id, clamp_quantity(row.quantity))),
        );
        let payload: Vec<CartItemUpsert> = merged
            .into_iter()
            .map(|(product_id, quantity)| CartItemUpsert {
                cart_id,
                product_id,
                variant_id: None,
                quantity,
            })
            .collect();
        backend
            .upsert(
                &Query::table(CART_ITEMS).on_conflict(CONFLICT_TARGET),
                &payload,
                caller.bearer(),
            )
            .await?;
        tracing::info!(lines = payload.len(), "Guest cart merged");
    }

    let rows = remote_lines(backend, caller, cart_id).await?;
    let missing: Vec<ProductId> = rows
        .iter()
        .filter(|row| row.quantity > 0 && !catalog.iter().any(|p| p.id == row.product_id))
        .map(|row| row.product_id)
        .collect();
    let items = if missing.is_empty() {
        resolve_lines(&rows, catalog)
    } else {
        let mut known = fetch_products(backend, &missing).await?;
        known.extend_from_slice(catalog);
        resolve_lines(&rows, &known)
    };

    state.items = items;
    state.cart_id = Some(cart_id);
    tracing::info!(lines = state.items.items().len(), "Cart loaded");
    Ok(())
}

/// Cart lines for remote rows; rows for unknown products are dropped.
#[must_use]
pub fn resolve_lines(rows: &[CartItemRow], catalog: &[Product]) -> Cart {
    Cart::from_items(rows.iter().filter_map(|row| {
        let quantity = clamp_quantity(row.quantity);
        if quantity == 0 {
            return None;
        }
        catalog
            .iter()
            .find(|p| p.id == row.product_id)
            .map(|p| CartItem::new(p.summary(), quantity))
    }))
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity.max(0)).unwrap_or(u32::MAX)
}

/// Add one unit of `product`. Returns the message to show.
///
/// # Errors
///
/// Returns `AppError::Backend` if the remote write fails; the session cart
/// is unchanged.
#[instrument(skip_all, fields(product_id = %product.id))]
pub async fn add(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    state: &mut CartState,
    product: &ProductSummary,
) -> Result<String> {
    if let Some(caller) = caller {
        let cart_id = cart_id_for(backend, caller, state)
            .await
            .or_message("Failed to add item.")?;
        let quantity = state.items.quantity_of(product.id).saturating_add(1);
        backend
            .upsert(
                &Query::table(CART_ITEMS).on_conflict(CONFLICT_TARGET),
                &CartItemUpsert {
                    cart_id,
                    product_id: product.id,
                    variant_id: None,
                    quantity,
                },
                caller.bearer(),
            )
            .await
            .or_message("Failed to add item.")?;
    }

    state.items.add(product.clone(), 1);
    Ok(format!("{} added to cart", product.name))
}

/// Remove a line, remembering it for [`restore_last_removed`].
///
/// Returns `None` when the product was not in the cart.
///
/// # Errors
///
/// Returns `AppError::Backend` if the remote delete fails; the session cart
/// is unchanged.
#[instrument(skip(backend, caller, state))]
pub async fn remove(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    state: &mut CartState,
    product_id: ProductId,
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    if state.items.get(product_id).is_none() {
        return Ok(None);
    }

    if let Some(caller) = caller {
        let cart_id = cart_id_for(backend, caller, state)
            .await
            .or_message("Failed to remove item.")?;
        backend
            .delete(
                &Query::table(CART_ITEMS)
                    .eq("cart_id", cart_id)
                    .eq("product_id", product_id),
                caller.bearer(),
            )
            .await
            .or_message("Failed to remove item.")?;
    }

    Ok(state.items.remove(product_id).map(|item| {
        let message = format!("{} removed", item.product.name);
        state.last_removed = Some(RemovedItem::new(item, now));
        message
    }))
}

/// Put the most recently removed line back, if still within the undo window.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when there is nothing to restore, and the
/// errors of [`add`].
pub async fn restore_last_removed(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    state: &mut CartState,
    now: DateTime<Utc>,
) -> Result<String> {
    let Some(removed) = state.last_removed.take() else {
        return Err(AppError::BadRequest("Nothing to restore.".to_string()));
    };
    if !removed.is_restorable(now) {
        return Err(AppError::BadRequest("Nothing to restore.".to_string()));
    }

    if let Err(e) = add(backend, caller, state, &removed.item.product).await {
        state.last_removed = Some(removed);
        return Err(e);
    }
    Ok("Item restored".to_string())
}

/// Set a line's quantity; zero or less removes it.
///
/// # Errors
///
/// Returns `AppError::Backend` if the remote write fails; the session cart
/// is unchanged.
#[instrument(skip(backend, caller, state))]
pub async fn update_quantity(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    state: &mut CartState,
    product_id: ProductId,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    if quantity <= 0 {
        return remove(backend, caller, state, product_id, now).await.map(drop);
    }
    if state.items.get(product_id).is_none() {
        return Ok(());
    }

    if let Some(caller) = caller {
        let cart_id = cart_id_for(backend, caller, state)
            .await
            .or_message("Failed to update quantity.")?;
        backend
            .update(
                &Query::table(CART_ITEMS)
                    .eq("cart_id", cart_id)
                    .eq("product_id", product_id),
                &QuantityUpdate {
                    quantity: clamp_quantity(quantity),
                },
                caller.bearer(),
            )
            .await
            .or_message("Failed to update quantity.")?;
    }

    state.items.set_quantity(product_id, quantity);
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns `AppError::Backend` if the remote delete fails; the session cart
/// is unchanged.
pub async fn clear(
    backend: &BackendClient,
    caller: Option<Caller<'_>>,
    state: &mut CartState,
) -> Result<()> {
    if let (Some(caller), Some(cart_id)) = (caller, state.cart_id) {
        backend
            .delete(&Query::table(CART_ITEMS).eq("cart_id", cart_id), caller.bearer())
            .await
            .or_message("Failed to clear cart.")?;
    }
    state.items.clear();
    Ok(())
}

/// Reset after an order was placed. The backend has already closed the cart,
/// so the next mutation creates a fresh one.
pub fn clear_after_checkout(state: &mut CartState, coupon: &mut Option<Coupon>) {
    state.items.clear();
    state.cart_id = None;
    state.last_removed = None;
    *coupon = None;
}

pub fn reset_on_logout(state: &mut CartState) {
    *state = CartState::default();
}

async fn cart_id_for(
    backend: &BackendClient,
    caller: Caller<'_>,
    state: &mut CartState,
) -> std::result::Result<CartId, BackendError> {
    if let Some(id) = state.cart_id {
        return Ok(id);
    }
    let id = ensure_cart(backend, caller).await?;
    state.cart_id = Some(id);
    Ok(id)
}
