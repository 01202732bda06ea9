//! Wishlist membership.

use serde::Serialize;
use tracing::instrument;

use naxstore_core::{Product, ProductId, WishlistId};

use crate::backend::rows::{NewWishlistItem, WishlistItemRow, WishlistRow};
use crate::backend::{BackendClient, BackendError, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::Caller;

const UPDATE_FAILED: &str = "Could not update wishlist. Please try again.";

/// The signed-in user's wishlist: its id, if one exists, and product ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    pub id: Option<WishlistId>,
    pub product_ids: Vec<ProductId>,
}

impl Wishlist {
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.product_ids.contains(&product_id)
    }
}

/// Load the user's wishlist. A user without one gets an empty wishlist.
///
/// # Errors
///
/// Returns `BackendError` if either lookup fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn load(
    backend: &BackendClient,
    caller: Caller<'_>,
) -> std::result::Result<Wishlist, BackendError> {
    let list: Option<WishlistRow> = backend
        .select_one(
            &Query::table("wishlists")
                .select("id")
                .eq("user_id", caller.user_id),
            caller.bearer(),
        )
        .await?;
    let Some(list) = list else {
        return Ok(Wishlist::default());
    };

    let items: Vec<WishlistItemRow> = backend
        .select(
            &Query::table("wishlist_items")
                .select("product_id")
                .eq("wishlist_id", list.id),
            caller.bearer(),
        )
        .await?;

    Ok(Wishlist {
        id: Some(list.id),
        product_ids: items.into_iter().map(|i| i.product_id).collect(),
    })
}

/// Add `product` to the wishlist, or remove it if already present.
///
/// Returns the message to show.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if the user has no wishlist, and
/// `AppError::Backend` if the write fails (the wishlist is unchanged).
#[instrument(skip(backend, caller, wishlist, product), fields(product_id = %product.id))]
pub async fn toggle(
    backend: &BackendClient,
    caller: Caller<'_>,
    wishlist: &mut Wishlist,
    product: &Product,
) -> Result<String> {
    let Some(wishlist_id) = wishlist.id else {
        return Err(AppError::BadRequest(UPDATE_FAILED.to_string()));
    };

    if wishlist.contains(product.id) {
        backend
            .delete(
                &Query::table("wishlist_items")
                    .eq("wishlist_id", wishlist_id)
                    .eq("product_id", product.id),
                caller.bearer(),
            )
            .await
            .or_message(UPDATE_FAILED)?;
        wishlist.product_ids.retain(|id| *id != product.id);
        Ok(format!("{} removed from wishlist", product.name))
    } else {
        backend
            .insert(
                &Query::table("wishlist_items"),
                &NewWishlistItem {
                    wishlist_id,
                    product_id: product.id,
                },
                caller.bearer(),
            )
            .await
            .or_message(UPDATE_FAILED)?;
        wishlist.product_ids.push(product.id);
        Ok(format!("{} added to wishlist", product.name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{FakeBackend, offline_backend, product, user};
    use naxstore_core::UserRole;
    use serde_json::json;

    #[tokio::test]
    async fn test_toggle_without_wishlist_is_rejected() {
        let backend = offline_backend();
        let user = user(UserRole::User);
        let mut wishlist = Wishlist::default();

        let err = toggle(
            &backend,
            Caller::new(user.id, "token"),
            &mut wishlist,
            &product(1, "Nebula Hoodie", 60),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_toggle_leaves_wishlist_unchanged() {
        let backend = offline_backend();
        let user = user(UserRole::User);
        let mut wishlist = Wishlist {
            id: Some(WishlistId::new(uuid::Uuid::from_u128(3))),
            product_ids: vec![ProductId::new(1)],
        };

        let result = toggle(
            &backend,
            Caller::new(user.id, "token"),
            &mut wishlist,
            &product(1, "Nebula Hoodie", 60),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(wishlist.product_ids, vec![ProductId::new(1)]);
    }

    #[tokio::test]
    async fn test_load_and_toggle() {
        let (fake, backend) = FakeBackend::start().await;
        let user = user(UserRole::User);
        let caller = Caller::new(user.id, "token");
        let list_id = uuid::Uuid::from_u128(3);
        fake.seed("wishlists", vec![json!({ "id": list_id, "user_id": user.id })]);
        fake.seed(
            "wishlist_items",
            vec![
                json!({ "wishlist_id": list_id, "product_id": 1 }),
                json!({ "wishlist_id": list_id, "product_id": 2 }),
            ],
        );

        let mut wishlist = load(&backend, caller).await.unwrap();
        assert_eq!(wishlist.id, Some(WishlistId::new(list_id)));
        assert_eq!(wishlist.product_ids, vec![ProductId::new(1), ProductId::new(2)]);

        let hoodie = product(1, "Nebula Hoodie", 60);
        let msg = toggle(&backend, caller, &mut wishlist, &hoodie).await.unwrap();
        assert_eq!(msg, "Nebula Hoodie removed from wishlist");
        assert!(!wishlist.contains(hoodie.id));
        assert_eq!(fake.rows("wishlist_items").len(), 1);

        let msg = toggle(&backend, caller, &mut wishlist, &hoodie).await.unwrap();
        assert_eq!(msg, "Nebula Hoodie added to wishlist");
        assert!(wishlist.contains(hoodie.id));
        let items = fake.rows("wishlist_items");
        assert!(items.iter().any(|row| row["product_id"] == 1));
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_user_without_wishlist_loads_empty() {
        let (_fake, backend) = FakeBackend::start().await;
        let user = user(UserRole::User);
        let wishlist = load(&backend, Caller::new(user.id, "token")).await.unwrap();
        assert_eq!(wishlist, Wishlist::default());
    }
}
