//! Product catalog snapshot.
//!
//! The whole catalog is small enough to hold in memory. It is fetched once
//! on demand, refreshed on a timer, and patched in place when a review or a
//! product is added through this service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use naxstore_core::{CategoryId, Product, ProductId, ProductStatus, Review, User};

use crate::backend::conversions::{placeholder_image, product_from_row};
use crate::backend::rows::{
    NewProduct, NewReview, NewVariant, PRODUCT_SELECT, ProductRow, ReviewRow,
};
use crate::backend::{BackendClient, BackendError, Bearer, Query};
use crate::error::{AppError, BackendResultExt, Result};
use crate::services::Caller;

/// Category new listings fall into when none is chosen.
pub const DEFAULT_CATEGORY: CategoryId = CategoryId::new(1);

/// Seller input for a new listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub stock: i64,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductInput {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("Title is required.".to_string()));
        }
        if self.price <= Decimal::ZERO {
            return Err(AppError::BadRequest(
                "Price must be greater than zero.".to_string(),
            ));
        }
        if self.stock < 0 {
            return Err(AppError::BadRequest("Stock cannot be negative.".to_string()));
        }
        Ok(())
    }
}

/// Outcome of [`CatalogService::add_product`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedProduct {
    pub product: Product,
    /// `false` when the product was created but its stock could not be set.
    pub stock_saved: bool,
    pub message: String,
}

/// In-memory catalog snapshot backed by the `products` table.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    backend: BackendClient,
    products: RwLock<Arc<Vec<Product>>>,
    loaded: AtomicBool,
    /// Held for the duration of a catalog fetch.
    fetching: Mutex<()>,
}

impl CatalogService {
    #[must_use]
    pub fn new(backend: BackendClient) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                backend,
                products: RwLock::new(Arc::new(Vec::new())),
                loaded: AtomicBool::new(false),
                fetching: Mutex::new(()),
            }),
        }
    }

    /// Replace the snapshot with `products`, marking the catalog loaded.
    pub async fn replace(&self, products: Vec<Product>) {
        *self.inner.products.write().await = Arc::new(products);
        self.inner.loaded.store(true, Ordering::Release);
    }

    /// Current snapshot.
    pub async fn products(&self) -> Arc<Vec<Product>> {
        Arc::clone(&*self.inner.products.read().await)
    }

    /// Fetch the catalog if it has never loaded, then return the snapshot.
    ///
    /// A fetch already in flight is waited for rather than answered with the
    /// empty snapshot. The result is still empty if the first load fails.
    pub async fn ensure_loaded(&self) -> Arc<Vec<Product>> {
        if !self.inner.loaded.load(Ordering::Acquire) {
            let _fetching = self.inner.fetching.lock().await;
            if !self.inner.loaded.load(Ordering::Acquire)
                && let Err(e) = self.fetch().await
            {
                tracing::warn!(error = %e, "Initial catalog load failed");
            }
        }
        self.products().await
    }

    pub async fn get_product(&self, id: ProductId) -> Option<Product> {
        self.ensure_loaded()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Products for `ids`, in the given order; unknown ids are skipped.
    pub async fn by_ids(&self, ids: &[ProductId]) -> Vec<Product> {
        let products = self.ensure_loaded().await;
        crate::backend::conversions::resolve_products(ids, &products)
    }

    /// Re-fetch the catalog.
    ///
    /// A refresh already in flight is not duplicated. On failure the
    /// previous snapshot is kept.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the fetch fails.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> std::result::Result<(), BackendError> {
        let Ok(_fetching) = self.inner.fetching.try_lock() else {
            tracing::debug!("Catalog refresh already in flight");
            return Ok(());
        };
        self.fetch().await
    }

    async fn fetch(&self) -> std::result::Result<(), BackendError> {
        let query = Query::table("products").select(PRODUCT_SELECT);
        let rows = self
            .inner
            .backend
            .select::<ProductRow>(&query, Bearer::Anon)
            .await?;
        let products: Vec<Product> = rows.into_iter().map(product_from_row).collect();
        tracing::info!(count = products.len(), "Catalog refreshed");
        self.replace(products).await;
        Ok(())
    }

    /// Submit a review and prepend it to the product on success.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for a rating outside 1..=5,
    /// `AppError::NotFound` for an unknown product, and `AppError::Backend`
    /// if the insert fails (the snapshot is left unchanged).
    #[instrument(skip(self, caller, user, comment), fields(user_id = %user.id))]
    pub async fn add_review(
        &self,
        caller: Caller<'_>,
        user: &User,
        product_id: ProductId,
        rating: u8,
        comment: &str,
    ) -> Result<Review> {
        if !Review::is_valid_rating(rating) {
            return Err(AppError::BadRequest(
                "Rating must be between 1 and 5.".to_string(),
            ));
        }
        if self.get_product(product_id).await.is_none() {
            return Err(AppError::NotFound(format!("product {product_id}")));
        }

        let rows: Vec<ReviewRow> = self
            .inner
            .backend
            .insert_returning(
                &Query::table("reviews").select("*"),
                &NewReview {
                    product_id,
                    user_id: user.id,
                    rating,
                    comment,
                },
                caller.bearer(),
            )
            .await
            .or_message("Failed to submit review.")?;

        let review = rows.into_iter().next().map_or_else(
            || Review {
                id: naxstore_core::ReviewId::new(0),
                author: user.name.clone(),
                rating,
                comment: comment.to_string(),
                date: Utc::now(),
            },
            |row| Review {
                id: row.id,
                author: user.name.clone(),
                rating,
                comment: row.comment.unwrap_or_default(),
                date: row.created_at,
            },
        );

        self.patch(|products| {
            if let Some(product) = products.iter_mut().find(|p| p.id == product_id) {
                product.reviews.insert(0, review.clone());
            }
        })
        .await;

        Ok(review)
    }

    /// Create a listing for `seller`: the product row, then a single default
    /// variant carrying the stock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Forbidden` unless `seller` has the seller role,
    /// `AppError::BadRequest` for invalid input, and `AppError::Backend` if
    /// the product insert fails. A failed variant insert is reported through
    /// [`AddedProduct::stock_saved`], not as an error.
    #[instrument(skip(self, caller, seller, input), fields(seller_id = %seller.id))]
    pub async fn add_product(
        &self,
        caller: Caller<'_>,
        seller: &User,
        input: ProductInput,
    ) -> Result<AddedProduct> {
        if !seller.is_seller() {
            return Err(AppError::Forbidden(
                "Only sellers can add products.".to_string(),
            ));
        }
        input.validate()?;

        let images = if input.images.is_empty() {
            vec![placeholder_image(url_seed(&input.title))]
        } else {
            input.images.clone()
        };

        let rows: Vec<ProductRow> = self
            .inner
            .backend
            .insert_returning(
                &Query::table("products").select("*"),
                &NewProduct {
                    seller_id: seller.id,
                    category_id: input.category_id.unwrap_or(DEFAULT_CATEGORY),
                    title: input.title.trim(),
                    description: &input.description,
                    base_price: input.price,
                    images,
                    status: ProductStatus::Active,
                },
                caller.bearer(),
            )
            .await
            .or_message("Failed to create product.")?;
        let row = rows.into_iter().next().ok_or_else(|| AppError::Backend {
            message: "Failed to create product.".to_string(),
            source: BackendError::NotFound("inserted product row".to_string()),
        })?;
        let product_id = row.id;

        let stock_saved = match self
            .inner
            .backend
            .insert(
                &Query::table("product_variants"),
                &NewVariant {
                    product_id,
                    stock: input.stock,
                },
                caller.bearer(),
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, product_id = %product_id, "Failed to create product variant");
                false
            }
        };

        let mut product = product_from_row(row);
        product.stock = input.stock;

        let message = if stock_saved {
            format!("{} has been added!", product.name)
        } else {
            "Product created, but failed to set stock.".to_string()
        };

        let listed = product.clone();
        self.patch(move |products| products.insert(0, listed)).await;

        Ok(AddedProduct {
            product,
            stock_saved,
            message,
        })
    }

    async fn patch(&self, f: impl FnOnce(&mut Vec<Product>)) {
        let mut guard = self.inner.products.write().await;
        let mut products = guard.as_ref().clone();
        f(&mut products);
        *guard = Arc::new(products);
    }
}

/// Fetch `ids` directly from the backend, for rows the snapshot does not
/// know about yet. Ids with no product are absent from the result.
///
/// # Errors
///
/// Returns `BackendError` if the fetch fails.
#[instrument(skip(backend))]
pub async fn fetch_products(
    backend: &BackendClient,
    ids: &[ProductId],
) -> std::result::Result<Vec<Product>, BackendError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<ProductRow> = backend
        .select(
            &Query::table("products")
                .select(PRODUCT_SELECT)
                .is_in("id", ids),
            Bearer::Anon,
        )
        .await?;
    Ok(rows.into_iter().map(product_from_row).collect())
}

/// Percent-encode a title for use as an image seed.
#[must_use]
pub fn url_seed(title: &str) -> String {
    url::form_urlencoded::byte_serialize(title.trim().as_bytes()).collect()
}
