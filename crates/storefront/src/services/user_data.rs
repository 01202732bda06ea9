//! Per-user data cache: orders, addresses, wishlist, notifications.
//!
//! Entries older than the refresh interval are re-fetched on access. Each
//! part is fetched independently; a part that fails keeps its previous
//! value. Entries idle for 30 minutes are evicted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::instrument;

use naxstore_core::{Notification, Order, ShippingAddress, UserId};

use crate::backend::conversions::{address_from_row, order_from_row};
use crate::backend::rows::{AddressRow, ORDER_SELECT, OrderRow};
use crate::backend::{BackendClient, BackendError, Query};
use crate::services::wishlist::{self, Wishlist};
use crate::services::{Caller, notifications};

const IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

/// Cached data for one user.
#[derive(Debug, Clone, Default)]
pub struct UserData {
    /// Newest first.
    pub orders: Vec<Order>,
    pub addresses: Vec<ShippingAddress>,
    pub wishlist: Wishlist,
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl UserData {
    fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        self.fetched_at.is_none_or(|at| now - at > max_age)
    }
}

/// The user's orders, newest first.
///
/// # Errors
///
/// Returns `BackendError` if the lookup fails.
#[instrument(skip(backend, caller), fields(user_id = %caller.user_id))]
pub async fn fetch_orders(
    backend: &BackendClient,
    caller: Caller<'_>,
) -> Result<Vec<Order>, BackendError> {
    let rows: Vec<OrderRow> = backend
        .select(
            &Query::table("orders")
                .select(ORDER_SELECT)
                .eq("user_id", caller.user_id)
                .order("created_at", false),
            caller.bearer(),
        )
        .await?;
    Ok(rows.into_iter().map(order_from_row).collect())
}

/// The user's saved addresses.
///
/// # Errors
///
/// Returns `BackendError` if the lookup fails.
pub async fn fetch_addresses(
    backend: &BackendClient,
    caller: Caller<'_>,
) -> Result<Vec<ShippingAddress>, BackendError> {
    let rows: Vec<AddressRow> = backend
        .select(
            &Query::table("addresses")
                .select("*")
                .eq("user_id", caller.user_id)
                .order("id", true),
            caller.bearer(),
        )
        .await?;
    Ok(rows.into_iter().map(address_from_row).collect())
}

fn keep_on_error<T>(part: &'static str, result: Result<T, BackendError>, previous: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, part, "User data fetch failed; keeping previous value");
            previous
        }
    }
}

/// Cache of [`UserData`] keyed by user id.
#[derive(Clone)]
pub struct UserDataCache {
    inner: Arc<UserDataCacheInner>,
}

struct UserDataCacheInner {
    backend: BackendClient,
    cache: Cache<UserId, Arc<UserData>>,
    max_age: Duration,
}

impl UserDataCache {
    #[must_use]
    pub fn new(backend: BackendClient, max_age: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(IDLE_EVICTION)
            .build();
        Self {
            inner: Arc::new(UserDataCacheInner {
                backend,
                cache,
                max_age,
            }),
        }
    }

    /// Cached data for the caller, re-fetched when missing or stale.
    pub async fn get(&self, caller: Caller<'_>) -> Arc<UserData> {
        let cached = self.inner.cache.get(&caller.user_id).await;
        match cached {
            Some(data) if !data.is_stale(Utc::now(), self.inner.max_age) => data,
            previous => self.fetch(caller, previous.as_deref()).await,
        }
    }

    /// Re-fetch every part for the caller, regardless of age.
    pub async fn refresh(&self, caller: Caller<'_>) -> Arc<UserData> {
        let previous = self.inner.cache.get(&caller.user_id).await;
        self.fetch(caller, previous.as_deref()).await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id))]
    async fn fetch(&self, caller: Caller<'_>, previous: Option<&UserData>) -> Arc<UserData> {
        let backend = &self.inner.backend;
        let (orders, addresses, wishlist, notifications) = tokio::join!(
            fetch_orders(backend, caller),
            fetch_addresses(backend, caller),
            wishlist::load(backend, caller),
            notifications::fetch(backend, caller),
        );

        let previous = previous.cloned().unwrap_or_default();
        let data = Arc::new(UserData {
            orders: keep_on_error("orders", orders, previous.orders),
            addresses: keep_on_error("addresses", addresses, previous.addresses),
            wishlist: keep_on_error("wishlist", wishlist, previous.wishlist),
            notifications: keep_on_error("notifications", notifications, previous.notifications),
            fetched_at: Some(Utc::now()),
        });
        self.inner
            .cache
            .insert(caller.user_id, Arc::clone(&data))
            .await;
        data
    }

    /// Re-fetch only the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the lookup fails; the cached orders are kept.
    pub async fn refresh_orders(&self, caller: Caller<'_>) -> Result<(), BackendError> {
        let orders = fetch_orders(&self.inner.backend, caller).await?;
        self.update(caller.user_id, |data| data.orders = orders).await;
        Ok(())
    }

    /// Patch a cached entry in place. Users without an entry are skipped.
    pub async fn update(&self, user_id: UserId, f: impl FnOnce(&mut UserData)) {
        if let Some(current) = self.inner.cache.get(&user_id).await {
            let mut data = current.as_ref().clone();
            f(&mut data);
            self.inner.cache.insert(user_id, Arc::new(data)).await;
        }
    }

    /// Drop the user's entry so the next access re-fetches.
    pub async fn evict(&self, user_id: UserId) {
        self.inner.cache.invalidate(&user_id).await;
    }

    /// Seed an entry directly.
    pub async fn put(&self, user_id: UserId, data: UserData) {
        self.inner.cache.insert(user_id, Arc::new(data)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{offline_backend, user};
    use naxstore_core::{NotificationId, NotificationType, UserRole};

    fn notification(id: i64) -> Notification {
        Notification {
            id: NotificationId::new(id),
            message: "Welcome".to_string(),
            kind: NotificationType::System,
            is_read: false,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let max_age = Duration::from_secs(180);
        assert!(UserData::default().is_stale(now, max_age));

        let fresh = UserData {
            fetched_at: Some(now - chrono::Duration::seconds(10)),
            ..UserData::default()
        };
        assert!(!fresh.is_stale(now, max_age));

        let old = UserData {
            fetched_at: Some(now - chrono::Duration::seconds(181)),
            ..UserData::default()
        };
        assert!(old.is_stale(now, max_age));
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_parts() {
        let cache = UserDataCache::new(offline_backend(), Duration::from_secs(180));
        let user = user(UserRole::User);
        cache
            .put(
                user.id,
                UserData {
                    notifications: vec![notification(1)],
                    fetched_at: None,
                    ..UserData::default()
                },
            )
            .await;

        let data = cache.get(Caller::new(user.id, "token")).await;
        assert_eq!(data.notifications.len(), 1);
        assert!(data.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_update_and_evict() {
        let cache = UserDataCache::new(offline_backend(), Duration::from_secs(180));
        let user = user(UserRole::User);
        cache
            .put(
                user.id,
                UserData {
                    fetched_at: Some(Utc::now()),
                    ..UserData::default()
                },
            )
            .await;

        cache
            .update(user.id, |data| data.notifications.push(notification(2)))
            .await;
        let data = cache.get(Caller::new(user.id, "token")).await;
        assert_eq!(data.notifications.len(), 1);

        cache.evict(user.id).await;
        let data = cache.get(Caller::new(user.id, "token")).await;
        assert!(data.notifications.is_empty());
    }
}
