//! Promotional banner.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use naxstore_core::Banner;

use crate::backend::conversions::banner_from_row;
use crate::backend::rows::BannerRow;
use crate::backend::{BackendClient, BackendError, Bearer, Query};

const BANNER_TTL: Duration = Duration::from_secs(300);

/// The active banner, cached for five minutes.
///
/// Row-level security on `banners` only exposes active rows, so the first
/// row returned is the one to show.
#[derive(Clone)]
pub struct BannerCache {
    inner: Arc<BannerCacheInner>,
}

struct BannerCacheInner {
    backend: BackendClient,
    cache: Cache<(), Option<Banner>>,
}

impl BannerCache {
    #[must_use]
    pub fn new(backend: BackendClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(BANNER_TTL)
            .build();
        Self {
            inner: Arc::new(BannerCacheInner { backend, cache }),
        }
    }

    /// The active banner, if any.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on a cache miss whose fetch fails. Failures
    /// are not cached.
    pub async fn active(&self) -> Result<Option<Banner>, BackendError> {
        if let Some(cached) = self.inner.cache.get(&()).await {
            return Ok(cached);
        }

        let rows: Vec<BannerRow> = self
            .inner
            .backend
            .select(&Query::table("banners").select("*").limit(1), Bearer::Anon)
            .await?;
        let banner = rows.into_iter().next().map(banner_from_row);
        self.inner.cache.insert((), banner.clone()).await;
        Ok(banner)
    }
}
