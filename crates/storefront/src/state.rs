//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::backend::{AuthClient, BackendClient};
use crate::config::StorefrontConfig;
use crate::services::catalog::CatalogService;
use crate::services::marketing::BannerCache;
use crate::services::refresh::Heartbeat;
use crate::services::shopper::ShopperClient;
use crate::services::tracking::TrackingSimulator;
use crate::services::user_data::UserDataCache;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like backend clients, caches, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    backend: BackendClient,
    auth: AuthClient,
    catalog: CatalogService,
    user_data: UserDataCache,
    tracking: TrackingSimulator,
    shopper: Option<ShopperClient>,
    banners: BannerCache,
    heartbeat: Heartbeat,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` pool backing the session store
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let backend = BackendClient::new(&config.backend);
        let auth = AuthClient::new(&config.backend);
        let catalog = CatalogService::new(backend.clone());
        let user_data = UserDataCache::new(backend.clone(), config.timers.catalog_refresh);
        let tracking = TrackingSimulator::new(
            backend.clone(),
            user_data.clone(),
            config.timers.tracking_tick,
        );
        let shopper = config.gemini.as_ref().map(ShopperClient::new);
        if shopper.is_none() {
            tracing::info!("GEMINI_API_KEY not set; personal shopper disabled");
        }
        let banners = BannerCache::new(backend.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                backend,
                auth,
                catalog,
                user_data,
                tracking,
                shopper,
                banners,
                heartbeat: Heartbeat::default(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Pool backing the session store.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn user_data(&self) -> &UserDataCache {
        &self.inner.user_data
    }

    #[must_use]
    pub fn tracking(&self) -> &TrackingSimulator {
        &self.inner.tracking
    }

    /// Personal shopper client, if a model API key is configured.
    #[must_use]
    pub fn shopper(&self) -> Option<&ShopperClient> {
        self.inner.shopper.as_ref()
    }

    #[must_use]
    pub fn banners(&self) -> &BannerCache {
        &self.inner.banners
    }

    #[must_use]
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.inner.heartbeat
    }

    /// Start the catalog refresh and heartbeat timers.
    pub fn start_background_tasks(&self) {
        let timers = &self.inner.config.timers;
        crate::services::refresh::spawn_catalog_refresh(
            self.inner.catalog.clone(),
            timers.catalog_refresh,
        );
        crate::services::refresh::spawn_heartbeat(
            self.inner.heartbeat.clone(),
            self.inner.backend.clone(),
            timers.heartbeat,
        );
        tracing::info!(
            catalog_refresh_secs = timers.catalog_refresh.as_secs(),
            heartbeat_secs = timers.heartbeat.as_secs(),
            "Background tasks started"
        );
    }
}
