//! Background timers: catalog refresh and backend heartbeat.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::BackendClient;
use crate::services::catalog::CatalogService;

/// Last known backend connectivity.
#[derive(Clone, Default)]
pub struct Heartbeat {
    reachable: Arc<AtomicBool>,
}

impl Heartbeat {
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Record a probe result. Returns `true` if connectivity changed.
    pub fn record(&self, reachable: bool) -> bool {
        self.reachable.swap(reachable, Ordering::AcqRel) != reachable
    }

    /// Probe the backend once and log any change.
    pub async fn beat(&self, backend: &BackendClient) {
        let result = backend.ping().await;
        let reachable = result.is_ok();
        if self.record(reachable) {
            match result {
                Ok(()) => tracing::info!("Backend reachable"),
                Err(e) => tracing::warn!(error = %e, "Backend unreachable"),
            }
        }
    }
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Refresh the catalog every `period`. The first refresh runs immediately.
pub fn spawn_catalog_refresh(catalog: CatalogService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(period);
        loop {
            ticks.tick().await;
            if let Err(e) = catalog.refresh().await {
                tracing::warn!(error = %e, "Catalog refresh failed; keeping previous snapshot");
            }
        }
    })
}

/// Probe the backend every `period`.
pub fn spawn_heartbeat(
    heartbeat: Heartbeat,
    backend: BackendClient,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval(period);
        loop {
            ticks.tick().await;
            heartbeat.beat(&backend).await;
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::offline_backend;

    #[test]
    fn test_record_reports_transitions() {
        let heartbeat = Heartbeat::default();
        assert!(!heartbeat.is_reachable());
        assert!(heartbeat.record(true));
        assert!(!heartbeat.record(true));
        assert!(heartbeat.is_reachable());
        assert!(heartbeat.record(false));
    }

    #[tokio::test]
    async fn test_beat_marks_offline_backend_unreachable() {
        let heartbeat = Heartbeat::default();
        heartbeat.record(true);
        heartbeat.beat(&offline_backend()).await;
        assert!(!heartbeat.is_reachable());
    }
}
