//! Simulated live order tracking.
//!
//! A started simulation advances the order one status per tick until it is
//! delivered, appending a tracking event and notifying the owner at each
//! step. Simulated progress is held here and mirrored into the owner's
//! cached orders; it is never written to the `orders` table.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tokio::sync::RwLock;
use tracing::instrument;

use naxstore_core::{NotificationType, Order, OrderPublicId, OrderStatus, UserId};

use crate::backend::BackendClient;
use crate::backend::conversions::tracking_event;
use crate::services::user_data::UserDataCache;
use crate::services::{Caller, notifications};

/// Finished simulations are forgotten after this long without a lookup.
const IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

const SHIPPED_LOCATION: &str = "Transit Hub, AZ";
const LOCAL_LOCATION: &str = "Local Hub, CA";

/// Location reported when an order reaches `status`.
#[must_use]
pub const fn location_for(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Shipped => SHIPPED_LOCATION,
        _ => LOCAL_LOCATION,
    }
}

/// Move `order` one tracking step forward at `now`.
///
/// Returns the new status, or `None` if the order is delivered or cancelled.
pub fn advance(order: &mut Order, now: DateTime<Utc>) -> Option<OrderStatus> {
    let next = order.status.next_tracking_step()?;
    order.status = next;
    order
        .tracking_history
        .push(tracking_event(next.label(), location_for(next), now));
    Some(next)
}

/// Notification text for an order reaching `status`.
#[must_use]
pub fn step_message(order_id: OrderPublicId, status: OrderStatus) -> String {
    format!("Your order {}... is now {status}.", order_id.short())
}

struct Simulation {
    owner: UserId,
    order: RwLock<Order>,
}

/// Running and recently finished tracking simulations, by order.
#[derive(Clone)]
pub struct TrackingSimulator {
    inner: Arc<TrackingInner>,
}

struct TrackingInner {
    backend: BackendClient,
    user_data: UserDataCache,
    tick: Duration,
    simulations: Cache<OrderPublicId, Arc<Simulation>>,
}

impl TrackingSimulator {
    #[must_use]
    pub fn new(backend: BackendClient, user_data: UserDataCache, tick: Duration) -> Self {
        Self {
            inner: Arc::new(TrackingInner {
                backend,
                user_data,
                tick,
                simulations: Cache::builder()
                    .max_capacity(10_000)
                    .time_to_idle(IDLE_EVICTION)
                    .build(),
            }),
        }
    }

    /// Current simulated state of `order_id`, if the owner has one.
    pub async fn get(&self, owner: UserId, order_id: OrderPublicId) -> Option<Order> {
        let simulation = self.inner.simulations.get(&order_id).await?;
        if simulation.owner != owner {
            return None;
        }
        let order = simulation.order.read().await;
        Some(order.clone())
    }

    /// Start simulating `order` for `caller`.
    ///
    /// Starting a simulation that already exists returns its current state
    /// without restarting it.
    #[instrument(skip(self, caller, order), fields(user_id = %caller.user_id, order_id = %order.id))]
    pub async fn start(&self, caller: Caller<'_>, order: Order) -> Order {
        let order_id = order.id;
        let owner = caller.user_id;
        let entry = self
            .inner
            .simulations
            .entry(order_id)
            .or_insert_with(async move {
                Arc::new(Simulation {
                    owner,
                    order: RwLock::new(order),
                })
            })
            .await;
        let fresh = entry.is_fresh();
        let simulation = entry.into_value();

        if simulation.owner != owner {
            tracing::warn!("Order is already tracked for another user");
        } else if fresh {
            tracing::info!(tick_ms = self.inner.tick.as_millis(), "Tracking simulation started");
            tokio::spawn(run(
                Arc::clone(&self.inner),
                Arc::clone(&simulation),
                caller.token.to_string(),
            ));
        }

        let order = simulation.order.read().await;
        order.clone()
    }
}

async fn run(inner: Arc<TrackingInner>, simulation: Arc<Simulation>, token: String) {
    let caller = Caller::new(simulation.owner, &token);
    loop {
        tokio::time::sleep(inner.tick).await;

        let (status, snapshot) = {
            let mut order = simulation.order.write().await;
            let Some(status) = advance(&mut order, Utc::now()) else {
                break;
            };
            (status, order.clone())
        };
        tracing::info!(order_id = %snapshot.id, %status, "Simulated tracking step");

        inner
            .user_data
            .update(caller.user_id, |data| {
                if let Some(cached) = data.orders.iter_mut().find(|o| o.id == snapshot.id) {
                    cached.status = snapshot.status;
                    cached.tracking_history.clone_from(&snapshot.tracking_history);
                }
            })
            .await;

        let metadata = serde_json::json!({ "view": "tracking", "orderId": snapshot.id });
        match notifications::add(
            &inner.backend,
            Some(caller),
            &step_message(snapshot.id, status),
            NotificationType::Order,
            Some(&metadata),
        )
        .await
        {
            Ok(Some(notification)) => {
                inner
                    .user_data
                    .update(caller.user_id, |data| data.notifications.insert(0, notification))
                    .await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to store tracking notification"),
        }
    }
    tracing::debug!("Tracking simulation finished");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::offline_backend;
    use naxstore_core::{OrderId, ShippingAddress};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderPublicId::new(Uuid::from_u128(0x1a2b_3c4d_0000_4000_8000_0000_0000_0000)),
            internal_id: OrderId::new(41),
            date: Utc::now(),
            status,
            total: Decimal::from(118),
            items: vec![],
            tracking_history: vec![],
            shipping_address: ShippingAddress::default(),
        }
    }

    fn simulator(tick: Duration) -> TrackingSimulator {
        let backend = offline_backend();
        let user_data = UserDataCache::new(backend.clone(), Duration::from_secs(180));
        TrackingSimulator::new(backend, user_data, tick)
    }

    #[test]
    fn test_advance_walks_to_delivered() {
        let mut o = order(OrderStatus::Processing);
        let now = Utc::now();

        assert_eq!(advance(&mut o, now), Some(OrderStatus::Shipped));
        assert_eq!(advance(&mut o, now), Some(OrderStatus::Delivered));
        assert_eq!(advance(&mut o, now), None);

        assert_eq!(o.status, OrderStatus::Delivered);
        assert_eq!(o.tracking_history.len(), 2);
        assert_eq!(o.tracking_history[0].status, "Shipped");
        assert_eq!(o.tracking_history[0].location, "Transit Hub, AZ");
        assert_eq!(o.tracking_history[1].status, "Delivered");
        assert_eq!(o.tracking_history[1].location, "Local Hub, CA");
    }

    #[test]
    fn test_pending_payment_moves_to_processing() {
        let mut o = order(OrderStatus::PendingPayment);
        assert_eq!(advance(&mut o, Utc::now()), Some(OrderStatus::Processing));
        assert_eq!(o.tracking_history[0].status, "Processing");
    }

    #[test]
    fn test_terminal_orders_do_not_advance() {
        for status in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            let mut o = order(status);
            assert_eq!(advance(&mut o, Utc::now()), None);
            assert!(o.tracking_history.is_empty());
        }
    }

    #[test]
    fn test_step_message() {
        let o = order(OrderStatus::Processing);
        assert_eq!(
            step_message(o.id, OrderStatus::Shipped),
            "Your order 1a2b3c4d... is now shipped."
        );
    }

    #[tokio::test]
    async fn test_start_twice_returns_running_simulation() {
        let sim = simulator(Duration::from_secs(3600));
        let owner = UserId::new(Uuid::from_u128(7));
        let caller = Caller::new(owner, "token");

        let mut o = order(OrderStatus::Processing);
        let first = sim.start(caller, o.clone()).await;
        o.status = OrderStatus::Delivered;
        let second = sim.start(caller, o).await;

        assert_eq!(first.status, OrderStatus::Processing);
        assert_eq!(second.status, OrderStatus::Processing);
        assert!(sim.get(owner, first.id).await.is_some());
        assert!(
            sim.get(UserId::new(Uuid::from_u128(8)), first.id)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_simulation_reaches_delivered() {
        let sim = simulator(Duration::from_millis(5));
        let owner = UserId::new(Uuid::from_u128(7));
        let o = sim
            .start(Caller::new(owner, "token"), order(OrderStatus::Processing))
            .await;

        let mut status = o.status;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = sim.get(owner, o.id).await.unwrap().status;
            if status == OrderStatus::Delivered {
                break;
            }
        }
        assert_eq!(status, OrderStatus::Delivered);
        assert_eq!(sim.get(owner, o.id).await.unwrap().tracking_history.len(), 2);
    }
}
