use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::domain::prelude::*;

/// Per-tenant live channels.
///
/// Every tenant gets its own broadcast channel, created when the first
/// observer joins. Publishing always targets exactly one tenant; there is
/// no operation addressing every tenant.
///
/// Delivery is best-effort: `publish` never waits, receivers that fall
/// behind lose the oldest events, and nothing is replayed to late joiners.
///
#[derive(Clone, Debug)]
pub struct Rooms {
    channels: Arc<DashMap<TenantId, broadcast::Sender<LiveUpdate>>>,
    capacity: usize,
}

impl Rooms {
    /// The buffer size is per tenant and bounds how far a slow observer can
    /// lag before it starts missing events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Joins the tenant's channel. The receiver only ever sees events
    /// published to `tenant_id`.
    pub fn join(&self, tenant_id: &TenantId) -> broadcast::Receiver<LiveUpdate> {
        self.channels
            .entry(tenant_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes to the tenant's channel and returns how many observers it
    /// reached. Zero observers is not an error.
    pub fn publish(&self, tenant_id: &TenantId, update: LiveUpdate) -> usize {
        let sent = match self.channels.get(tenant_id) {
            Some(tx) => tx.send(update),
            None => return 0,
        };

        match sent {
            Ok(observers) => observers,
            Err(_) => {
                // everyone left, drop the room
                self.channels
                    .remove_if(tenant_id, |_, tx| tx.receiver_count() == 0);
                tracing::trace!(room = %tenant_id.room_key(), "no observers");
                0
            }
        }
    }

    pub fn observers(&self, tenant_id: &TenantId) -> usize {
        self.channels
            .get(tenant_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::broadcast::error::TryRecvError;
    use uuid::Uuid;

    fn update(plate: &str) -> LiveUpdate {
        LiveUpdate {
            vehicle_id: Uuid::new_v4(),
            plate: plate.to_string(),
            latitude: Some(-19.9),
            longitude: Some(-43.9),
            speed: Some(60.0),
            fuel_level: Some(50.0),
            current_km: 1000,
            engine_status: true,
            is_deviated: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn tenants_are_isolated() {
        let rooms = Rooms::new(16);
        let (a, b): (TenantId, TenantId) = ("org-a".into(), "org-b".into());
        let mut rx_a = rooms.join(&a);
        let mut rx_b = rooms.join(&b);

        assert_eq!(rooms.publish(&a, update("A-1")), 1);
        assert_eq!(rooms.publish(&b, update("B-1")), 1);

        assert_eq!(rx_a.try_recv().unwrap().plate, "A-1");
        assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(rx_b.try_recv().unwrap().plate, "B-1");
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn publish_without_observers_is_a_no_op() {
        let rooms = Rooms::new(16);
        let tenant: TenantId = "org1".into();
        assert_eq!(rooms.publish(&tenant, update("X")), 0);

        let rx = rooms.join(&tenant);
        drop(rx);
        assert_eq!(rooms.publish(&tenant, update("X")), 0);
        assert_eq!(rooms.observers(&tenant), 0);
    }

    #[test]
    fn no_replay_for_late_joiners() {
        let rooms = Rooms::new(16);
        let tenant: TenantId = "org1".into();
        let _early = rooms.join(&tenant);
        rooms.publish(&tenant, update("before"));

        let mut late = rooms.join(&tenant);
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
        rooms.publish(&tenant, update("after"));
        assert_eq!(late.try_recv().unwrap().plate, "after");
    }

    #[test]
    fn slow_observers_lose_oldest_events() {
        let rooms = Rooms::new(2);
        let tenant: TenantId = "org1".into();
        let mut rx = rooms.join(&tenant);
        for plate in ["1", "2", "3"] {
            rooms.publish(&tenant, update(plate));
        }

        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(rx.try_recv().unwrap().plate, "2");
    }
}
