use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::dedup::DispatchDedup;
use crate::engine::dispatch::DispatchHandle;
use crate::engine::inbox::DriverInboxes;
use crate::engine::lock::OrderLocks;
use crate::geo::DriverGeoIndex;
use crate::lifecycle::OrderStore;
use crate::models::driver::Driver;
use crate::models::order::AcceptanceEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub orders: OrderStore,
    pub drivers: DashMap<Uuid, Driver>,
    pub geo: DriverGeoIndex,
    pub inboxes: DriverInboxes,
    pub dedup: DispatchDedup,
    pub locks: OrderLocks,
    pub dispatch_tasks: DashMap<Uuid, DispatchHandle>,
    pub acceptance_events_tx: broadcast::Sender<AcceptanceEvent>,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (acceptance_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            orders: OrderStore::new(config.accept_window),
            drivers: DashMap::new(),
            geo: DriverGeoIndex::new(),
            inboxes: DriverInboxes::new(config.inbox_ttl),
            dedup: DispatchDedup::new(config.accept_window),
            locks: OrderLocks::new(),
            dispatch_tasks: DashMap::new(),
            acceptance_events_tx,
            metrics: Metrics::new(),
            config,
        }
    }
}
