use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

struct DedupEntry {
    notified: HashSet<Uuid>,
    expires_at: Instant,
}

/// Per-order record of drivers already notified, bounding fan-out to at
/// most one push per (order, driver) pair while the order's acceptance
/// window is open. The window starts at the first mark and is not
/// extended by later marks.
pub struct DispatchDedup {
    entries: DashMap<Uuid, DedupEntry>,
    ttl: Duration,
}

impl DispatchDedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn contains(&self, order_id: &Uuid, driver_id: &Uuid) -> bool {
        self.entries.get(order_id).is_some_and(|entry| {
            entry.expires_at > Instant::now() && entry.notified.contains(driver_id)
        })
    }

    /// Returns true if the driver was not yet recorded for this order.
    pub fn mark(&self, order_id: Uuid, driver_id: Uuid) -> bool {
        let now = Instant::now();
        let mut entry = self.entries.entry(order_id).or_insert_with(|| DedupEntry {
            notified: HashSet::new(),
            expires_at: now + self.ttl,
        });

        if entry.expires_at <= now {
            entry.notified.clear();
            entry.expires_at = now + self.ttl;
        }

        entry.notified.insert(driver_id)
    }
}
