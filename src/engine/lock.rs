use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(25);

struct Lease {
    token: Uuid,
    expires_at: Instant,
}

/// Per-order mutual exclusion with a bounded acquire wait and a bounded
/// hold. Each acquisition takes a lease; a holder that never releases
/// (crashed mid-acceptance) is stolen from once the lease expires.
pub struct OrderLocks {
    leases: DashMap<Uuid, Lease>,
}

/// Releases the lease on drop. A lease that already expired and was
/// stolen belongs to the new holder and is left alone.
pub struct OrderLockGuard<'a> {
    locks: &'a OrderLocks,
    order_id: Uuid,
    token: Uuid,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
        }
    }

    /// Tries to take the order's lease for `lease_time`, polling until
    /// `wait` runs out. `None` means the wait was exhausted.
    pub async fn acquire(
        &self,
        order_id: Uuid,
        wait: Duration,
        lease_time: Duration,
    ) -> Option<OrderLockGuard<'_>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(token) = self.try_acquire(order_id, lease_time) {
                return Some(OrderLockGuard {
                    locks: self,
                    order_id,
                    token,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            sleep(ACQUIRE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn try_acquire(&self, order_id: Uuid, lease_time: Duration) -> Option<Uuid> {
        let now = Instant::now();
        let token = Uuid::new_v4();
        let lease = Lease {
            token,
            expires_at: now + lease_time,
        };

        match self.leases.entry(order_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(lease);
                    Some(token)
                } else {
                    None
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Some(token)
            }
        }
    }

    fn release(&self, order_id: &Uuid, token: &Uuid) {
        self.leases
            .remove_if(order_id, |_, lease| lease.token == *token);
    }
}

impl Default for OrderLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OrderLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.order_id, &self.token);
    }
}
