use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::notification::OrderNotification;

struct InboxQueue {
    entries: VecDeque<OrderNotification>,
    expires_at: Instant,
}

/// Per-driver mailbox of pending order notifications.
///
/// The whole queue shares a single TTL, refreshed on every push. A
/// driver that does not poll within the TTL loses the batch; expired
/// queues are dropped lazily on the next access. Most-recent-first
/// ordering, since clients drain the full queue per poll.
pub struct DriverInboxes {
    queues: DashMap<Uuid, InboxQueue>,
    ttl: Duration,
}

impl DriverInboxes {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            ttl,
        }
    }

    pub fn push(&self, driver_id: Uuid, notification: OrderNotification) {
        let now = Instant::now();
        let mut queue = self.queues.entry(driver_id).or_insert_with(|| InboxQueue {
            entries: VecDeque::new(),
            expires_at: now + self.ttl,
        });

        if queue.expires_at <= now {
            queue.entries.clear();
        }

        queue.entries.push_front(notification);
        queue.expires_at = now + self.ttl;
    }

    /// Atomically removes and returns every pending notification for the
    /// driver. An absent or expired queue yields an empty list.
    pub fn drain(&self, driver_id: &Uuid) -> Vec<OrderNotification> {
        match self.queues.remove(driver_id) {
            Some((_, queue)) if queue.expires_at > Instant::now() => queue.entries.into(),
            _ => Vec::new(),
        }
    }

    /// Drops all pending notifications, stale batches included. Called
    /// when a driver ends or restarts their online session.
    pub fn clear(&self, driver_id: &Uuid) {
        self.queues.remove(driver_id);
    }
}
