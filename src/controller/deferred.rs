//! Tick-driven deferred event queue.
//!
//! The runtime has no finer delayed-execution primitive available to the
//! control loop than its own periodic tick, so "run this in N seconds" is
//! emulated: events carry a due time and every tick drains the ones that
//! have come due. Delays are honoured at tick granularity only; callers
//! size retry and settle delays accordingly.

use chrono::{DateTime, Duration, Utc};

/// Handle for cancelling a scheduled event before it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: DeferredId,
    due_at: DateTime<Utc>,
    event: T,
}

/// Unordered collection of pending deferred events.
///
/// `drain_due` returns due events in the order they were scheduled; no
/// other ordering is guaranteed beyond "fires at or after `due_at`".
#[derive(Debug)]
pub struct DeferredQueue<T> {
    entries: Vec<Entry<T>>,
    next_id: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `event` to fire once `delay` has elapsed from `now`
    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration, event: T) -> DeferredId {
        let id = DeferredId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            due_at: now + delay,
            event,
        });
        id
    }

    /// Remove a pending event; returns false if it already fired or was
    /// cancelled
    pub fn cancel(&mut self, id: DeferredId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drop every pending event
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return all events due at `now`, in scheduling order
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let mut due = Vec::new();
        let mut remaining = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.due_at <= now {
                due.push(entry.event);
            } else {
                remaining.push(entry);
            }
        }
        self.entries = remaining;
        due
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-01-15T22:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_fires_at_or_after_due_time() {
        let mut queue = DeferredQueue::new();
        let now = t0();
        queue.schedule(now, Duration::seconds(120), "a");

        assert!(queue.drain_due(now + Duration::seconds(60)).is_empty());
        assert_eq!(queue.drain_due(now + Duration::seconds(120)), vec!["a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drains_in_scheduling_order() {
        let mut queue = DeferredQueue::new();
        let now = t0();
        // Scheduled order, not due-time order, decides firing order
        // within a single drain.
        queue.schedule(now, Duration::seconds(90), "first");
        queue.schedule(now, Duration::seconds(30), "second");
        queue.schedule(now, Duration::seconds(600), "later");

        let due = queue.drain_due(now + Duration::seconds(120));
        assert_eq!(due, vec!["first", "second"]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancel_before_fire() {
        let mut queue = DeferredQueue::new();
        let now = t0();
        let a = queue.schedule(now, Duration::seconds(10), "a");
        let b = queue.schedule(now, Duration::seconds(10), "b");

        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        let due = queue.drain_due(now + Duration::seconds(10));
        assert_eq!(due, vec!["b"]);
        assert!(!queue.cancel(b));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut queue = DeferredQueue::new();
        let now = t0();
        queue.schedule(now, Duration::seconds(10), "a");
        queue.schedule(now, Duration::seconds(20), "b");
        queue.clear();
        assert!(queue.drain_due(now + Duration::hours(1)).is_empty());
    }
}
