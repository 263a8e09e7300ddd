//! Task timer service.
//!
//! A min-heap of `(due, work item)` entries. Entries are validated lazily
//! against case state when they pop: an entry whose item has moved on (new
//! due time, terminal state) is stale and the engine announces the discard
//! instead of acting on it. That keeps scheduling cheap — re-arming a
//! timer never has to find and remove the old entry.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use mizzen_core::WorkItemId;
use parking_lot::Mutex;

/// One scheduled expiry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerEntry {
    /// When the timer is due.
    pub due: DateTime<Utc>,
    /// The item it belongs to.
    pub item: WorkItemId,
}

/// The shared timer heap.
#[derive(Debug, Default)]
pub struct TimerService {
    heap: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
}

impl TimerService {
    /// An empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an expiry. Duplicates are fine; stale pops are filtered by
    /// the engine against the item's current `timer_due`.
    pub fn schedule(&self, item: WorkItemId, due: DateTime<Utc>) {
        self.heap.lock().push(Reverse(TimerEntry { due, item }));
    }

    /// Pop every entry due at or before `now`, in due order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TimerEntry> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.due > now {
                break;
            }
            if let Some(Reverse(entry)) = heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// The next due instant, if any timer is pending.
    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.heap.lock().peek().map(|Reverse(entry)| entry.due)
    }

    /// Number of pending entries (including stale ones).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.heap.lock().len()
    }
}
