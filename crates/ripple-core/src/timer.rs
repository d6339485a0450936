//! Time-ordered store of one-shot timers.
//!
//! Items are keyed by `(due time, insertion sequence)`, so timers with the
//! same due time fire in the order they were scheduled. Resolution is
//! whatever granularity the caller ticks at: a timer fires during the first
//! flush whose `now` is at or after its due time.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// One-shot timers, flushed by the driver once per tick.
pub struct TimerStore<T> {
    queue: BTreeMap<(DateTime<Utc>, u64), T>,
    next_seq: u64,
}

impl<T> TimerStore<T> {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Register `item` to fire no earlier than `due`.
    pub fn schedule(&mut self, due: DateTime<Utc>, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((due, seq), item);
    }

    /// Due time of the earliest pending timer.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Remove and return the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, T)> {
        let (&(due, _), _) = self.queue.first_key_value()?;
        if due > now {
            return None;
        }
        self.queue.pop_first().map(|((due, _), item)| (due, item))
    }

    /// Fire every timer due at `now`, earliest first, each exactly once.
    ///
    /// Stops at the first error from `fire`; the failing timer is consumed,
    /// later ones stay queued. Returns the number of timers fired.
    pub fn notify_next<E>(
        &mut self,
        now: DateTime<Utc>,
        mut fire: impl FnMut(DateTime<Utc>, T) -> Result<(), E>,
    ) -> Result<usize, E> {
        let mut fired = 0;
        while let Some((due, item)) = self.pop_due(now) {
            fired += 1;
            fire(due, item)?;
        }
        Ok(fired)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for TimerStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TimerStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerStore")
            .field("pending", &self.queue.len())
            .field("next_due", &self.next_due())
            .finish()
    }
}
