//! Tick stamps.
//!
//! Every tick is identified by an [`UpdateContext`]: the wall time the caller
//! supplied and an update id that increases by exactly one per tick. Elements
//! remember the context of their last change, so "what changed since X" is a
//! single integer comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UpdateContext
// ---------------------------------------------------------------------------

/// Immutable stamp of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateContext {
    time: DateTime<Utc>,
    update_id: u64,
}

impl UpdateContext {
    /// Build a context directly. The engine only ever creates them through
    /// [`EngineContext::advance`].
    pub fn new(time: DateTime<Utc>, update_id: u64) -> Self {
        Self { time, update_id }
    }

    /// The context that exists before any tick: id 0 at the earliest
    /// representable time.
    pub fn genesis() -> Self {
        Self::new(DateTime::<Utc>::MIN_UTC, 0)
    }

    /// Wall time of the tick.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Monotonic tick id.
    pub fn update_id(&self) -> u64 {
        self.update_id
    }

    /// Whether this context is strictly newer than `other`.
    pub fn is_after(&self, other: &UpdateContext) -> bool {
        self.update_id > other.update_id
    }
}

// ---------------------------------------------------------------------------
// EngineContext
// ---------------------------------------------------------------------------

/// Holder of the latest [`UpdateContext`].
///
/// The driver advances it once at the start of every tick; everything that
/// runs during the tick reads the same value.
#[derive(Debug, Clone)]
pub struct EngineContext {
    latest: UpdateContext,
}

impl EngineContext {
    /// Start from id 0 at `start_time`.
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            latest: UpdateContext::new(start_time, 0),
        }
    }

    /// The context of the most recent tick (or the starting context).
    pub fn latest(&self) -> UpdateContext {
        self.latest
    }

    /// Stamp a new tick: id + 1 at `time`. The caller checks monotonicity.
    pub fn advance(&mut self, time: DateTime<Utc>) -> UpdateContext {
        self.latest = UpdateContext::new(time, self.latest.update_id + 1);
        self.latest
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn advance_increments_by_one() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut ctx = EngineContext::new(start);
        assert_eq!(ctx.latest().update_id(), 0);

        let first = ctx.advance(start);
        let second = ctx.advance(start + chrono::Duration::seconds(1));
        assert_eq!(first.update_id(), 1);
        assert_eq!(second.update_id(), 2);
        assert!(second.is_after(&first));
        assert!(!first.is_after(&first));
        assert_eq!(ctx.latest(), second);
    }

    #[test]
    fn genesis_is_id_zero() {
        let genesis = UpdateContext::genesis();
        assert_eq!(genesis.update_id(), 0);
        assert_eq!(EngineContext::default().latest(), genesis);
    }

    #[test]
    fn context_serializes() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ctx = UpdateContext::new(start, 42);
        let json = serde_json::to_string(&ctx).unwrap();
        let back: UpdateContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
