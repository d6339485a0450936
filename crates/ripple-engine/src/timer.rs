//! Timer actions and the scope handed to timer callbacks.

use std::fmt;

use chrono::{DateTime, Utc};
use ripple_core::context::UpdateContext;
use ripple_core::key::{ElementKey, EntityKey, EntityRef, ErasedKey, EventChannel};

use crate::error::EngineError;
use crate::injector::EventInjector;

/// A user timer callback. Errors abort the tick.
pub type TimerCallback = Box<dyn FnOnce(&mut TimerScope<'_>) -> anyhow::Result<()>>;

/// What a timer does when it fires.
pub(crate) enum Timer {
    /// Re-stain one element of the entity at this sorted index.
    Wakeup {
        entity: usize,
        key: Box<dyn ErasedKey>,
    },
    /// Run a user callback.
    Callback(TimerCallback),
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timer::Wakeup { entity, key } => f
                .debug_struct("Wakeup")
                .field("entity", entity)
                .field("key", key)
                .finish(),
            Timer::Callback(_) => f.write_str("Callback"),
        }
    }
}

// ---------------------------------------------------------------------------
// TimerScope
// ---------------------------------------------------------------------------

/// What a timer callback may do during the timer phase.
///
/// Stained elements are materialized if absent and updated in this tick.
/// Timers scheduled here become eligible from the next tick, even when their
/// due time has already passed.
pub struct TimerScope<'a> {
    ctx: UpdateContext,
    injector: &'a EventInjector,
    stains: Vec<(EntityRef, Box<dyn ErasedKey>)>,
    scheduled: Vec<(DateTime<Utc>, TimerCallback)>,
}

impl<'a> TimerScope<'a> {
    pub(crate) fn new(ctx: UpdateContext, injector: &'a EventInjector) -> Self {
        Self {
            ctx,
            injector,
            stains: Vec::new(),
            scheduled: Vec::new(),
        }
    }

    /// Context of the tick being processed.
    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    /// Queue an event. It is dispatched in this tick's event phase.
    pub fn inject<E: Send + Sync + 'static>(
        &self,
        channel: &EventChannel<E>,
        value: E,
    ) -> Result<(), EngineError> {
        self.injector.inject(channel, value)
    }

    /// Mark an element for update in this tick, creating it if needed.
    pub fn stain<K: ElementKey, S: 'static>(&mut self, entity: &EntityKey<K, S>, key: K) {
        let key: Box<dyn ErasedKey> = Box::new(key);
        self.stains.push((entity.erased(), key));
    }

    /// Schedule another callback.
    pub fn schedule(
        &mut self,
        time: DateTime<Utc>,
        callback: impl FnOnce(&mut TimerScope<'_>) -> anyhow::Result<()> + 'static,
    ) {
        let callback: TimerCallback = Box::new(callback);
        self.scheduled.push((time, callback));
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<(EntityRef, Box<dyn ErasedKey>)>,
        Vec<(DateTime<Utc>, TimerCallback)>,
    ) {
        (self.stains, self.scheduled)
    }
}

impl fmt::Debug for TimerScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerScope")
            .field("ctx", &self.ctx)
            .field("stains", &self.stains.len())
            .field("scheduled", &self.scheduled.len())
            .finish()
    }
}
