//! User-facing capability traits and the per-call [`Toolbox`].
//!
//! An entity is defined by an [`ElementManager`]: it decides which keys exist
//! (from upstream creations and from events) and builds one
//! [`ElementUpdater`] per element. Hooks return plain key lists; the engine
//! does the materializing and staining.

use std::fmt;

use chrono::{DateTime, Utc};
use ripple_core::context::UpdateContext;
use ripple_core::element::ElementUnit;
use ripple_core::event::Event;
use ripple_core::key::{ElementKey, ElementState, EntityKey, ErasedKey, EventChannel};
use ripple_core::result::UpdateResult;

use crate::entity::{EntityManager, EntityNode};
use crate::error::EngineError;
use crate::injector::EventInjector;
use crate::timer::{TimerCallback, TimerScope};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Defines one entity: which elements exist and how each is computed.
pub trait ElementManager<K, S>: 'static {
    /// Build the updater for a newly materialized element.
    fn create(
        &self,
        key: &K,
        ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> Box<dyn ElementUpdater<S>>;

    /// Keys of this entity implied by a new element of a dependency.
    fn on_new_key(&self, upstream: &UpstreamKey<'_>) -> Vec<K> {
        let _ = upstream;
        Vec::new()
    }

    /// Keys of this entity affected by an event on a subscribed channel.
    fn on_event(&self, event: &Event) -> Vec<K> {
        let _ = event;
        Vec::new()
    }
}

/// Computes the state of one element.
pub trait ElementUpdater<S>: 'static {
    /// Produce the next state from the previous one.
    fn update(
        &mut self,
        previous: Option<&S>,
        ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<S>;

    /// Whether this element wants to follow a newly created upstream element.
    /// Followed elements gate readiness and trigger updates when they change.
    fn on_new_element(&mut self, upstream: &UpstreamKey<'_>) -> bool {
        let _ = upstream;
        true
    }
}

// ---------------------------------------------------------------------------
// UpstreamKey
// ---------------------------------------------------------------------------

/// A key of some upstream entity, with its type erased.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamKey<'a> {
    entity: &'static str,
    key: &'a dyn ErasedKey,
}

impl<'a> UpstreamKey<'a> {
    pub(crate) fn new(entity: &'static str, key: &'a dyn ErasedKey) -> Self {
        Self { entity, key }
    }

    /// Name of the entity the key belongs to.
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// The key, if it has type `K`.
    pub fn key<K: 'static>(&self) -> Option<&'a K> {
        self.key.as_any().downcast_ref::<K>()
    }

    /// Whether the key belongs to `entity`.
    pub fn is<K, S>(&self, entity: &EntityKey<K, S>) -> bool {
        self.entity == entity.name()
    }

    /// The key, if it belongs to `entity`.
    pub fn key_of<K: 'static, S>(&self, entity: &EntityKey<K, S>) -> Option<&'a K> {
        if self.is(entity) {
            self.key()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Toolbox
// ---------------------------------------------------------------------------

/// What `create` and `update` may see and do.
///
/// Reads are limited to the declared dependencies of the calling entity,
/// which are always settled for the current tick by the time it runs.
pub struct Toolbox<'a> {
    ctx: UpdateContext,
    upstream: &'a [Box<dyn EntityNode>],
    dependencies: &'a [usize],
    events: &'a [Event],
    injector: &'a EventInjector,
    scheduled: Vec<(DateTime<Utc>, TimerCallback)>,
    wakeups: Vec<DateTime<Utc>>,
}

/// Side effects requested through a [`Toolbox`], collected after the call.
pub(crate) struct ToolboxOutput {
    pub scheduled: Vec<(DateTime<Utc>, TimerCallback)>,
    pub wakeups: Vec<DateTime<Utc>>,
}

impl<'a> Toolbox<'a> {
    pub(crate) fn new(
        ctx: UpdateContext,
        upstream: &'a [Box<dyn EntityNode>],
        dependencies: &'a [usize],
        events: &'a [Event],
        injector: &'a EventInjector,
    ) -> Self {
        Self {
            ctx,
            upstream,
            dependencies,
            events,
            injector,
            scheduled: Vec::new(),
            wakeups: Vec::new(),
        }
    }

    /// Context of the tick being processed.
    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    /// Events delivered to this element in this tick, in injection order.
    pub fn events(&self) -> &'a [Event] {
        self.events
    }

    /// Payloads of this tick's events on one channel.
    pub fn events_on<E: 'static>(
        &self,
        channel: &EventChannel<E>,
    ) -> impl Iterator<Item = &'a E> + 'a {
        let channel = *channel;
        self.events.iter().filter_map(move |event| event.value(&channel))
    }

    /// State of an element of a declared dependency.
    pub fn state<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
        key: &K,
    ) -> Option<&'a S> {
        self.element(entity, key)?.state()
    }

    /// Full record of an element of a declared dependency.
    pub fn element<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
        key: &K,
    ) -> Option<&'a ElementUnit<K, S>> {
        let upstream: &'a [Box<dyn EntityNode>] = self.upstream;
        let node = self
            .dependencies
            .iter()
            .map(|&index| &upstream[index])
            .find(|node| node.name() == entity.name())?;
        node.as_any()
            .downcast_ref::<EntityManager<K, S>>()?
            .element(key)
    }

    /// Queue an event for the next event phase.
    pub fn inject<E: Send + Sync + 'static>(
        &self,
        channel: &EventChannel<E>,
        value: E,
    ) -> Result<(), EngineError> {
        self.injector.inject(channel, value)
    }

    /// Schedule a callback timer. It fires no earlier than the next tick.
    pub fn schedule(
        &mut self,
        time: DateTime<Utc>,
        callback: impl FnOnce(&mut TimerScope<'_>) -> anyhow::Result<()> + 'static,
    ) {
        let callback: TimerCallback = Box::new(callback);
        self.scheduled.push((time, callback));
    }

    /// Re-stain this element at `time`. Dropped if the element is evicted
    /// before then.
    pub fn wake_at(&mut self, time: DateTime<Utc>) {
        self.wakeups.push(time);
    }

    pub(crate) fn finish(self) -> ToolboxOutput {
        ToolboxOutput {
            scheduled: self.scheduled,
            wakeups: self.wakeups,
        }
    }
}

impl fmt::Debug for Toolbox<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolbox")
            .field("ctx", &self.ctx)
            .field("events", &self.events.len())
            .field("scheduled", &self.scheduled.len())
            .field("wakeups", &self.wakeups)
            .finish_non_exhaustive()
    }
}
