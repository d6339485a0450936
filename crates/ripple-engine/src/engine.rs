//! The tick driver.
//!
//! [`Engine::run_once`] advances the whole graph by one atomic tick:
//!
//! 1. The context advances (update id + 1, caller-supplied time).
//! 2. Timers due at or before the tick time fire, earliest first.
//! 3. Events queued before this phase began are dispatched to every
//!    subscriber, in injection order.
//! 4. Each entity, in dependency order, materializes and stains the elements
//!    implied by new elements of its dependencies.
//! 5. Each entity, in dependency order, updates its dirty elements and those
//!    whose followed upstream elements changed.
//!
//! Events and timers produced during the tick are picked up by the next one.
//!
//! # Example
//!
//! ```
//! use ripple_engine::prelude::*;
//!
//! static WORDS: EventChannel<String> = EventChannel::new("WORDS");
//! static LAST_WORD: EntityKey<(), String> = EntityKey::new("LAST_WORD");
//!
//! let mut engine = EngineBuilder::new()
//!     .channel(&WORDS)
//!     .event_to_entity(&WORDS, &LAST_WORD, |_| (), |word| word.clone())
//!     .build()
//!     .unwrap();
//!
//! engine.inject_event(&WORDS, "hello".to_owned()).unwrap();
//! let ctx = engine.run_once_now().unwrap();
//!
//! assert_eq!(ctx.update_id(), 1);
//! assert_eq!(engine.state(&LAST_WORD, &()).unwrap().map(String::as_str), Some("hello"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ripple_core::context::{EngineContext, UpdateContext};
use ripple_core::element::ElementUnit;
use ripple_core::key::{ElementKey, ElementState, EntityKey, EventChannel};
use ripple_core::timer::TimerStore;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::entity::{EntityManager, EntityNode, RunStats, TickScope};
use crate::error::EngineError;
use crate::injector::EventInjector;
use crate::timer::{Timer, TimerCallback, TimerScope};

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Counters and timings for the last tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickDiagnostics {
    /// Update id of the tick.
    pub update_id: u64,
    /// Timers fired in the timer phase.
    pub timers_fired: usize,
    /// Events taken from the queue in the event phase.
    pub events_dispatched: usize,
    /// Elements materialized during the tick.
    pub elements_created: usize,
    /// Calls into user `update` code.
    pub updates_invoked: usize,
    /// Elements forced to `NOT_READY` because a followed upstream element was.
    pub forced_not_ready: usize,
    /// Elements evicted after returning `Deleted`.
    pub evicted: usize,
    /// Time spent in the timer phase.
    pub timer_time: Duration,
    /// Time spent dispatching events.
    pub event_time: Duration,
    /// Time spent propagating creations.
    pub creation_time: Duration,
    /// Time spent in the update phase.
    pub update_time: Duration,
    /// Wall-clock time of the whole tick.
    pub total_time: Duration,
    /// Update-phase time per entity, in update order. Only filled when
    /// [`EngineConfig::entity_timings`] is set.
    pub entity_times: Vec<(String, Duration)>,
}

// ---------------------------------------------------------------------------
// EntityTopology
// ---------------------------------------------------------------------------

/// Wiring of one entity, as assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTopology {
    /// Entity name.
    pub name: String,
    /// Type name of the element keys.
    pub key_type: String,
    /// Type name of the element states.
    pub state_type: String,
    /// Dependencies, in declaration order.
    pub dependencies: Vec<String>,
    /// Entities that depend on this one, in update order.
    pub dependents: Vec<String>,
    /// Subscribed event channels.
    pub channels: Vec<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// An assembled dependency graph and its tick driver.
///
/// Built by [`EngineBuilder`](crate::builder::EngineBuilder). Single-threaded:
/// events can be queued from anywhere through an [`EventInjector`], but ticks
/// and queries happen on the owning thread.
pub struct Engine {
    config: EngineConfig,
    context: EngineContext,
    /// Entities in dependency order.
    nodes: Vec<Box<dyn EntityNode>>,
    index: HashMap<&'static str, usize>,
    /// Channel name to subscriber indices, ascending.
    subscribers: HashMap<&'static str, Vec<usize>>,
    timers: TimerStore<Timer>,
    injector: EventInjector,
    last_diagnostics: TickDiagnostics,
}

impl Engine {
    pub(crate) fn assemble(
        config: EngineConfig,
        nodes: Vec<Box<dyn EntityNode>>,
        subscribers: HashMap<&'static str, Vec<usize>>,
        injector: EventInjector,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name(), i))
            .collect();
        Self {
            context: EngineContext::new(config.start_time),
            config,
            nodes,
            index,
            subscribers,
            timers: TimerStore::new(),
            injector,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    // -- ticking ------------------------------------------------------------

    /// Run one tick at `time`.
    ///
    /// Fails without side effects if `time` is earlier than the previous
    /// tick. A failing timer callback aborts the tick after the context has
    /// advanced; timers it did not reach stay queued, and
    /// [`last_diagnostics`](Self::last_diagnostics) describes the failed tick
    /// up to the timer phase.
    pub fn run_once(&mut self, time: DateTime<Utc>) -> Result<UpdateContext, EngineError> {
        let previous = self.context.latest().time();
        if time < previous {
            return Err(EngineError::NonMonotonicTime {
                previous,
                requested: time,
            });
        }

        let tick_start = Instant::now();
        let ctx = self.context.advance(time);
        let span = tracing::debug_span!("tick", update_id = ctx.update_id());
        let _enter = span.enter();

        let mut diagnostics = TickDiagnostics {
            update_id: ctx.update_id(),
            ..TickDiagnostics::default()
        };
        let mut scheduled = Vec::new();

        // Phase 1: timers.
        let phase_start = Instant::now();
        let fired = self.fire_timers(ctx, &mut scheduled);
        self.queue_timers(&mut scheduled);
        diagnostics.timer_time = phase_start.elapsed();
        match fired {
            Ok(count) => diagnostics.timers_fired = count,
            Err(err) => {
                // The failed tick is still the latest one.
                diagnostics.total_time = tick_start.elapsed();
                self.last_diagnostics = diagnostics;
                return Err(err);
            }
        }

        // Phase 2: events.
        let phase_start = Instant::now();
        let events = self.injector.drain();
        diagnostics.events_dispatched = events.len();
        for event in &events {
            let Some(subscribers) = self.subscribers.get(event.channel()) else {
                continue;
            };
            for &index in subscribers {
                let (upstream, rest) = self.nodes.split_at_mut(index);
                let mut scope = TickScope {
                    ctx,
                    upstream,
                    injector: &self.injector,
                    timers: &mut scheduled,
                };
                rest[0].process_event(event, &mut scope);
            }
        }
        diagnostics.event_time = phase_start.elapsed();

        // Phase 3: creation propagation.
        let phase_start = Instant::now();
        for index in 0..self.nodes.len() {
            let (upstream, rest) = self.nodes.split_at_mut(index);
            let mut scope = TickScope {
                ctx,
                upstream,
                injector: &self.injector,
                timers: &mut scheduled,
            };
            rest[0].propagate_creations(&mut scope);
        }
        diagnostics.elements_created = self.nodes.iter().map(|n| n.created().len()).sum();
        diagnostics.creation_time = phase_start.elapsed();

        // Phase 4: updates.
        let phase_start = Instant::now();
        let mut stats = RunStats::default();
        for index in 0..self.nodes.len() {
            let entity_start = Instant::now();
            let (upstream, rest) = self.nodes.split_at_mut(index);
            let node = &mut rest[0];
            let mut scope = TickScope {
                ctx,
                upstream,
                injector: &self.injector,
                timers: &mut scheduled,
            };
            stats += node.run(&mut scope);
            if self.config.entity_timings {
                diagnostics
                    .entity_times
                    .push((node.name().to_owned(), entity_start.elapsed()));
            }
        }
        diagnostics.updates_invoked = stats.updates_invoked;
        diagnostics.forced_not_ready = stats.forced_not_ready;
        diagnostics.evicted = stats.evicted;
        diagnostics.update_time = phase_start.elapsed();

        self.queue_timers(&mut scheduled);
        diagnostics.total_time = tick_start.elapsed();

        tracing::debug!(
            timers = diagnostics.timers_fired,
            events = diagnostics.events_dispatched,
            created = diagnostics.elements_created,
            updated = diagnostics.updates_invoked,
            evicted = diagnostics.evicted,
            "tick complete"
        );
        if let Some(limit) = self.config.slow_tick_warn_ms {
            if diagnostics.total_time > Duration::from_millis(limit) {
                tracing::warn!(
                    update_id = ctx.update_id(),
                    elapsed_ms = diagnostics.total_time.as_millis() as u64,
                    limit_ms = limit,
                    "slow tick"
                );
            }
        }

        self.last_diagnostics = diagnostics;
        Ok(ctx)
    }

    /// Run one tick at the current wall-clock time.
    pub fn run_once_now(&mut self) -> Result<UpdateContext, EngineError> {
        self.run_once(Utc::now())
    }

    fn fire_timers(
        &mut self,
        ctx: UpdateContext,
        scheduled: &mut Vec<(DateTime<Utc>, Timer)>,
    ) -> Result<usize, EngineError> {
        let Self {
            nodes,
            index,
            timers,
            injector,
            ..
        } = self;
        let injector: &EventInjector = injector;
        let index: &HashMap<&'static str, usize> = index;

        timers.notify_next(ctx.time(), |due, timer| match timer {
            Timer::Wakeup { entity, key } => {
                let (upstream, rest) = nodes.split_at_mut(entity);
                let mut scope = TickScope {
                    ctx,
                    upstream,
                    injector,
                    timers: &mut *scheduled,
                };
                if !rest[0].stain(&*key, false, &mut scope) {
                    tracing::warn!(
                        entity = rest[0].name(),
                        key = ?key,
                        "wake-up dropped, element no longer exists"
                    );
                }
                Ok(())
            }
            Timer::Callback(callback) => {
                let mut timer_scope = TimerScope::new(ctx, injector);
                callback(&mut timer_scope).map_err(|source| EngineError::Timer {
                    due,
                    source: source.into(),
                })?;
                let (stains, more) = timer_scope.into_parts();
                scheduled.extend(
                    more.into_iter()
                        .map(|(time, callback)| (time, Timer::Callback(callback))),
                );
                for (entity, key) in stains {
                    let position = *index
                        .get(entity.name)
                        .ok_or_else(|| EngineError::UnknownEntity(entity.name.to_owned()))?;
                    let (upstream, rest) = nodes.split_at_mut(position);
                    let node = &mut rest[0];
                    if !node.entity_ref().same_types(&entity) {
                        return Err(EngineError::EntityTypeMismatch {
                            entity: entity.name.to_owned(),
                            found: entity.signature(),
                        });
                    }
                    let mut scope = TickScope {
                        ctx,
                        upstream,
                        injector,
                        timers: &mut *scheduled,
                    };
                    node.stain(&*key, true, &mut scope);
                }
                Ok(())
            }
        })
    }

    fn queue_timers(&mut self, scheduled: &mut Vec<(DateTime<Utc>, Timer)>) {
        for (time, timer) in scheduled.drain(..) {
            self.timers.schedule(time, timer);
        }
    }

    // -- mutation -----------------------------------------------------------

    /// Queue an event for the next tick's event phase.
    pub fn inject_event<E: Send + Sync + 'static>(
        &self,
        channel: &EventChannel<E>,
        value: E,
    ) -> Result<(), EngineError> {
        self.injector.inject(channel, value)
    }

    /// A cloneable, thread-safe handle to the event queue.
    pub fn injector(&self) -> EventInjector {
        self.injector.clone()
    }

    /// Schedule a callback to run in the timer phase of the first tick whose
    /// time is at or after `time`.
    pub fn schedule(
        &mut self,
        time: DateTime<Utc>,
        callback: impl FnOnce(&mut TimerScope<'_>) -> anyhow::Result<()> + 'static,
    ) {
        let callback: TimerCallback = Box::new(callback);
        self.timers.schedule(time, Timer::Callback(callback));
    }

    // -- queries ------------------------------------------------------------

    fn manager<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
    ) -> Result<&EntityManager<K, S>, EngineError> {
        let index = *self
            .index
            .get(entity.name())
            .ok_or_else(|| EngineError::UnknownEntity(entity.name().to_owned()))?;
        self.nodes[index]
            .as_any()
            .downcast_ref::<EntityManager<K, S>>()
            .ok_or_else(|| EngineError::EntityTypeMismatch {
                entity: entity.name().to_owned(),
                found: entity.erased().signature(),
            })
    }

    /// The full record of one element.
    pub fn element<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
        key: &K,
    ) -> Result<Option<&ElementUnit<K, S>>, EngineError> {
        Ok(self.manager(entity)?.element(key))
    }

    /// The committed state of one element.
    pub fn state<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
        key: &K,
    ) -> Result<Option<&S>, EngineError> {
        Ok(self.element(entity, key)?.and_then(ElementUnit::state))
    }

    /// Elements whose state changed after `since`, in key order. Empty when
    /// `since` is the latest context or newer.
    pub fn updated_since<K: ElementKey, S: ElementState>(
        &self,
        entity: &EntityKey<K, S>,
        since: &UpdateContext,
    ) -> Result<Vec<&ElementUnit<K, S>>, EngineError> {
        Ok(self
            .manager(entity)?
            .elements()
            .filter(|unit| unit.update_context().is_after(since))
            .collect())
    }

    /// Context of the most recent tick.
    pub fn latest_context(&self) -> UpdateContext {
        self.context.latest()
    }

    /// Due time of the earliest pending timer.
    pub fn next_timer(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    /// Entity names in update order.
    pub fn entity_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|node| node.name()).collect()
    }

    /// Number of live elements of an entity.
    pub fn element_count(&self, entity: &str) -> Result<usize, EngineError> {
        self.index
            .get(entity)
            .map(|&index| self.nodes[index].len())
            .ok_or_else(|| EngineError::UnknownEntity(entity.to_owned()))
    }

    /// Wiring of every entity, in update order.
    pub fn topology(&self) -> Vec<EntityTopology> {
        let name = |index: &usize| self.nodes[*index].name().to_owned();
        self.nodes
            .iter()
            .map(|node| {
                let entity = node.entity_ref();
                let wiring = node.wiring();
                EntityTopology {
                    name: entity.name.to_owned(),
                    key_type: entity.key_type_name.to_owned(),
                    state_type: entity.state_type_name.to_owned(),
                    dependencies: wiring.dependencies.iter().map(name).collect(),
                    dependents: wiring.dependents.iter().map(name).collect(),
                    channels: wiring.channels.iter().map(|c| (*c).to_owned()).collect(),
                }
            })
            .collect()
    }

    /// Counters and timings of the last completed tick.
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entities: Vec<(&str, usize)> = self
            .nodes
            .iter()
            .map(|node| (node.name(), node.len()))
            .collect();
        f.debug_struct("Engine")
            .field("latest", &self.context.latest())
            .field("entities", &entities)
            .field("timers", &self.timers.len())
            .field("pending_events", &self.injector.pending())
            .finish()
    }
}
