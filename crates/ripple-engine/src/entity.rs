//! Typed entity managers behind a type-erased node interface.
//!
//! The engine holds every entity as a `Box<dyn EntityNode>` in dependency
//! order. The node interface is what the driver needs to run a tick; typed
//! access goes through a single downcast to [`EntityManager<K, S>`], whose
//! types were checked when the graph was assembled.
//!
//! Cross-entity references are `(sorted index, erased key)` pairs. While a
//! node runs it only sees the nodes sorted before it, which always include
//! all of its dependencies.

use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use ripple_core::context::UpdateContext;
use ripple_core::element::{Applied, ElementUnit};
use ripple_core::event::Event;
use ripple_core::key::{ElementKey, ElementState, EntityRef, ErasedKey};
use ripple_core::result::UpdateStatus;
use tracing::trace;

use crate::injector::EventInjector;
use crate::manager::{ElementManager, ElementUpdater, Toolbox, ToolboxOutput, UpstreamKey};
use crate::timer::Timer;

// ---------------------------------------------------------------------------
// Tick plumbing
// ---------------------------------------------------------------------------

/// Everything a node may touch while it is being driven.
pub(crate) struct TickScope<'a> {
    pub ctx: UpdateContext,
    /// Nodes sorted before the one being driven.
    pub upstream: &'a [Box<dyn EntityNode>],
    pub injector: &'a EventInjector,
    /// Timers requested during the phase. The driver moves them into the
    /// store afterwards.
    pub timers: &'a mut Vec<(DateTime<Utc>, Timer)>,
}

/// Counters from one node's update phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunStats {
    pub updates_invoked: usize,
    pub forced_not_ready: usize,
    pub evicted: usize,
}

impl std::ops::AddAssign for RunStats {
    fn add_assign(&mut self, other: Self) {
        self.updates_invoked += other.updates_invoked;
        self.forced_not_ready += other.forced_not_ready;
        self.evicted += other.evicted;
    }
}

/// Position of a node in the sorted graph and its resolved edges.
#[derive(Debug, Clone, Default)]
pub(crate) struct Wiring {
    pub index: usize,
    pub dependencies: Vec<usize>,
    pub dependents: Vec<usize>,
    pub channels: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// EntityNode
// ---------------------------------------------------------------------------

/// The narrow, type-erased surface of an entity.
pub(crate) trait EntityNode {
    fn name(&self) -> &'static str;

    fn entity_ref(&self) -> EntityRef;

    fn wiring(&self) -> &Wiring;

    /// Number of live elements.
    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    /// Keys materialized since the last update phase.
    fn created(&self) -> Vec<&dyn ErasedKey>;

    /// Status and last-touched tick of one element, if it exists.
    fn probe(&self, key: &dyn ErasedKey) -> Option<(UpdateStatus, u64)>;

    /// Deliver an event from a subscribed channel.
    fn process_event(&mut self, event: &Event, scope: &mut TickScope<'_>);

    /// Materialize and stain the keys implied by new upstream elements.
    fn propagate_creations(&mut self, scope: &mut TickScope<'_>);

    /// Stain one element. With `create`, a missing element is materialized
    /// first. Returns whether an element was stained.
    fn stain(&mut self, key: &dyn ErasedKey, create: bool, scope: &mut TickScope<'_>) -> bool;

    /// Update every element that needs it.
    fn run(&mut self, scope: &mut TickScope<'_>) -> RunStats;
}

// ---------------------------------------------------------------------------
// EntityManager
// ---------------------------------------------------------------------------

struct UpstreamRef {
    entity: usize,
    key: Box<dyn ErasedKey>,
}

struct Slot<K, S> {
    unit: ElementUnit<K, S>,
    updater: Box<dyn ElementUpdater<S>>,
    upstream: Vec<UpstreamRef>,
    events: Vec<Event>,
}

/// All elements of one entity, in key order.
pub(crate) struct EntityManager<K, S> {
    entity: EntityRef,
    manager: Box<dyn ElementManager<K, S>>,
    slots: BTreeMap<K, Slot<K, S>>,
    created: Vec<K>,
    wiring: Wiring,
}

impl<K: ElementKey, S: ElementState> EntityManager<K, S> {
    pub(crate) fn new(
        entity: EntityRef,
        manager: Box<dyn ElementManager<K, S>>,
        wiring: Wiring,
    ) -> Self {
        Self {
            entity,
            manager,
            slots: BTreeMap::new(),
            created: Vec::new(),
            wiring,
        }
    }

    pub(crate) fn element(&self, key: &K) -> Option<&ElementUnit<K, S>> {
        self.slots.get(key).map(|slot| &slot.unit)
    }

    pub(crate) fn elements(&self) -> impl Iterator<Item = &ElementUnit<K, S>> {
        self.slots.values().map(|slot| &slot.unit)
    }

    /// Get the slot for `key`, creating it if absent.
    fn materialize(&mut self, key: K, scope: &mut TickScope<'_>) -> &mut Slot<K, S> {
        match self.slots.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let mut toolbox = Toolbox::new(
                    scope.ctx,
                    scope.upstream,
                    &self.wiring.dependencies,
                    &[],
                    scope.injector,
                );
                let updater = self.manager.create(&key, &scope.ctx, &mut toolbox);
                queue_timers(self.wiring.index, &key, toolbox.finish(), scope.timers);
                trace!(entity = self.entity.name, key = ?key, "element created");
                self.created.push(key.clone());
                entry.insert(Slot {
                    unit: ElementUnit::new(key),
                    updater,
                    upstream: Vec::new(),
                    events: Vec::new(),
                })
            }
        }
    }
}

fn queue_timers<K: ElementKey>(
    entity: usize,
    key: &K,
    output: ToolboxOutput,
    timers: &mut Vec<(DateTime<Utc>, Timer)>,
) {
    for (time, callback) in output.scheduled {
        timers.push((time, Timer::Callback(callback)));
    }
    for time in output.wakeups {
        let key: Box<dyn ErasedKey> = Box::new(key.clone());
        timers.push((time, Timer::Wakeup { entity, key }));
    }
}

impl<K: ElementKey, S: ElementState> EntityNode for EntityManager<K, S> {
    fn name(&self) -> &'static str {
        self.entity.name
    }

    fn entity_ref(&self) -> EntityRef {
        self.entity
    }

    fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn created(&self) -> Vec<&dyn ErasedKey> {
        self.created.iter().map(|key| key as &dyn ErasedKey).collect()
    }

    fn probe(&self, key: &dyn ErasedKey) -> Option<(UpdateStatus, u64)> {
        let key = key.as_any().downcast_ref::<K>()?;
        self.slots
            .get(key)
            .map(|slot| (slot.unit.status(), slot.unit.touched_at()))
    }

    fn process_event(&mut self, event: &Event, scope: &mut TickScope<'_>) {
        let keys: BTreeSet<K> = self.manager.on_event(event).into_iter().collect();
        for key in keys {
            let slot = self.materialize(key, scope);
            slot.unit.stain();
            slot.events.push(event.clone());
        }
    }

    fn propagate_creations(&mut self, scope: &mut TickScope<'_>) {
        let upstream = scope.upstream;
        let mut pending: BTreeMap<K, Vec<(usize, &dyn ErasedKey)>> = BTreeMap::new();
        for &dependency in &self.wiring.dependencies {
            let node = &upstream[dependency];
            // The hook output is a set: one notification per relation.
            for key in node.created() {
                let own: BTreeSet<K> = self
                    .manager
                    .on_new_key(&UpstreamKey::new(node.name(), key))
                    .into_iter()
                    .collect();
                for own in own {
                    pending.entry(own).or_default().push((dependency, key));
                }
            }
        }

        for (key, sources) in pending {
            let slot = self.materialize(key, scope);
            for (dependency, key) in sources {
                let notice = UpstreamKey::new(upstream[dependency].name(), key);
                if slot.updater.on_new_element(&notice) {
                    slot.upstream.push(UpstreamRef {
                        entity: dependency,
                        key: key.clone_erased(),
                    });
                }
            }
            slot.unit.stain();
        }
    }

    fn stain(&mut self, key: &dyn ErasedKey, create: bool, scope: &mut TickScope<'_>) -> bool {
        let Some(key) = key.as_any().downcast_ref::<K>() else {
            return false;
        };
        if create {
            self.materialize(key.clone(), scope).unit.stain();
            return true;
        }
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.unit.stain();
                true
            }
            None => false,
        }
    }

    fn run(&mut self, scope: &mut TickScope<'_>) -> RunStats {
        let now = scope.ctx.update_id();
        let upstream = scope.upstream;
        let mut stats = RunStats::default();
        let mut evicted = Vec::new();

        for (key, slot) in self.slots.iter_mut() {
            let mut due = slot.unit.is_dirty();
            let mut blocked = false;
            slot.upstream
                .retain(|r| match upstream[r.entity].probe(&*r.key) {
                    Some((status, touched_at)) => {
                        due |= touched_at == now;
                        blocked |= !status.is_ready();
                        true
                    }
                    None => {
                        due = true;
                        false
                    }
                });
            if !due {
                continue;
            }

            if blocked {
                slot.unit.mark_not_ready(&scope.ctx);
                slot.events.clear();
                stats.forced_not_ready += 1;
                continue;
            }

            let mut toolbox = Toolbox::new(
                scope.ctx,
                upstream,
                &self.wiring.dependencies,
                &slot.events,
                scope.injector,
            );
            let result = slot
                .updater
                .update(slot.unit.state(), &scope.ctx, &mut toolbox);
            let output = toolbox.finish();
            stats.updates_invoked += 1;
            trace!(
                entity = self.entity.name,
                key = ?key,
                status = %result.status(),
                "element updated"
            );

            if slot.unit.apply(result, &scope.ctx) == Applied::Evict {
                evicted.push(key.clone());
            }
            queue_timers(self.wiring.index, key, output, scope.timers);
            slot.events.clear();
        }

        for key in evicted {
            self.slots.remove(&key);
            stats.evicted += 1;
        }
        self.created.clear();
        stats
    }
}

impl<K, S> fmt::Debug for EntityManager<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("name", &self.entity.name)
            .field("index", &self.wiring.index)
            .field("elements", &self.slots.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ripple_core::key::{EntityKey, EventChannel};
    use ripple_core::result::UpdateResult;
    use std::collections::HashMap;

    static TALLY: EntityKey<String, usize> = EntityKey::new("TALLY");
    static WORDS: EventChannel<String> = EventChannel::new("WORDS");

    struct Tally;

    struct TallyUpdater;

    impl ElementManager<String, usize> for Tally {
        fn create(
            &self,
            _key: &String,
            _ctx: &UpdateContext,
            _toolbox: &mut Toolbox<'_>,
        ) -> Box<dyn ElementUpdater<usize>> {
            Box::new(TallyUpdater)
        }

        fn on_event(&self, event: &Event) -> Vec<String> {
            event.value(&WORDS).cloned().into_iter().collect()
        }
    }

    impl ElementUpdater<usize> for TallyUpdater {
        fn update(
            &mut self,
            previous: Option<&usize>,
            _ctx: &UpdateContext,
            toolbox: &mut Toolbox<'_>,
        ) -> UpdateResult<usize> {
            match toolbox.events_on(&WORDS).count() {
                0 => UpdateResult::Nothing,
                n => UpdateResult::Updated(previous.copied().unwrap_or(0) + n),
            }
        }
    }

    fn manager() -> EntityManager<String, usize> {
        EntityManager::new(
            TALLY.erased(),
            Box::new(Tally),
            Wiring {
                channels: vec![WORDS.name()],
                ..Wiring::default()
            },
        )
    }

    fn ctx(id: u64) -> UpdateContext {
        UpdateContext::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), id)
    }

    #[test]
    fn events_materialize_once_and_are_cleared_after_run() {
        let mut node = manager();
        let injector = EventInjector::new(HashMap::new());
        let mut timers = Vec::new();
        let mut scope = TickScope {
            ctx: ctx(1),
            upstream: &[],
            injector: &injector,
            timers: &mut timers,
        };

        let hello = Event::new(&WORDS, "hello".to_owned());
        node.process_event(&hello, &mut scope);
        node.process_event(&hello, &mut scope);
        assert_eq!(node.len(), 1);
        assert_eq!(node.created().len(), 1);

        let stats = node.run(&mut scope);
        assert_eq!(stats.updates_invoked, 1);
        assert!(node.created().is_empty());
        assert_eq!(node.element(&"hello".to_owned()).and_then(|u| u.state()), Some(&2));

        // Nothing dirty: the next run is a no-op.
        let mut scope = TickScope {
            ctx: ctx(2),
            upstream: &[],
            injector: &injector,
            timers: &mut timers,
        };
        assert_eq!(node.run(&mut scope), RunStats::default());
    }

    #[test]
    fn stain_without_create_skips_missing_elements() {
        let mut node = manager();
        let injector = EventInjector::new(HashMap::new());
        let mut timers = Vec::new();
        let mut scope = TickScope {
            ctx: ctx(1),
            upstream: &[],
            injector: &injector,
            timers: &mut timers,
        };

        let missing = "ghost".to_owned();
        assert!(!node.stain(&missing, false, &mut scope));
        assert!(node.stain(&missing, true, &mut scope));
        assert_eq!(node.probe(&missing), Some((UpdateStatus::NotReady, 0)));
        assert!(!node.stain(&7u32, true, &mut scope), "foreign key types are ignored");
    }
}
