//! Ready-made managers for common entity shapes.
//!
//! - [`SimpleElementManager`]: every dependency shares the entity's key type,
//!   and element `k` follows element `k` of each dependency.
//! - event mirrors (registered with
//!   [`EngineBuilder::event_to_entity`](crate::builder::EngineBuilder::event_to_entity)):
//!   one element per event key, holding the state derived from the latest
//!   event for that key.

use std::rc::Rc;

use ripple_core::context::UpdateContext;
use ripple_core::event::Event;
use ripple_core::key::{ElementKey, EventChannel};
use ripple_core::result::UpdateResult;

use crate::manager::{ElementManager, ElementUpdater, Toolbox, UpstreamKey};

// ---------------------------------------------------------------------------
// Simple entities
// ---------------------------------------------------------------------------

/// An entity whose elements mirror the keys of its dependencies.
///
/// Only the per-element computation has to be written; key discovery is
/// handled by the adapter.
pub trait SimpleElementManager<K, S>: 'static {
    /// Compute element `key` from its previous state and the dependencies.
    fn update(
        &self,
        key: &K,
        previous: Option<&S>,
        ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<S>;
}

pub(crate) struct SimpleAdapter<M> {
    inner: Rc<M>,
}

impl<M> SimpleAdapter<M> {
    pub(crate) fn new(inner: M) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }
}

struct SimpleUpdater<K, M> {
    key: K,
    inner: Rc<M>,
}

impl<K, S, M> ElementManager<K, S> for SimpleAdapter<M>
where
    K: ElementKey,
    S: 'static,
    M: SimpleElementManager<K, S>,
{
    fn create(
        &self,
        key: &K,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> Box<dyn ElementUpdater<S>> {
        Box::new(SimpleUpdater {
            key: key.clone(),
            inner: Rc::clone(&self.inner),
        })
    }

    fn on_new_key(&self, upstream: &UpstreamKey<'_>) -> Vec<K> {
        upstream.key::<K>().cloned().into_iter().collect()
    }
}

impl<K, S, M> ElementUpdater<S> for SimpleUpdater<K, M>
where
    K: ElementKey,
    S: 'static,
    M: SimpleElementManager<K, S>,
{
    fn update(
        &mut self,
        previous: Option<&S>,
        ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<S> {
        self.inner.update(&self.key, previous, ctx, toolbox)
    }
}

// ---------------------------------------------------------------------------
// Event mirrors
// ---------------------------------------------------------------------------

pub(crate) struct EventMirror<E, K, S> {
    channel: EventChannel<E>,
    key_fn: Box<dyn Fn(&E) -> K>,
    state_fn: Rc<dyn Fn(&E) -> S>,
}

impl<E, K, S> EventMirror<E, K, S> {
    pub(crate) fn new(
        channel: EventChannel<E>,
        key_fn: impl Fn(&E) -> K + 'static,
        state_fn: impl Fn(&E) -> S + 'static,
    ) -> Self {
        Self {
            channel,
            key_fn: Box::new(key_fn),
            state_fn: Rc::new(state_fn),
        }
    }
}

struct MirrorUpdater<E, S> {
    channel: EventChannel<E>,
    state_fn: Rc<dyn Fn(&E) -> S>,
}

impl<E, K, S> ElementManager<K, S> for EventMirror<E, K, S>
where
    E: 'static,
    K: ElementKey,
    S: PartialEq + 'static,
{
    fn create(
        &self,
        _key: &K,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> Box<dyn ElementUpdater<S>> {
        Box::new(MirrorUpdater {
            channel: self.channel,
            state_fn: Rc::clone(&self.state_fn),
        })
    }

    fn on_event(&self, event: &Event) -> Vec<K> {
        event
            .value(&self.channel)
            .map(|value| (self.key_fn)(value))
            .into_iter()
            .collect()
    }
}

impl<E, S> ElementUpdater<S> for MirrorUpdater<E, S>
where
    E: 'static,
    S: PartialEq + 'static,
{
    fn update(
        &mut self,
        previous: Option<&S>,
        _ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<S> {
        match toolbox.events_on(&self.channel).last() {
            Some(latest) => UpdateResult::maybe(previous, (self.state_fn)(latest)),
            None => UpdateResult::Nothing,
        }
    }
}
