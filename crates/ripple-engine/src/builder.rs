//! Graph assembly.
//!
//! Registration only records descriptors; every consistency check runs in
//! [`EngineBuilder::build`], in this order:
//!
//! 1. duplicate channel names
//! 2. duplicate entity names
//! 3. unknown dependencies, then unknown channels (per entity, sorted)
//! 4. entities with no dependencies and no channels
//! 5. tokens whose types disagree with the registration they name
//! 6. simple entities depending on entities with another key type
//! 7. dependency cycles
//!
//! The first failure is returned. On success the entities are sorted so that
//! dependencies come first, with registration order breaking ties.

use std::collections::{HashMap, HashSet};

use ripple_core::key::{
    ChannelRef, ElementKey, ElementState, EntityKey, EntityRef, EventChannel,
};

use crate::adapters::{EventMirror, SimpleAdapter, SimpleElementManager};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::entity::{EntityManager, EntityNode, Wiring};
use crate::error::BuildError;
use crate::injector::EventInjector;
use crate::manager::ElementManager;

type NodeFactory = Box<dyn FnOnce(Wiring) -> Box<dyn EntityNode>>;

/// One registered entity, not yet wired.
struct Registration {
    entity: EntityRef,
    dependencies: Vec<EntityRef>,
    channels: Vec<ChannelRef>,
    simple: bool,
    factory: NodeFactory,
}

// ---------------------------------------------------------------------------
// EngineBuilder
// ---------------------------------------------------------------------------

/// Collects channels and entities, then assembles an [`Engine`].
///
/// ```
/// use ripple_engine::prelude::*;
///
/// static TEMPS: EventChannel<(String, f64)> = EventChannel::new("TEMPS");
/// static LATEST: EntityKey<String, f64> = EntityKey::new("LATEST");
///
/// let mut engine = EngineBuilder::new()
///     .channel(&TEMPS)
///     .event_to_entity(&TEMPS, &LATEST, |(room, _)| room.clone(), |(_, t)| *t)
///     .build()
///     .unwrap();
///
/// engine.inject_event(&TEMPS, ("kitchen".to_owned(), 21.5)).unwrap();
/// engine.run_once_now().unwrap();
/// assert_eq!(engine.state(&LATEST, &"kitchen".to_owned()).unwrap(), Some(&21.5));
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    channels: Vec<ChannelRef>,
    entities: Vec<Registration>,
}

impl EngineBuilder {
    /// An empty builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            channels: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an event channel.
    pub fn channel<E: Send + Sync + 'static>(mut self, channel: &EventChannel<E>) -> Self {
        self.channels.push(channel.erased());
        self
    }

    /// Register an entity.
    ///
    /// `dependencies` and `channels` are the erased forms of the tokens
    /// (`KEY.erased()`); they are checked against the registrations they
    /// name when the engine is built.
    pub fn entity<K: ElementKey, S: ElementState>(
        self,
        entity: &EntityKey<K, S>,
        manager: impl ElementManager<K, S>,
        dependencies: &[EntityRef],
        channels: &[ChannelRef],
    ) -> Self {
        self.register(entity, manager, dependencies, channels, false)
    }

    /// Register an entity whose elements follow the same keys in each of its
    /// dependencies. All dependencies must use the key type `K`.
    pub fn simple_entity<K: ElementKey, S: ElementState>(
        self,
        entity: &EntityKey<K, S>,
        manager: impl SimpleElementManager<K, S>,
        dependencies: &[EntityRef],
    ) -> Self {
        self.register(entity, SimpleAdapter::new(manager), dependencies, &[], true)
    }

    /// Register an entity that keeps, for every key, the state derived from
    /// the latest event on `channel`. The channel must be registered too.
    pub fn event_to_entity<E, K, S>(
        self,
        channel: &EventChannel<E>,
        entity: &EntityKey<K, S>,
        key_fn: impl Fn(&E) -> K + 'static,
        state_fn: impl Fn(&E) -> S + 'static,
    ) -> Self
    where
        E: Send + Sync + 'static,
        K: ElementKey,
        S: ElementState,
    {
        let mirror = EventMirror::new(*channel, key_fn, state_fn);
        self.register(entity, mirror, &[], &[channel.erased()], false)
    }

    /// Apply a registration function, for composing groups of entities.
    pub fn pipe(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    fn register<K: ElementKey, S: ElementState>(
        mut self,
        entity: &EntityKey<K, S>,
        manager: impl ElementManager<K, S>,
        dependencies: &[EntityRef],
        channels: &[ChannelRef],
        simple: bool,
    ) -> Self {
        let erased = entity.erased();
        let factory: NodeFactory = Box::new(move |wiring: Wiring| -> Box<dyn EntityNode> {
            Box::new(EntityManager::new(erased, Box::new(manager), wiring))
        });
        self.entities.push(Registration {
            entity: erased,
            dependencies: dependencies.to_vec(),
            channels: channels.to_vec(),
            simple,
            factory,
        });
        self
    }

    /// Validate the registrations and assemble the engine.
    pub fn build(self) -> Result<Engine, BuildError> {
        let Self {
            config,
            channels,
            entities,
        } = self;

        let mut channel_types: HashMap<&'static str, ChannelRef> = HashMap::new();
        for channel in &channels {
            if channel_types.insert(channel.name, *channel).is_some() {
                return Err(BuildError::DuplicateChannel(channel.name.to_owned()));
            }
        }

        let mut positions: HashMap<&'static str, usize> = HashMap::new();
        for (position, registration) in entities.iter().enumerate() {
            if positions.insert(registration.entity.name, position).is_some() {
                return Err(BuildError::DuplicateEntity(
                    registration.entity.name.to_owned(),
                ));
            }
        }

        for registration in &entities {
            let missing = sorted_unique(
                registration
                    .dependencies
                    .iter()
                    .map(|d| d.name)
                    .filter(|name| !positions.contains_key(name)),
            );
            if !missing.is_empty() {
                return Err(BuildError::MissingDependencies {
                    entity: registration.entity.name.to_owned(),
                    missing,
                });
            }
            let missing = sorted_unique(
                registration
                    .channels
                    .iter()
                    .map(|c| c.name)
                    .filter(|name| !channel_types.contains_key(name)),
            );
            if !missing.is_empty() {
                return Err(BuildError::MissingChannels {
                    entity: registration.entity.name.to_owned(),
                    missing,
                });
            }
        }

        if let Some(isolated) = entities
            .iter()
            .find(|r| r.dependencies.is_empty() && r.channels.is_empty())
        {
            return Err(BuildError::Isolated {
                entity: isolated.entity.name.to_owned(),
            });
        }

        // Positions are resolved from here on.
        let edges: Vec<Vec<usize>> = entities
            .iter()
            .map(|r| {
                let mut seen = HashSet::new();
                r.dependencies
                    .iter()
                    .filter_map(|d| positions.get(d.name).copied())
                    .filter(|position| seen.insert(*position))
                    .collect()
            })
            .collect();

        for registration in &entities {
            for reference in &registration.dependencies {
                let Some(&position) = positions.get(reference.name) else {
                    continue;
                };
                let registered = &entities[position].entity;
                if !registered.same_types(reference) {
                    return Err(BuildError::TypeMismatch {
                        entity: registration.entity.name.to_owned(),
                        reference: reference.name.to_owned(),
                        expected: registered.signature(),
                        found: reference.signature(),
                    });
                }
            }
            for reference in &registration.channels {
                if let Some(registered) = channel_types.get(reference.name) {
                    if registered.event_type != reference.event_type {
                        return Err(BuildError::TypeMismatch {
                            entity: registration.entity.name.to_owned(),
                            reference: reference.name.to_owned(),
                            expected: registered.event_type_name.to_owned(),
                            found: reference.event_type_name.to_owned(),
                        });
                    }
                }
            }
        }

        for registration in entities.iter().filter(|r| r.simple) {
            let entity = &registration.entity;
            if let Some(dependency) = registration
                .dependencies
                .iter()
                .find(|d| d.key_type != entity.key_type)
            {
                return Err(BuildError::KeyTypeMismatch {
                    entity: entity.name.to_owned(),
                    dependency: dependency.name.to_owned(),
                    expected: entity.key_type_name.to_owned(),
                    found: dependency.key_type_name.to_owned(),
                });
            }
        }

        let names: Vec<&'static str> = entities.iter().map(|r| r.entity.name).collect();
        let order = topological_order(&edges, &names)?;

        // Wire every node with sorted indices.
        let mut rank = vec![0; order.len()];
        for (index, &position) in order.iter().enumerate() {
            rank[position] = index;
        }
        let mut wirings: Vec<Wiring> = order
            .iter()
            .enumerate()
            .map(|(index, &position)| Wiring {
                index,
                dependencies: edges[position].iter().map(|&p| rank[p]).collect(),
                dependents: Vec::new(),
                channels: entities[position].channels.iter().map(|c| c.name).collect(),
            })
            .collect();
        for index in 0..wirings.len() {
            for dependency in wirings[index].dependencies.clone() {
                wirings[dependency].dependents.push(index);
            }
        }

        let mut subscribers: HashMap<&'static str, Vec<usize>> = HashMap::new();
        for wiring in &wirings {
            for &channel in &wiring.channels {
                let list = subscribers.entry(channel).or_default();
                if !list.contains(&wiring.index) {
                    list.push(wiring.index);
                }
            }
        }
        let subscribed = subscribers
            .keys()
            .filter_map(|name| channel_types.get(name).map(|c| (*name, *c)))
            .collect();

        let mut pending: Vec<Option<Registration>> = entities.into_iter().map(Some).collect();
        let mut nodes: Vec<Box<dyn EntityNode>> = Vec::with_capacity(order.len());
        for (wiring, &position) in wirings.into_iter().zip(&order) {
            if let Some(registration) = pending[position].take() {
                nodes.push((registration.factory)(wiring));
            }
        }

        tracing::info!(
            entities = nodes.len(),
            channels = channels.len(),
            "engine assembled"
        );
        tracing::debug!(
            order = ?nodes.iter().map(|n| n.name()).collect::<Vec<_>>(),
            "entity update order"
        );

        Ok(Engine::assemble(
            config,
            nodes,
            subscribers,
            EventInjector::new(subscribed),
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_unique<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = names.map(str::to_owned).collect();
    names.sort();
    names.dedup();
    names
}

/// Depth-first post-order over the dependency edges. Entities are visited in
/// registration order, so unrelated entities keep their relative order.
///
/// Uses a recursion stack to detect back edges; the stack slice from the
/// revisited entity is the reported cycle.
fn topological_order(
    edges: &[Vec<usize>],
    names: &[&'static str],
) -> Result<Vec<usize>, BuildError> {
    fn visit(
        position: usize,
        edges: &[Vec<usize>],
        names: &[&'static str],
        visited: &mut [bool],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), BuildError> {
        if let Some(start) = stack.iter().position(|&p| p == position) {
            let mut cycle: Vec<String> =
                stack[start..].iter().map(|&p| names[p].to_owned()).collect();
            cycle.push(names[position].to_owned());
            return Err(BuildError::DependencyCycle { cycle });
        }
        if visited[position] {
            return Ok(());
        }
        stack.push(position);
        for &dependency in &edges[position] {
            visit(dependency, edges, names, visited, stack, order)?;
        }
        stack.pop();
        visited[position] = true;
        order.push(position);
        Ok(())
    }

    let mut visited = vec![false; edges.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(edges.len());
    for position in 0..edges.len() {
        visit(position, edges, names, &mut visited, &mut stack, &mut order)?;
    }
    Ok(order)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_puts_dependencies_first() {
        // 0 depends on 2, 1 has no edges, 2 depends on 1.
        let edges = vec![vec![2], vec![], vec![1]];
        let order = topological_order(&edges, &["a", "b", "c"]).unwrap();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn independent_entities_keep_registration_order() {
        let edges = vec![vec![], vec![], vec![]];
        let order = topological_order(&edges, &["a", "b", "c"]).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_reports_path() {
        let edges = vec![vec![1], vec![2], vec![0]];
        let err = topological_order(&edges, &["a", "b", "c"]).unwrap_err();
        assert_eq!(
            err,
            BuildError::DependencyCycle {
                cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = topological_order(&[vec![0]], &["solo"]).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle: solo -> solo");
    }

    #[test]
    fn sorted_unique_dedups() {
        let names = ["b", "a", "b"];
        assert_eq!(sorted_unique(names.into_iter()), vec!["a", "b"]);
    }
}
