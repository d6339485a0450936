//! Ripple Engine -- dependency-graph update engine with atomic ticks.
//!
//! This crate builds on [`ripple_core`] to provide the runtime: entities
//! (keyed families of elements) are registered with an [`EngineBuilder`],
//! checked and sorted into a dependency graph, and advanced by an [`Engine`]
//! one tick at a time. Each tick fires due timers, dispatches queued events,
//! propagates newly created elements to dependents, and finally updates every
//! element that needs it, dependencies first.
//!
//! [`EngineBuilder`]: builder::EngineBuilder
//! [`Engine`]: engine::Engine
//!
//! # Quick Start
//!
//! ```
//! use ripple_engine::prelude::*;
//!
//! static WORDS: EventChannel<String> = EventChannel::new("WORDS");
//! static COUNTS: EntityKey<String, u64> = EntityKey::new("COUNTS");
//!
//! struct WordCounter;
//!
//! struct Count;
//!
//! impl ElementManager<String, u64> for WordCounter {
//!     fn create(&self, _: &String, _: &UpdateContext, _: &mut Toolbox<'_>) -> Box<dyn ElementUpdater<u64>> {
//!         Box::new(Count)
//!     }
//!
//!     fn on_event(&self, event: &Event) -> Vec<String> {
//!         event.value(&WORDS).cloned().into_iter().collect()
//!     }
//! }
//!
//! impl ElementUpdater<u64> for Count {
//!     fn update(&mut self, previous: Option<&u64>, _: &UpdateContext, toolbox: &mut Toolbox<'_>) -> UpdateResult<u64> {
//!         let seen = toolbox.events_on(&WORDS).count() as u64;
//!         UpdateResult::maybe(previous, previous.copied().unwrap_or(0) + seen)
//!     }
//! }
//!
//! let mut engine = EngineBuilder::new()
//!     .channel(&WORDS)
//!     .entity(&COUNTS, WordCounter, &[], &[WORDS.erased()])
//!     .build()
//!     .unwrap();
//!
//! for word in ["to", "be", "or", "not", "to", "be"] {
//!     engine.inject_event(&WORDS, word.to_owned()).unwrap();
//! }
//! engine.run_once_now().unwrap();
//!
//! assert_eq!(engine.state(&COUNTS, &"to".to_owned()).unwrap(), Some(&2));
//! assert_eq!(engine.element_count("COUNTS").unwrap(), 4);
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod builder;
pub mod config;
pub mod engine;
mod entity;
pub mod error;
pub mod injector;
pub mod manager;
pub mod timer;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use ripple_core;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the core prelude.
    pub use ripple_core::prelude::*;

    // Engine-specific exports.
    pub use crate::adapters::SimpleElementManager;
    pub use crate::builder::EngineBuilder;
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::engine::{Engine, EntityTopology, TickDiagnostics};
    pub use crate::error::{BuildError, EngineError};
    pub use crate::injector::EventInjector;
    pub use crate::manager::{ElementManager, ElementUpdater, Toolbox, UpstreamKey};
    pub use crate::timer::{TimerCallback, TimerScope};
}
