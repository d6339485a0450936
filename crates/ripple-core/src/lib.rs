//! Ripple Core -- building blocks of the Ripple update engine.
//!
//! This crate holds the data types the engine is made of, without the engine
//! itself: typed identity tokens for entities and channels, transient events,
//! tick stamps, update outcomes, the per-element lifecycle record, and the
//! timer store that the driver flushes every tick.
//!
//! # Quick Start
//!
//! ```
//! use ripple_core::prelude::*;
//!
//! static COUNTER: EntityKey<String, i64> = EntityKey::new("COUNTER");
//!
//! let mut ctx = EngineContext::default();
//! let tick = ctx.advance(chrono::Utc::now());
//!
//! let mut unit: ElementUnit<String, i64> = ElementUnit::new("apples".to_owned());
//! unit.stain();
//! let outcome = UpdateResult::maybe(unit.state(), 3);
//! unit.apply(outcome, &tick);
//!
//! assert_eq!(unit.state(), Some(&3));
//! assert_eq!(unit.update_context().update_id(), 1);
//! assert_eq!(COUNTER.erased().name, "COUNTER");
//! ```

#![deny(unsafe_code)]

pub mod context;
pub mod element;
pub mod event;
pub mod key;
pub mod result;
pub mod timer;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::context::{EngineContext, UpdateContext};
    pub use crate::element::{Applied, ElementUnit};
    pub use crate::event::Event;
    pub use crate::key::{
        ChannelRef, ElementKey, ElementState, EntityKey, EntityRef, ErasedKey, EventChannel,
    };
    pub use crate::result::{UpdateResult, UpdateStatus};
    pub use crate::timer::TimerStore;
}
