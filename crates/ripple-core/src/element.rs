//! Per-element record and its lifecycle.
//!
//! An [`ElementUnit`] is created empty (`NOT_READY`, no state), gets marked
//! dirty when something upstream asks for an update, and absorbs the
//! [`UpdateResult`] of every update call through [`ElementUnit::apply`].
//!
//! Two change markers are kept:
//!
//! - the last-change [`UpdateContext`], moved only by a new state. This is
//!   what staleness queries compare against.
//! - the id of the last tick in which state *or* status moved. Dependents
//!   use it to notice that an upstream element went into or out of error.

use crate::context::UpdateContext;
use crate::result::{UpdateResult, UpdateStatus};

// ---------------------------------------------------------------------------
// Applied
// ---------------------------------------------------------------------------

/// What [`ElementUnit::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new state was stored.
    Changed,
    /// Only the status moved.
    StatusChanged,
    /// Neither state nor status moved.
    Unchanged,
    /// The owner must evict the element.
    Evict,
}

// ---------------------------------------------------------------------------
// ElementUnit
// ---------------------------------------------------------------------------

/// One element: key, optional state, status, and change markers.
#[derive(Debug, Clone)]
pub struct ElementUnit<K, S> {
    key: K,
    state: Option<S>,
    status: UpdateStatus,
    last_change: UpdateContext,
    touched_at: u64,
    dirty: bool,
}

impl<K, S: PartialEq> ElementUnit<K, S> {
    /// A new, empty element. Its last-change context is the genesis context
    /// until it produces a state.
    pub fn new(key: K) -> Self {
        Self {
            key,
            state: None,
            status: UpdateStatus::NotReady,
            last_change: UpdateContext::genesis(),
            touched_at: 0,
            dirty: false,
        }
    }

    /// The element key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The committed state, if any.
    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    /// The status of the last update.
    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    /// Context of the tick that produced the current state.
    pub fn update_context(&self) -> &UpdateContext {
        &self.last_change
    }

    /// Id of the last tick in which state or status moved.
    pub fn touched_at(&self) -> u64 {
        self.touched_at
    }

    /// Whether the element asked for an update this tick.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Request an update during the current tick.
    pub fn stain(&mut self) {
        self.dirty = true;
    }

    /// Force `NOT_READY` without running user code.
    pub fn mark_not_ready(&mut self, ctx: &UpdateContext) -> Applied {
        self.dirty = false;
        self.set_status(UpdateStatus::NotReady, ctx)
    }

    /// Absorb the outcome of an update call.
    ///
    /// `Updated` with a value equal to the current state is treated as
    /// `Nothing`. `Nothing` reports `UPDATED` when a state is present and
    /// `NOT_READY` otherwise.
    pub fn apply(&mut self, result: UpdateResult<S>, ctx: &UpdateContext) -> Applied {
        self.dirty = false;
        match result {
            UpdateResult::Updated(next) => {
                if self.state.as_ref() == Some(&next) {
                    return self.settle(ctx);
                }
                self.state = Some(next);
                self.status = UpdateStatus::Updated;
                self.last_change = *ctx;
                self.touched_at = ctx.update_id();
                Applied::Changed
            }
            UpdateResult::Nothing => self.settle(ctx),
            UpdateResult::Deleted => Applied::Evict,
            UpdateResult::NotReady => self.set_status(UpdateStatus::NotReady, ctx),
            UpdateResult::Error => self.set_status(UpdateStatus::Error, ctx),
            UpdateResult::UpstreamError => self.set_status(UpdateStatus::UpstreamError, ctx),
        }
    }

    fn settle(&mut self, ctx: &UpdateContext) -> Applied {
        let status = if self.state.is_some() {
            UpdateStatus::Updated
        } else {
            UpdateStatus::NotReady
        };
        self.set_status(status, ctx)
    }

    fn set_status(&mut self, status: UpdateStatus, ctx: &UpdateContext) -> Applied {
        if self.status == status {
            return Applied::Unchanged;
        }
        self.status = status;
        self.touched_at = ctx.update_id();
        Applied::StatusChanged
    }
}
