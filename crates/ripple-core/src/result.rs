//! Outcome of one element update.
//!
//! An updater returns an [`UpdateResult`]; the element keeps the matching
//! [`UpdateStatus`] so that dependents can see it. Only `Updated` carries a
//! payload.
//!
//! ```
//! use ripple_core::result::{UpdateResult, UpdateStatus};
//!
//! let previous = 3;
//! assert_eq!(UpdateResult::maybe(Some(&previous), 3).status(), UpdateStatus::Nothing);
//! assert_eq!(UpdateResult::maybe(Some(&previous), 4), UpdateResult::Updated(4));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UpdateStatus
// ---------------------------------------------------------------------------

/// Tag of an [`UpdateResult`], and the status an element reports.
///
/// Elements never report `Nothing` or `Deleted`: the first leaves the
/// previous status in place, the second removes the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// A new state was produced.
    Updated,
    /// Nothing changed.
    Nothing,
    /// The element should be evicted.
    Deleted,
    /// The element cannot be computed yet.
    NotReady,
    /// The element failed to compute.
    Error,
    /// An upstream element failed, so this one cannot be computed.
    UpstreamError,
}

impl UpdateStatus {
    /// Whether dependents may compute from an element with this status.
    pub fn is_ready(self) -> bool {
        self != UpdateStatus::NotReady
    }

    /// Whether this is one of the two error statuses.
    pub fn is_error(self) -> bool {
        matches!(self, UpdateStatus::Error | UpdateStatus::UpstreamError)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStatus::Updated => "UPDATED",
            UpdateStatus::Nothing => "NOTHING",
            UpdateStatus::Deleted => "DELETED",
            UpdateStatus::NotReady => "NOT_READY",
            UpdateStatus::Error => "ERROR",
            UpdateStatus::UpstreamError => "UPSTREAM_ERROR",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// UpdateResult
// ---------------------------------------------------------------------------

/// What an element update produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult<S> {
    /// Replace the state with this value.
    Updated(S),
    /// Leave state and last-change context alone.
    Nothing,
    /// Evict the element.
    Deleted,
    /// Upstream data is missing.
    NotReady,
    /// The computation failed.
    Error,
    /// An upstream computation failed.
    UpstreamError,
}

impl<S> UpdateResult<S> {
    /// An unconditional new state.
    pub fn updated(state: S) -> Self {
        UpdateResult::Updated(state)
    }

    /// Evict the element.
    pub fn deleted() -> Self {
        UpdateResult::Deleted
    }

    /// Not computable yet.
    pub fn not_ready() -> Self {
        UpdateResult::NotReady
    }

    /// The computation failed.
    pub fn error() -> Self {
        UpdateResult::Error
    }

    /// An upstream computation failed.
    pub fn upstream_error() -> Self {
        UpdateResult::UpstreamError
    }

    /// The tag of this result.
    pub fn status(&self) -> UpdateStatus {
        match self {
            UpdateResult::Updated(_) => UpdateStatus::Updated,
            UpdateResult::Nothing => UpdateStatus::Nothing,
            UpdateResult::Deleted => UpdateStatus::Deleted,
            UpdateResult::NotReady => UpdateStatus::NotReady,
            UpdateResult::Error => UpdateStatus::Error,
            UpdateResult::UpstreamError => UpdateStatus::UpstreamError,
        }
    }

    /// The new state, for `Updated`.
    pub fn state(&self) -> Option<&S> {
        match self {
            UpdateResult::Updated(state) => Some(state),
            _ => None,
        }
    }

    /// Consume into the new state, for `Updated`.
    pub fn into_state(self) -> Option<S> {
        match self {
            UpdateResult::Updated(state) => Some(state),
            _ => None,
        }
    }
}

impl<S: PartialEq> UpdateResult<S> {
    /// `Updated(next)` unless `next` equals `previous`, in which case
    /// `Nothing`. Unchanged inputs never register as a change.
    pub fn maybe(previous: Option<&S>, next: S) -> Self {
        match previous {
            Some(prev) if *prev == next => UpdateResult::Nothing,
            _ => UpdateResult::Updated(next),
        }
    }
}
