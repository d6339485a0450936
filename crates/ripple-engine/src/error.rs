//! Error types for assembly and for driving the engine.

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// BuildError
// ---------------------------------------------------------------------------

/// Errors found while assembling the dependency graph.
///
/// These are always fatal for the build and always name the offending
/// entities or channels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Two entities share a name.
    #[error("entity '{0}' is registered more than once")]
    DuplicateEntity(String),

    /// Two channels share a name.
    #[error("channel '{0}' is registered more than once")]
    DuplicateChannel(String),

    /// An entity depends on entities that were never registered.
    #[error("missing dependencies for {entity}: {missing:?}")]
    MissingDependencies { entity: String, missing: Vec<String> },

    /// An entity subscribes to channels that were never registered.
    #[error("missing channels for {entity}: {missing:?}")]
    MissingChannels { entity: String, missing: Vec<String> },

    /// An entity has no way to ever receive an element.
    #[error("entity '{entity}' has neither dependencies nor channel subscriptions")]
    Isolated { entity: String },

    /// A token names a registered entity or channel but with other types.
    #[error("{entity} refers to '{reference}' as {found}, but it is registered as {expected}")]
    TypeMismatch {
        entity: String,
        reference: String,
        expected: String,
        found: String,
    },

    /// A simple entity depends on an entity with a different key type.
    #[error(
        "simple entity {entity} needs dependencies keyed by {expected}, \
         but '{dependency}' is keyed by {found}"
    )]
    KeyTypeMismatch {
        entity: String,
        dependency: String,
        expected: String,
        found: String,
    },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors returned by operations on a built engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A tick was requested for a time earlier than the previous tick.
    #[error("tick time {requested} is earlier than the previous tick time {previous}")]
    NonMonotonicTime {
        previous: DateTime<Utc>,
        requested: DateTime<Utc>,
    },

    /// An event was injected into a channel nobody subscribes to.
    #[error("channel '{0}' has no subscribers")]
    UnsubscribedChannel(String),

    /// An event was injected with a token whose payload type differs from
    /// the registered one.
    #[error("channel '{channel}' carries {expected}, not {found}")]
    ChannelTypeMismatch {
        channel: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A query named an entity that was never registered.
    #[error("entity '{0}' is not registered")]
    UnknownEntity(String),

    /// A query used a token whose key or state type differs from the
    /// registered one.
    #[error("entity '{entity}' is registered with other key or state types than {found}")]
    EntityTypeMismatch { entity: String, found: String },

    /// A timer callback failed. The tick was abandoned after the context
    /// had already advanced.
    #[error("timer due at {due} failed")]
    Timer {
        due: DateTime<Utc>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
