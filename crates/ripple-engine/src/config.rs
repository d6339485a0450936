//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a valid
//! configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error loading an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document was not valid configuration JSON.
    #[error("invalid engine configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Time of the starting context (update id 0). The first tick may not be
    /// earlier than this.
    pub start_time: DateTime<Utc>,
    /// Record per-entity update durations in
    /// [`TickDiagnostics::entity_times`](crate::engine::TickDiagnostics::entity_times).
    pub entity_timings: bool,
    /// Log a warning when a tick takes longer than this many milliseconds.
    pub slow_tick_warn_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_time: DateTime::<Utc>::MIN_UTC,
            entity_timings: false,
            slow_tick_warn_ms: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_document_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.start_time, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = EngineConfig::from_json(
            r#"{ "start_time": "2024-03-01T00:00:00Z", "slow_tick_warn_ms": 5 }"#,
        )
        .unwrap();
        assert_eq!(
            config.start_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(config.slow_tick_warn_ms, Some(5));
        assert!(!config.entity_timings);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = EngineConfig::from_json(r#"{ "entity_timings": "yes" }"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid engine configuration"));
    }
}
