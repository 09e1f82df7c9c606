//! Tracing/logging setup shared by every process.

use serde::Deserialize;

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Logging settings. Loaded as part of the application config and passed in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. `info`, `entitle_infra=debug`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON lines when true, human-readable otherwise.
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    true
}

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &ObservabilityConfig) {
    tracing::init(config);
}
