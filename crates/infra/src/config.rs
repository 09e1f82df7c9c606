//! Application configuration.
//!
//! Loaded from an optional TOML file and then from `ENTITLE__*` environment
//! variables (`ENTITLE__LICENSING__WARNING_RATIO=0.8`), env taking precedence.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use entitle_core::{DomainError, DomainResult};
use entitle_licensing::{ValidationPolicy, validation::DEFAULT_WARNING_RATIO};
use entitle_observability::ObservabilityConfig;

use crate::budget_monitor::DEFAULT_VARIANCE_THRESHOLD;
use crate::jobs::{JobExecutorConfig, RetryPolicy};

pub const ENV_PREFIX: &str = "ENTITLE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub licensing: LicensingConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicensingConfig {
    /// Fraction of a limit at which a warning is raised.
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Overspend, as a fraction of planned, that triggers a notification.
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for LicensingConfig {
    fn default() -> Self {
        Self {
            warning_ratio: default_warning_ratio(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            variance_threshold: default_variance_threshold(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_warning_ratio() -> f64 {
    DEFAULT_WARNING_RATIO
}
fn default_variance_threshold() -> f64 {
    DEFAULT_VARIANCE_THRESHOLD
}
fn default_workers() -> usize {
    4
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl AppConfig {
    /// Load from `file` (if given) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn validation_policy(&self) -> DomainResult<ValidationPolicy> {
        ValidationPolicy::new(self.licensing.warning_ratio)
    }

    /// The budget overspend threshold; must be finite and above zero.
    pub fn variance_threshold(&self) -> DomainResult<f64> {
        let threshold = self.budget.variance_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(DomainError::validation(format!(
                "budget.variance_threshold must be a positive number, got {threshold}"
            )));
        }
        Ok(threshold)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.executor.max_attempts.max(1),
            Duration::from_millis(self.executor.base_delay_ms),
            Duration::from_millis(self.executor.max_delay_ms),
        )
    }

    pub fn executor_config(&self) -> JobExecutorConfig {
        JobExecutorConfig::default()
            .with_name("entitle-jobs")
            .with_workers(self.executor.workers)
            .with_poll_interval(Duration::from_millis(self.executor.poll_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn empty_source_yields_defaults() {
        let cfg = from_toml("");
        assert_eq!(cfg.licensing.warning_ratio, 0.9);
        assert_eq!(cfg.budget.variance_threshold, 0.1);
        assert_eq!(cfg.executor.workers, 4);
        assert_eq!(cfg.executor.max_attempts, 5);
        assert_eq!(cfg.observability, ObservabilityConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = from_toml(
            r#"
            [licensing]
            warning_ratio = 0.75

            [executor]
            workers = 2
            max_attempts = 3

            [observability]
            log_level = "debug"
            json = false
            "#,
        );

        assert_eq!(cfg.validation_policy().unwrap().warning_ratio(), 0.75);
        assert_eq!(cfg.retry_policy().max_attempts, 3);
        assert_eq!(cfg.executor_config().workers, 2);
        assert_eq!(cfg.executor.poll_interval_ms, 100);
        assert!(!cfg.observability.json);
    }

    #[test]
    fn variance_threshold_must_be_positive_and_finite() {
        assert_eq!(from_toml("").variance_threshold().unwrap(), 0.1);
        assert_eq!(
            from_toml("[budget]\nvariance_threshold = 0.25\n").variance_threshold().unwrap(),
            0.25
        );

        for bad in ["-0.1", "0.0", "nan", "inf"] {
            let cfg = from_toml(&format!("[budget]\nvariance_threshold = {bad}\n"));
            assert!(cfg.variance_threshold().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn out_of_range_ratio_is_rejected() {
        let cfg = from_toml("[licensing]\nwarning_ratio = 1.5\n");
        assert!(cfg.validation_policy().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = AppConfig::load(None).unwrap();
        assert!(cfg.executor.workers >= 1);
    }
}
