use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::errors::{AppError, AppResult};

/// Top-level configuration for the brandmark pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrandmarkConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Optional cache-aside persistent store; when absent, fetched
    /// logos live only in the in-process cache.
    pub storage: Option<StorageConfig>,
}

/// Multi-source fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-source attempt timeout at normal runtime
    #[serde(with = "duration_serde::duration", default = "default_attempt_timeout")]
    pub attempt_timeout: Duration,
    /// Tighter per-source timeout during pre-warm/build phases
    #[serde(
        with = "duration_serde::duration",
        default = "default_prewarm_attempt_timeout"
    )]
    pub prewarm_attempt_timeout: Duration,
    /// TCP connect timeout for the HTTP client
    #[serde(with = "duration_serde::duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Cap on outstanding fire-and-forget persistence tasks
    #[serde(default = "default_max_concurrent_persists")]
    pub max_concurrent_persists: usize,
}

/// Per-namespace TTL policy and capacity limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(with = "duration_serde::duration", default = "default_fetch_result_ttl")]
    pub fetch_result_ttl: Duration,
    #[serde(with = "duration_serde::duration", default = "default_verdict_ttl")]
    pub verdict_ttl: Duration,
    #[serde(with = "duration_serde::duration", default = "default_brightness_ttl")]
    pub brightness_ttl: Duration,
    #[serde(with = "duration_serde::duration", default = "default_inverted_ttl")]
    pub inverted_ttl: Duration,
    #[serde(default = "default_max_entries_per_namespace")]
    pub max_entries_per_namespace: usize,
    /// LRU capacity of the inverted-image namespace
    #[serde(default = "default_inverted_capacity")]
    pub inverted_capacity: usize,
    /// Hard cap on simultaneous distinct in-flight fetches
    #[serde(default = "default_coalescer_capacity")]
    pub coalescer_capacity: usize,
}

/// Memory budget and sampling configuration for the pressure governor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Total process memory budget in MB
    #[serde(default = "default_memory_budget_mb")]
    pub budget_mb: u64,
    /// Fraction of the budget at which the governor enters `warning`
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
    /// Fraction of the budget at which the governor enters `critical`
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
    #[serde(with = "duration_serde::duration", default = "default_sample_interval")]
    pub sample_interval: Duration,
    /// Rolling sample history length used for trend computation
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persisted logo bytes and metadata
    pub root: PathBuf,
    /// Optional override for the bundled placeholder reference image
    pub placeholder_reference: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: default_attempt_timeout(),
            prewarm_attempt_timeout: default_prewarm_attempt_timeout(),
            connect_timeout: default_connect_timeout(),
            max_concurrent_persists: default_max_concurrent_persists(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_result_ttl: default_fetch_result_ttl(),
            verdict_ttl: default_verdict_ttl(),
            brightness_ttl: default_brightness_ttl(),
            inverted_ttl: default_inverted_ttl(),
            max_entries_per_namespace: default_max_entries_per_namespace(),
            inverted_capacity: default_inverted_capacity(),
            coalescer_capacity: default_coalescer_capacity(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget_mb: default_memory_budget_mb(),
            warning_ratio: default_warning_ratio(),
            critical_ratio: default_critical_ratio(),
            sample_interval: default_sample_interval(),
            history_len: default_history_len(),
        }
    }
}

impl BrandmarkConfig {
    /// Load configuration from an optional TOML file with `BRANDMARK_`
    /// environment overrides layered on top of the built-in defaults.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed("BRANDMARK_").split("__"))
            .extract()
            .map_err(|e| AppError::configuration(format!("failed to load configuration: {e}")))?;

        config.validate()?;
        info!(
            "Configuration loaded (memory budget: {}MB, coalescer capacity: {})",
            config.memory.budget_mb, config.cache.coalescer_capacity
        );
        Ok(config)
    }

    /// Sanity-check threshold ordering and capacities
    pub fn validate(&self) -> AppResult<()> {
        if self.memory.budget_mb == 0 {
            return Err(AppError::configuration("memory budget must be non-zero"));
        }
        if !(0.0..1.0).contains(&self.memory.warning_ratio)
            || !(0.0..=1.0).contains(&self.memory.critical_ratio)
            || self.memory.warning_ratio >= self.memory.critical_ratio
        {
            return Err(AppError::configuration(format!(
                "memory thresholds must satisfy 0 < warning ({}) < critical ({}) <= 1",
                self.memory.warning_ratio, self.memory.critical_ratio
            )));
        }
        if self.cache.coalescer_capacity == 0 {
            return Err(AppError::configuration(
                "coalescer capacity must be non-zero",
            ));
        }
        if self.cache.inverted_capacity == 0 {
            return Err(AppError::configuration(
                "inverted image cache capacity must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BrandmarkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.budget_mb, 512);
        assert!(config.memory.warning_ratio < config.memory.critical_ratio);
    }

    #[test]
    fn test_threshold_ordering_rejected() {
        let mut config = BrandmarkConfig::default();
        config.memory.warning_ratio = 0.95;
        config.memory.critical_ratio = 0.90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_strings_deserialize() {
        let toml_str = r#"
            [fetch]
            attempt_timeout = "2s"
            prewarm_attempt_timeout = "500ms"

            [cache]
            fetch_result_ttl = "10m"
        "#;
        let config: BrandmarkConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fetch.attempt_timeout, Duration::from_secs(2));
        assert_eq!(
            config.fetch.prewarm_attempt_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(config.cache.fetch_result_ttl, Duration::from_secs(600));
        // Untouched fields fall back to defaults
        assert_eq!(config.cache.verdict_ttl, Duration::from_secs(86400));
    }
}
