//! Analysis configuration: providers, cache and breaker settings.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL_SECS;
use crate::error::{DepscanError, Result};

const fn default_enabled() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_health_timeout_secs() -> u64 {
    1
}

const fn default_batch_size() -> usize {
    128
}

const fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cool_down_secs() -> u64 {
    30
}

/// Settings for one vulnerability provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider, e.g. `https://api.example.com`.
    pub host: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-request timeout for analysis calls, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout for health probes, in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Number of purls per batch request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            enabled: default_enabled(),
            timeout_secs: default_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

/// Cache-aside settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Entry time-to-live, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Circuit breaker settings, shared by all (provider, route) breakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time the breaker stays open before a half-open trial, in seconds.
    #[serde(default = "default_cool_down_secs")]
    pub cool_down_secs: u64,
}

impl BreakerConfig {
    #[must_use]
    pub fn cool_down(&self) -> Duration {
        Duration::from_secs(self.cool_down_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down_secs: default_cool_down_secs(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepscanConfig {
    /// Providers keyed by name ("osv", "trustify").
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl DepscanConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| DepscanError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            if provider.host.trim().is_empty() {
                return Err(DepscanError::config(format!(
                    "provider '{name}' has an empty host"
                )));
            }
            if provider.batch_size == 0 {
                return Err(DepscanError::config(format!(
                    "provider '{name}' has a zero batch size"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = DepscanConfig::from_yaml(
            r"
            providers:
              osv:
                host: https://api.example.com
            ",
        )
        .unwrap();
        let osv = &config.providers["osv"];
        assert!(osv.enabled);
        assert_eq!(osv.timeout_secs, 60);
        assert_eq!(osv.health_timeout_secs, 1);
        assert_eq!(osv.batch_size, 128);
        assert_eq!(config.cache.ttl(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn test_empty_host_rejected() {
        let result = DepscanConfig::from_yaml(
            r"
            providers:
              osv:
                host: ''
            ",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = DepscanConfig::from_yaml(
            r"
            providers:
              osv:
                host: https://api.example.com
                batch_size: 0
            ",
        );
        assert!(result.is_err());
    }
}
