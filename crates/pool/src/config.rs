//! Pool configuration
//!
//! Loaded from code (builder methods) or from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default delay before a failed worker is replaced
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Static configuration handed to every worker launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the pool the worker belongs to (metrics label)
    pub pool: String,

    /// Opaque settings interpreted by the worker itself
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl WorkerConfig {
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            settings: serde_json::Value::Null,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

/// Pool supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, used in logs and metrics
    pub name: String,

    /// Initial desired replica count
    pub replicas: usize,

    /// Fixed delay between a worker failure and its replacement
    #[serde(with = "duration_millis")]
    pub failure_backoff: Duration,

    /// Settings passed to every launched worker
    pub worker: WorkerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

impl PoolConfig {
    /// Create a configuration for the named pool with one replica
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            worker: WorkerConfig::new(name.clone()),
            name,
            replicas: 1,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `ELASTIC_POOL_NAME`: Pool name (default: "default")
    /// - `ELASTIC_POOL_REPLICAS`: Initial replica count (default: 1)
    /// - `ELASTIC_POOL_FAILURE_BACKOFF_MS`: Backoff after a failure (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let name = env::var("ELASTIC_POOL_NAME").unwrap_or_else(|_| "default".to_string());
        let mut config = Self::new(name);

        if let Some(replicas) = parse_env::<usize>("ELASTIC_POOL_REPLICAS")? {
            config.replicas = replicas;
        }
        if let Some(millis) = parse_env::<u64>("ELASTIC_POOL_FAILURE_BACKOFF_MS")? {
            config.failure_backoff = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Rename the pool (and the pool label handed to workers)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.worker.pool = self.name.clone();
        self
    }

    /// Set the initial replica count
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the failure backoff
    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    /// Set the opaque worker settings
    pub fn with_worker_settings(mut self, settings: serde_json::Value) -> Self {
        self.worker.settings = settings;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "name".into(),
                value: self.name.clone(),
            });
        }
        if self.worker.pool != self.name {
            return Err(ConfigError::Invalid {
                key: "worker.pool".into(),
                value: self.worker.pool.clone(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.name, "default");
        assert_eq!(config.replicas, 1);
        assert_eq!(config.failure_backoff, Duration::from_secs(5));
        assert_eq!(config.worker.pool, "default");
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::new("alerts")
            .with_replicas(4)
            .with_failure_backoff(Duration::from_millis(250))
            .with_worker_settings(serde_json::json!({"batch": 100}));

        assert_eq!(config.replicas, 4);
        assert_eq!(config.failure_backoff, Duration::from_millis(250));
        assert_eq!(config.worker.settings["batch"], 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_name_keeps_worker_label_in_sync() {
        let config = PoolConfig::default().with_name("ingest");
        assert_eq!(config.name, "ingest");
        assert_eq!(config.worker.pool, "ingest");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mismatched_worker_pool() {
        let mut config = PoolConfig::new("alerts");
        config.worker.pool = "other".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_uses_millis() {
        let config = PoolConfig::new("alerts").with_failure_backoff(Duration::from_secs(2));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["failure_backoff"], 2000);

        let parsed: PoolConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }
}
