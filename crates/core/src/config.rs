//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::{AssetRegistry, CoreError, CoreResult};

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Exchange rate source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.frankfurter.app".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RatesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Upper bound for each worker's network work
    pub worker_timeout_secs: u64,
    /// Max in-flight workers per batch; `None` spawns one per asset
    pub max_concurrency: Option<usize>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            worker_timeout_secs: 10,
            max_concurrency: None,
        }
    }
}

impl AggregatorSettings {
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }
}

/// Optional TTL caching of oracle reads and exchange rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub oracle_ttl_secs: u64,
    pub rate_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            oracle_ttl_secs: 15,
            rate_ttl_secs: 300,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub rpc_url: String,
    pub server: ServerConfig,
    pub rates: RatesConfig,
    pub aggregator: AggregatorSettings,
    pub cache: CacheSettings,
    /// symbol -> feed contract address (hex)
    pub feeds: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(CoreError::InvalidConfig("rpc_url must not be empty".to_string()));
        }
        if self.feeds.is_empty() {
            return Err(CoreError::InvalidConfig("no price feeds configured".to_string()));
        }
        if self.aggregator.worker_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig("worker_timeout_secs must be positive".to_string()));
        }
        if self.aggregator.max_concurrency == Some(0) {
            return Err(CoreError::InvalidConfig("max_concurrency must be positive".to_string()));
        }
        Ok(())
    }

    pub fn registry(&self) -> CoreResult<AssetRegistry> {
        AssetRegistry::from_hex(self.feeds.iter().map(|(s, a)| (s.as_str(), a.as_str())))
    }
}
