use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection pool configuration.
///
/// # Default Configuration
///
/// - `min`: 0 (no warm connections are kept beyond the idle timeout)
/// - `max`: 100000
/// - `acquire_timeout_ms`: 30000 (30 seconds)
/// - `idle_timeout_ms`: 10000 (10 seconds)
///
/// # Example
///
/// ```rust
/// use apirpc_client::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{"max": 8}"#).unwrap();
/// assert_eq!(config.max, 8);
/// assert_eq!(config.min, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle connections kept regardless of age
    pub min: usize,
    /// Hard cap on live connections (idle + checked out + being created)
    pub max: usize,
    /// Maximum time to wait for a connection once `max` is reached
    pub acquire_timeout_ms: u64,
    /// Idle connections beyond `min` older than this are disposed
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 100_000,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 10_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Client configuration.
///
/// # Default Configuration
///
/// - `name`: "ApiClient"
/// - `timeout_ms`: 30000 (per call, also used for connecting)
/// - `stat_period_secs`: 600 (0 disables statistics reports)
/// - `pool`: [`PoolConfig::default`]
/// - `log_payloads`: false
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name used in logs and statistics reports
    pub name: String,
    pub timeout_ms: u64,
    pub stat_period_secs: u64,
    pub pool: PoolConfig,
    /// Trace every encoded and decoded payload
    pub log_payloads: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "ApiClient".to_string(),
            timeout_ms: 30_000,
            stat_period_secs: 600,
            pool: PoolConfig::default(),
            log_payloads: false,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn stat_period(&self) -> Duration {
        Duration::from_secs(self.stat_period_secs)
    }
}
