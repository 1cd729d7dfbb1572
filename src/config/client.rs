//! Product service client and consumer configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::consumer::AckMode;

/// Product service (oracle) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProductServiceConfig {
    /// Base URL; lookups go to `{base_url}/api/products/{id}`.
    pub base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Upper bound for one lookup including retries, in seconds.
    /// Expiry counts as an unreachable product service.
    pub lookup_timeout_secs: u64,
    /// Retries for transient failures (connect errors, timeouts, 429, 5xx).
    pub max_retries: usize,
}

impl Default for ProductServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 2,
            lookup_timeout_secs: 5,
            max_retries: 3,
        }
    }
}

impl ProductServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

/// Consumer behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// When messages are acknowledged to the broker.
    pub ack_mode: AckMode,
    /// Broker connection attempts at startup before giving up.
    pub connect_max_retries: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::AfterPersist,
            connect_max_retries: 30,
        }
    }
}
