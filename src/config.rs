// Copyright (c) 2026 kadnet
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Layered TOML + environment node configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::MIN_KEY_BITS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("io error reading config")]
    Io,
    /// The TOML was malformed.
    #[error("invalid toml: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity settings.
    pub node: NodeIdentitySettings,
    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Routing/lookup tuning.
    #[serde(default)]
    pub routing: RoutingTuning,
    /// Metrics exposure settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// This node's own identity settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeIdentitySettings {
    /// Directory holding the persisted private key.
    pub data_dir: String,
    /// RSA key size in bits for newly generated identities.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_key_bits() -> usize {
    MIN_KEY_BITS
}

/// Listen/transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Address to bind the node's socket to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:9420".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Routing table and lookup engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingTuning {
    /// Bucket replication factor.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Lookup parallelism factor.
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    /// Per-query timeout, in milliseconds.
    #[serde(default = "default_per_query_timeout_ms")]
    pub per_query_timeout_ms: u64,
    /// Total lookup expiration, in milliseconds.
    #[serde(default = "default_lookup_expiration_ms")]
    pub lookup_expiration_ms: u64,
    /// Maximum accepted broadcast ttl.
    #[serde(default = "default_max_broadcast_ttl")]
    pub max_broadcast_ttl: u16,
    /// Periodic liveness ping interval, in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// How long an outstanding liveness ping may go unanswered before the
    /// peer is demoted, in milliseconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Capacity of the process-wide broadcast dedup LRU.
    #[serde(default = "default_broadcast_dedup_capacity")]
    pub broadcast_dedup_capacity: usize,
}

fn default_k() -> usize {
    20
}
fn default_alpha() -> usize {
    3
}
fn default_per_query_timeout_ms() -> u64 {
    2_000
}
fn default_lookup_expiration_ms() -> u64 {
    10_000
}
fn default_max_broadcast_ttl() -> u16 {
    8
}
fn default_ping_interval_secs() -> u64 {
    600
}
fn default_ping_timeout_ms() -> u64 {
    5_000
}
fn default_broadcast_dedup_capacity() -> usize {
    4096
}

impl Default for RoutingTuning {
    fn default() -> Self {
        Self {
            k: default_k(),
            alpha: default_alpha(),
            per_query_timeout_ms: default_per_query_timeout_ms(),
            lookup_expiration_ms: default_lookup_expiration_ms(),
            max_broadcast_ttl: default_max_broadcast_ttl(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_ms: default_ping_timeout_ms(),
            broadcast_dedup_capacity: default_broadcast_dedup_capacity(),
        }
    }
}

impl RoutingTuning {
    /// Per-query timeout as a [`Duration`].
    pub fn per_query_timeout(&self) -> Duration {
        Duration::from_millis(self.per_query_timeout_ms)
    }

    /// Total lookup expiration as a [`Duration`].
    pub fn lookup_expiration(&self) -> Duration {
        Duration::from_millis(self.lookup_expiration_ms)
    }

    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Outstanding-ping timeout as a [`Duration`].
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Metrics exposure settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus registry is exposed at all.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP endpoint to.
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9421".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl NodeConfig {
    /// Load configuration from a TOML file at `path`, then apply
    /// `KADNET_`-prefixed environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
        let mut config: NodeConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.node.data_dir = env("KADNET_DATA_DIR", &self.node.data_dir);
        self.transport.listen_addr = env("KADNET_LISTEN_ADDR", &self.transport.listen_addr);
        self.metrics.listen_addr = env("KADNET_METRICS_ADDR", &self.metrics.listen_addr);
    }

    /// Validate field bounds, as required by the ambient configuration
    /// contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.key_bits < MIN_KEY_BITS {
            return Err(ConfigError::Invalid(format!(
                "node.key_bits must be >= {MIN_KEY_BITS}"
            )));
        }
        if !(1..=20).contains(&self.routing.k) {
            return Err(ConfigError::Invalid("routing.k must be in 1..=20".into()));
        }
        if self.routing.alpha < 1 || self.routing.alpha > self.routing.k {
            return Err(ConfigError::Invalid(
                "routing.alpha must be in 1..=routing.k".into(),
            ));
        }
        if self.routing.per_query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "routing.per_query_timeout_ms must be > 0".into(),
            ));
        }
        if self.routing.lookup_expiration_ms == 0 {
            return Err(ConfigError::Invalid(
                "routing.lookup_expiration_ms must be > 0".into(),
            ));
        }
        if self.routing.max_broadcast_ttl < 1 {
            return Err(ConfigError::Invalid(
                "routing.max_broadcast_ttl must be >= 1".into(),
            ));
        }
        if self.routing.ping_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "routing.ping_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
