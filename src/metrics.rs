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

//! Prometheus metrics for routing, lookups, the codec, and crypto.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A prometheus metric failed to construct or register.
    #[error("prometheus registration failed")]
    Prom,
}

/// All observability surfaces this node exposes.
#[derive(Clone)]
pub struct Metrics {
    /// The registry every metric below is registered against.
    pub registry: Registry,

    /// Peers currently held across all buckets.
    pub routing_table_occupancy: IntGauge,
    /// Lookups currently pending.
    pub lookups_pending: IntGauge,
    /// Lookups resolved, labeled by outcome (`fulfilled`, `expired`).
    pub lookups_resolved_total: IntCounterVec,
    /// Frames dropped, labeled by `DecodeError` variant name.
    pub frames_dropped_total: IntCounterVec,
    /// Crypto failures, labeled by `CryptoError` variant name.
    pub crypto_failures_total: IntCounterVec,
    /// Broadcasts forwarded.
    pub broadcasts_forwarded_total: IntCounter,
    /// Broadcasts suppressed as duplicates.
    pub broadcasts_deduped_total: IntCounter,
    /// Broadcasts dropped (ttl exhausted).
    pub broadcasts_dropped_total: IntCounter,
}

impl Metrics {
    /// Create and register every metric against a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let routing_table_occupancy = IntGauge::new(
            "kadnet_routing_table_occupancy",
            "Peers currently held across all k-buckets",
        )
        .map_err(|_| MetricsError::Prom)?;
        let lookups_pending = IntGauge::new(
            "kadnet_lookups_pending",
            "Iterative lookups currently pending",
        )
        .map_err(|_| MetricsError::Prom)?;
        let lookups_resolved_total = IntCounterVec::new(
            Opts::new("kadnet_lookups_resolved_total", "Lookups resolved by outcome"),
            &["outcome"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let frames_dropped_total = IntCounterVec::new(
            Opts::new("kadnet_frames_dropped_total", "Frames dropped by decode error kind"),
            &["kind"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let crypto_failures_total = IntCounterVec::new(
            Opts::new("kadnet_crypto_failures_total", "Crypto failures by error kind"),
            &["kind"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let broadcasts_forwarded_total = IntCounter::new(
            "kadnet_broadcasts_forwarded_total",
            "Broadcast packets forwarded to other peers",
        )
        .map_err(|_| MetricsError::Prom)?;
        let broadcasts_deduped_total = IntCounter::new(
            "kadnet_broadcasts_deduped_total",
            "Broadcast packets suppressed as already seen",
        )
        .map_err(|_| MetricsError::Prom)?;
        let broadcasts_dropped_total = IntCounter::new(
            "kadnet_broadcasts_dropped_total",
            "Broadcast packets dropped after ttl reached zero",
        )
        .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(routing_table_occupancy.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(lookups_pending.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(lookups_resolved_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(frames_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(crypto_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(broadcasts_forwarded_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(broadcasts_deduped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(broadcasts_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            routing_table_occupancy,
            lookups_pending,
            lookups_resolved_total,
            frames_dropped_total,
            crypto_failures_total,
            broadcasts_forwarded_total,
            broadcasts_deduped_total,
            broadcasts_dropped_total,
        })
    }
}
