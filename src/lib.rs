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

//! kadnet - a Kademlia-style overlay network node.
//!
//! This crate provides:
//! - A base-128 varint/typed-buffer wire codec and a packet registry built
//!   on top of it
//! - RSA-based node identity, persisted key material, and a per-peer crypto
//!   envelope for encryption and signing
//! - An XOR-distance k-bucket routing table
//! - An alpha-parallel iterative lookup engine, decoupled from transport
//! - Node glue wiring the above into a runnable event loop, plus
//!   Prometheus metrics and layered TOML/environment configuration

/// The wire codec: varints, the typed buffer, framing, and packets (C1, C2).
pub mod codec;
/// Layered TOML + environment node configuration.
pub mod config;
/// Node identity and the RSA crypto envelope (C3).
pub mod identity;
/// The alpha-parallel iterative lookup engine (C5).
pub mod lookup;
/// Prometheus metrics for routing, lookups, the codec, and crypto.
pub mod metrics;
/// Node glue: event loop, transport boundary, dispatch, and broadcast dedup.
pub mod node;
/// The XOR-distance k-bucket routing table (C4).
pub mod routing;
