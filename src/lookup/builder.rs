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

//! A fluent, one-shot builder that configures and commits a
//! [`LookupState`]. Consumed by `commit()`; a fresh builder is created per
//! lookup, so no identity-based chaining is needed.

use std::time::{Duration, Instant};

use crate::identity::{NodeId, Peer};
use crate::routing::RoutingTable;

use super::state::LookupState;

const DEFAULT_EXPIRATION: Duration = Duration::from_secs(10);
const DEFAULT_PER_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_ALPHA: usize = 3;
const DEFAULT_K: usize = 20;

/// Configures one iterative lookup before committing it against a
/// [`RoutingTable`].
pub struct LookupBuilder {
    target: NodeId,
    recursive: bool,
    expiration: Duration,
    per_query_timeout: Duration,
    alpha: usize,
    k: usize,
    on_success: Option<Box<dyn FnOnce(Peer) + Send>>,
    on_failure: Option<Box<dyn FnOnce() + Send>>,
}

impl LookupBuilder {
    /// Start configuring a lookup for `target`.
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            recursive: false,
            expiration: DEFAULT_EXPIRATION,
            per_query_timeout: DEFAULT_PER_QUERY_TIMEOUT,
            alpha: DEFAULT_ALPHA,
            k: DEFAULT_K,
            on_success: None,
            on_failure: None,
        }
    }

    /// Continue polling newly-discovered closer peers until progress
    /// stalls, instead of resolving after a single round.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Wall-clock deadline for the whole lookup.
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Per-query timeout for an individual outstanding request.
    pub fn per_query_timeout(mut self, timeout: Duration) -> Self {
        self.per_query_timeout = timeout;
        self
    }

    /// Parallelism factor (default 3).
    pub fn alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha.max(1);
        self
    }

    /// Replication factor (default 20), also bounding how many peers a
    /// response may contribute.
    pub fn k(mut self, k: usize) -> Self {
        self.k = k.max(1);
        self
    }

    /// Callback invoked exactly once when the target is confirmed.
    pub fn on_success(mut self, callback: impl FnOnce(Peer) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Callback invoked exactly once on expiry without success.
    pub fn on_failure(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }

    /// Seed the lookup from `table`'s closest known peers and produce a
    /// [`LookupState`]. If the target is already a known node, the state
    /// resolves synchronously as Fulfilled. If the routing table has no
    /// peers at all, the state resolves immediately as Expired.
    pub fn commit(self, table: &RoutingTable) -> LookupState {
        let on_success = self.on_success.unwrap_or_else(|| Box::new(|_| {}));
        let on_failure = self.on_failure.unwrap_or_else(|| Box::new(|| {}));

        if let Some(found) = table.get_node(self.target) {
            let mut state = LookupState::new(
                self.target,
                table.local_id(),
                vec![found],
                self.k,
                self.alpha,
                self.recursive,
                Instant::now() + self.expiration,
                self.per_query_timeout,
                on_success,
                on_failure,
            );
            // Synchronously resolve: treat the table hit as an
            // already-fulfilled single-peer round.
            let target = self.target;
            let seed_id = state.discovered().next().map(|p| p.id());
            if let Some(seed_id) = seed_id {
                debug_assert_eq!(seed_id, target);
            }
            state.select_round_peers();
            state.handle_response(self.target, vec![]);
            return state;
        }

        let seeds = table.get_closest_nodes(self.target, self.k, self.alpha * self.k);
        let mut state = LookupState::new(
            self.target,
            table.local_id(),
            seeds.clone(),
            self.k,
            self.alpha,
            self.recursive,
            Instant::now() + self.expiration,
            self.per_query_timeout,
            on_success,
            on_failure,
        );
        if seeds.is_empty() {
            state.check_global_expiration(Instant::now() + self.expiration + Duration::from_nanos(1));
        }
        state
    }
}
