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

//! The routing table: 128 k-buckets indexed by XOR-distance, plus an
//! id→distance index for O(1) direct lookups.
//!
//! Each bucket is guarded by its own lock so concurrent `announce` calls
//! against distinct distance bands never contend; the id→distance index is
//! a [`dashmap::DashMap`] for the same reason.

use std::net::SocketAddr;

use dashmap::DashMap;
use parking_lot::RwLock;
use prometheus::IntGauge;

use crate::identity::{NodeId, Peer};

use super::kbucket::{AnnounceOutcome, HeadProbe, KBucket, DEFAULT_K};

/// Number of distance bands: XOR distance over 128-bit ids ranges `[1, 128]`.
pub const NUM_BUCKETS: usize = 128;

/// Errors from routing table operations.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    /// A distance band outside `[1, 128]` was requested.
    #[error("distance {0} is out of range [1, 128]")]
    OutOfRange(u32),
}

fn bucket_index(distance: u32) -> Result<usize, BucketError> {
    if distance == 0 || distance as usize > NUM_BUCKETS {
        return Err(BucketError::OutOfRange(distance));
    }
    Ok(distance as usize - 1)
}

/// What the caller must do after an `announce` lands in a full bucket.
pub enum AnnounceAction {
    /// No action needed; the peer was refreshed or inserted.
    None,
    /// The caller must ping `head`; the distance band is needed to resolve
    /// the outcome via [`RoutingTable::resolve_full`].
    PingHead {
        /// Distance band the full bucket lives at.
        distance: u32,
        /// The peer to probe.
        head: Peer,
        /// The peer awaiting the probe's outcome.
        candidate: Peer,
    },
}

/// The Kademlia routing table for one local node.
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<RwLock<KBucket>>,
    index: DashMap<NodeId, u32>,
    occupancy_gauge: Option<IntGauge>,
}

impl RoutingTable {
    /// Create an empty routing table for `local_id`, with `k` peers per
    /// bucket.
    pub fn new(local_id: NodeId, k: usize) -> Self {
        let k = if k == 0 { DEFAULT_K } else { k };
        Self {
            local_id,
            buckets: (0..NUM_BUCKETS).map(|_| RwLock::new(KBucket::new(k))).collect(),
            index: DashMap::new(),
            occupancy_gauge: None,
        }
    }

    /// Create an empty routing table that also keeps `occupancy_gauge` in
    /// sync with the total number of peers held across every bucket.
    pub fn with_metrics(local_id: NodeId, k: usize, occupancy_gauge: IntGauge) -> Self {
        Self {
            occupancy_gauge: Some(occupancy_gauge),
            ..Self::new(local_id, k)
        }
    }

    fn refresh_occupancy(&self) {
        if let Some(gauge) = &self.occupancy_gauge {
            let total: usize = self.buckets.iter().map(|b| b.read().len()).sum();
            gauge.set(total as i64);
        }
    }

    /// This table's own node id.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Announce contact with `peer`, applying the bucket-replacement
    /// policy. Returns an action the caller must perform when the bucket
    /// was full.
    pub fn announce(&self, peer: Peer) -> Result<AnnounceAction, BucketError> {
        if peer.id() == self.local_id {
            return Ok(AnnounceAction::None);
        }
        let distance = self.local_id.distance(&peer.id());
        let idx = bucket_index(distance)?;
        let mut bucket = self.buckets[idx].write();
        let outcome = match bucket.announce(peer.clone()) {
            AnnounceOutcome::Refreshed | AnnounceOutcome::Inserted => {
                self.index.insert(peer.id(), distance);
                Ok(AnnounceAction::None)
            }
            AnnounceOutcome::Full { head } => Ok(AnnounceAction::PingHead {
                distance,
                head,
                candidate: peer,
            }),
        };
        drop(bucket);
        self.refresh_occupancy();
        outcome
    }

    /// Resolve a pending [`AnnounceAction::PingHead`] once the head has
    /// been probed.
    pub fn resolve_full(
        &self,
        distance: u32,
        probe: HeadProbe,
        candidate: Peer,
    ) -> Result<(), BucketError> {
        let idx = bucket_index(distance)?;
        let candidate_id = candidate.id();
        let mut bucket = self.buckets[idx].write();
        let evicted_head = matches!(probe, HeadProbe::TimedOut);
        if evicted_head {
            if let Some(head) = bucket.iter().next().map(|p| p.id()) {
                self.index.remove(&head);
            }
        }
        bucket.resolve_full(probe, candidate);
        if evicted_head {
            self.index.insert(candidate_id, distance);
        }
        drop(bucket);
        self.refresh_occupancy();
        Ok(())
    }

    /// O(1) lookup of a known peer by id.
    pub fn get_node(&self, id: NodeId) -> Option<Peer> {
        let distance = *self.index.get(&id)?;
        let idx = bucket_index(distance).ok()?;
        self.buckets[idx].read().get(id).cloned()
    }

    /// All peers at a given distance band.
    pub fn get_nodes(&self, distance: u32) -> Result<Vec<Peer>, BucketError> {
        let idx = bucket_index(distance)?;
        Ok(self.buckets[idx].read().iter().cloned().collect())
    }

    /// Find a known peer by its last-observed address. Used to correlate a
    /// liveness reply back to the peer it was sent to, since replies carry
    /// only a source address, not an id.
    pub fn find_by_address(&self, addr: SocketAddr) -> Option<Peer> {
        self.buckets
            .iter()
            .find_map(|bucket| bucket.read().iter().find(|p| p.address() == Some(addr)).cloned())
    }

    /// Mark a peer as unresponsive: demote it to indirect and clear its
    /// stale address so it is not dialed again until re-announced.
    pub fn demote(&self, id: NodeId) {
        let Some(distance) = self.index.get(&id).map(|d| *d) else {
            return;
        };
        let Ok(idx) = bucket_index(distance) else {
            return;
        };
        let mut bucket = self.buckets[idx].write();
        if let Some(peer) = bucket.get_mut(id) {
            peer.set_directly_connected(false);
            peer.clear_address();
        }
    }

    /// Gather up to `candidate_limit` peers near `target`, walking outward
    /// from `Distance(local_id, target)`, then return the closest `k` of
    /// them sorted by distance to `target`.
    pub fn get_closest_nodes(&self, target: NodeId, k: usize, candidate_limit: usize) -> Vec<Peer> {
        if target == self.local_id {
            // fallthrough: no special case needed, distance(self, self) == 0
        }
        let center = self.local_id.distance(&target);
        let mut candidates = Vec::new();
        let mut offset = 0i64;
        loop {
            let mut progressed = false;
            for direction in [1i64, -1i64] {
                if direction == -1 && offset == 0 {
                    continue;
                }
                let d = center as i64 + direction * offset;
                if d < 1 || d as usize > NUM_BUCKETS {
                    continue;
                }
                progressed = true;
                let idx = d as usize - 1;
                candidates.extend(self.buckets[idx].read().iter().cloned());
            }
            if !progressed && offset as usize > NUM_BUCKETS {
                break;
            }
            if candidates.len() >= candidate_limit || offset as usize > NUM_BUCKETS {
                break;
            }
            offset += 1;
        }

        candidates.sort_by(|a, b| {
            a.id()
                .distance(&target)
                .cmp(&b.id().distance(&target))
                .then_with(|| a.id().cmp(&b.id()))
        });
        candidates.truncate(k);
        candidates
    }

    /// Remove a peer entirely (used on persistent liveness failure outside
    /// the replacement-policy probe path).
    pub fn remove(&self, id: NodeId) {
        if let Some((_, distance)) = self.index.remove(&id) {
            if let Ok(idx) = bucket_index(distance) {
                self.buckets[idx].write().remove(id);
            }
            self.refresh_occupancy();
        }
    }
}
