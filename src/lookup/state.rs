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

//! The per-lookup state machine: candidate tracking, round selection, and
//! the Pending/Fulfilled/Expired transitions.
//!
//! This module is pure bookkeeping — it decides *which* peers to query next
//! and *when* a lookup resolves, but dispatching requests and waiting on
//! the network is left to [`super::engine`].

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::identity::{NodeId, Peer};

/// Identifies one in-flight lookup, carried on request/response packets
/// for correlation.
pub type LookupId = Uuid;

/// Terminal or in-progress status of a [`LookupState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// Still awaiting responses or further rounds.
    Pending,
    /// The target was found; `on_success` has fired.
    Fulfilled,
    /// Expiration was reached without finding the target; `on_failure` has
    /// fired.
    Expired,
}

/// What the caller (the engine) should do after an event is applied.
#[derive(Debug, PartialEq, Eq)]
pub enum LookupEvent {
    /// The lookup is still pending; no round boundary was crossed.
    StillPending,
    /// The current round is complete and another round should be started
    /// (recursive lookups only).
    StartNextRound,
    /// The lookup resolved successfully this call.
    Fulfilled,
    /// The lookup expired this call.
    Expired,
}

/// A snapshot of one Kademlia-style iterative lookup.
pub struct LookupState {
    id: LookupId,
    target: NodeId,
    local_id: NodeId,
    k: usize,
    alpha: usize,
    recursive: bool,
    expiration_ts: Instant,
    per_query_timeout: Duration,
    queried: HashSet<NodeId>,
    outstanding: HashMap<NodeId, Instant>,
    fulfilled: HashSet<NodeId>,
    discovered: HashMap<NodeId, Peer>,
    target_found: Option<Peer>,
    best_known_distance: Option<u32>,
    status: LookupStatus,
    on_success: Option<Box<dyn FnOnce(Peer) + Send>>,
    on_failure: Option<Box<dyn FnOnce() + Send>>,
}

impl LookupState {
    pub(super) fn new(
        target: NodeId,
        local_id: NodeId,
        seeds: Vec<Peer>,
        k: usize,
        alpha: usize,
        recursive: bool,
        expiration_ts: Instant,
        per_query_timeout: Duration,
        on_success: Box<dyn FnOnce(Peer) + Send>,
        on_failure: Box<dyn FnOnce() + Send>,
    ) -> Self {
        let mut discovered = HashMap::new();
        for seed in seeds {
            if seed.id() != local_id {
                discovered.insert(seed.id(), seed);
            }
        }
        Self {
            id: Uuid::new_v4(),
            target,
            local_id,
            k,
            alpha,
            recursive,
            expiration_ts,
            per_query_timeout,
            queried: HashSet::new(),
            outstanding: HashMap::new(),
            fulfilled: HashSet::new(),
            discovered,
            target_found: None,
            best_known_distance: None,
            status: LookupStatus::Pending,
            on_success: Some(on_success),
            on_failure: Some(on_failure),
        }
    }

    /// This lookup's correlation id.
    pub fn id(&self) -> LookupId {
        self.id
    }

    /// The id being searched for.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Current status.
    pub fn status(&self) -> LookupStatus {
        self.status
    }

    /// Whether this lookup has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status != LookupStatus::Pending
    }

    /// All peers discovered so far, regardless of status.
    pub fn discovered(&self) -> impl Iterator<Item = &Peer> {
        self.discovered.values()
    }

    /// The confirmed target peer, once found.
    pub fn target_found(&self) -> Option<&Peer> {
        self.target_found.as_ref()
    }

    fn resolve_if_target_present(&mut self) -> bool {
        if let Some(found) = self.discovered.get(&self.target).cloned() {
            self.target_found = Some(found);
            true
        } else {
            false
        }
    }

    fn transition_fulfilled(&mut self) {
        self.status = LookupStatus::Fulfilled;
        if let Some(cb) = self.on_success.take() {
            let peer = self
                .target_found
                .clone()
                .expect("fulfilled transition requires a found target");
            cb(peer);
        }
    }

    fn transition_expired(&mut self) {
        self.status = LookupStatus::Expired;
        if let Some(cb) = self.on_failure.take() {
            cb();
        }
    }

    /// Select up to `alpha` peers to query this round: candidates in
    /// `discovered \ queried` that are closer to the target than the best
    /// peer already queried, or (if none are closer) the `alpha` closest
    /// unqueried candidates. Ties break on lowest numeric id. Selected
    /// peers are marked queried and outstanding.
    pub fn select_round_peers(&mut self) -> Vec<Peer> {
        if self.is_terminal() {
            return Vec::new();
        }

        let mut candidates: Vec<Peer> = self
            .discovered
            .values()
            .filter(|p| !self.queried.contains(&p.id()))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.id()
                .distance(&self.target)
                .cmp(&b.id().distance(&self.target))
                .then_with(|| a.id().cmp(&b.id()))
        });

        let selected: Vec<Peer> = if let Some(best) = self.best_known_distance {
            let closer: Vec<Peer> = candidates
                .iter()
                .filter(|p| p.id().distance(&self.target) < best)
                .take(self.alpha)
                .cloned()
                .collect();
            if closer.is_empty() {
                candidates.into_iter().take(self.alpha).collect()
            } else {
                closer
            }
        } else {
            candidates.into_iter().take(self.alpha).collect()
        };

        let now = Instant::now();
        for peer in &selected {
            self.queried.insert(peer.id());
            self.outstanding.insert(peer.id(), now);
        }
        selected
    }

    /// Apply a response from `responder`, carrying up to `k` peers it
    /// believes are near the target.
    pub fn handle_response(&mut self, responder: NodeId, returned: Vec<Peer>) -> LookupEvent {
        if self.is_terminal() {
            // Late response: merge discoveries for future use, fire nothing.
            for peer in returned {
                self.discovered.entry(peer.id()).or_insert(peer);
            }
            return match self.status {
                LookupStatus::Fulfilled => LookupEvent::Fulfilled,
                LookupStatus::Expired => LookupEvent::Expired,
                LookupStatus::Pending => unreachable!("is_terminal() guards this arm"),
            };
        }

        self.outstanding.remove(&responder);
        self.fulfilled.insert(responder);

        let pre_round_best = self.closest_unqueried_distance();
        for peer in returned.into_iter().take(self.k) {
            if peer.id() != self.local_id {
                self.discovered.entry(peer.id()).or_insert(peer);
            }
        }

        if self.resolve_if_target_present() {
            self.transition_fulfilled();
            return LookupEvent::Fulfilled;
        }

        if !self.outstanding.is_empty() {
            return LookupEvent::StillPending;
        }

        // Round complete: no outstanding requests remain.
        if self.recursive {
            let post_round_best = self.closest_unqueried_distance();
            let progressed = match (pre_round_best, post_round_best) {
                (Some(pre), Some(post)) => post < pre,
                (None, Some(_)) => true,
                _ => false,
            };
            if progressed {
                self.best_known_distance = post_round_best;
                return LookupEvent::StartNextRound;
            }
        }

        self.transition_expired();
        LookupEvent::Expired
    }

    fn closest_unqueried_distance(&self) -> Option<u32> {
        self.discovered
            .values()
            .filter(|p| !self.queried.contains(&p.id()))
            .map(|p| p.id().distance(&self.target))
            .min()
    }

    /// Account for a per-query timeout: the peer is moved from outstanding
    /// to fulfilled without contributing discoveries.
    pub fn handle_query_timeout(&mut self, peer_id: NodeId) -> LookupEvent {
        if self.is_terminal() || self.outstanding.remove(&peer_id).is_none() {
            return match self.status {
                LookupStatus::Fulfilled => LookupEvent::Fulfilled,
                LookupStatus::Expired => LookupEvent::Expired,
                LookupStatus::Pending => LookupEvent::StillPending,
            };
        }
        self.fulfilled.insert(peer_id);
        if !self.outstanding.is_empty() {
            return LookupEvent::StillPending;
        }
        if self.recursive {
            let post_round_best = self.closest_unqueried_distance();
            if post_round_best.is_some()
                && (self.best_known_distance.is_none()
                    || post_round_best < self.best_known_distance)
            {
                self.best_known_distance = post_round_best;
                return LookupEvent::StartNextRound;
            }
        }
        self.transition_expired();
        LookupEvent::Expired
    }

    /// Peers that have per-query timeouts overdue as of `now`.
    pub fn overdue_peers(&self, now: Instant) -> Vec<NodeId> {
        self.outstanding
            .iter()
            .filter(|(_, dispatched_at)| now.duration_since(**dispatched_at) >= self.per_query_timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Force expiration when the global deadline is reached. No-op if
    /// already terminal.
    pub fn check_global_expiration(&mut self, now: Instant) -> bool {
        if self.is_terminal() || now < self.expiration_ts {
            return false;
        }
        self.transition_expired();
        true
    }
}
