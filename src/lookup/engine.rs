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

//! The concurrent lookup registry: owns every in-flight [`LookupState`],
//! routes inbound responses to the right one by [`LookupId`], and drives
//! round dispatch through a caller-supplied [`Dispatcher`].

use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::{IntCounterVec, IntGauge};

use crate::identity::{NodeId, Peer};
use crate::routing::RoutingTable;

use super::builder::LookupBuilder;
use super::state::{LookupEvent, LookupId, LookupState, LookupStatus};

/// Sends a `FindNode(target)` request to `peer`, correlated by `lookup_id`.
/// Implemented by the node glue, which owns the actual transport.
pub trait Dispatcher {
    /// Dispatch one request. Failures are expected to surface later as a
    /// per-query timeout rather than an immediate error here.
    fn send_find_node(&self, peer: &Peer, lookup_id: LookupId, target: NodeId);
}

/// Owns every lookup currently in flight for one node.
#[derive(Default)]
pub struct LookupEngine {
    lookups: DashMap<LookupId, Mutex<LookupState>>,
    pending_gauge: Option<IntGauge>,
    resolved_counter: Option<IntCounterVec>,
}

impl LookupEngine {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that also reports pending/resolved counts
    /// through `pending_gauge` and `resolved_counter` (labeled `outcome`).
    pub fn with_metrics(pending_gauge: IntGauge, resolved_counter: IntCounterVec) -> Self {
        Self {
            pending_gauge: Some(pending_gauge),
            resolved_counter: Some(resolved_counter),
            ..Self::default()
        }
    }

    fn refresh_pending_gauge(&self) {
        if let Some(gauge) = &self.pending_gauge {
            let pending = self
                .lookups
                .iter()
                .filter(|entry| !entry.value().lock().is_terminal())
                .count();
            gauge.set(pending as i64);
        }
    }

    /// Number of lookups currently tracked (pending or terminal but not
    /// yet reaped).
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    /// Whether the registry holds no lookups.
    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Commit a new lookup against `table` and dispatch its first round
    /// through `dispatcher`. Returns the assigned [`LookupId`].
    pub fn commit(
        &self,
        builder: LookupBuilder,
        table: &RoutingTable,
        dispatcher: &impl Dispatcher,
    ) -> LookupId {
        let mut state = builder.commit(table);
        let id = state.id();
        if !state.is_terminal() {
            self.dispatch_round(&mut state, dispatcher);
        }
        self.lookups.insert(id, Mutex::new(state));
        self.refresh_pending_gauge();
        id
    }

    fn dispatch_round(&self, state: &mut LookupState, dispatcher: &impl Dispatcher) {
        let target = state.target();
        let lookup_id = state.id();
        for peer in state.select_round_peers() {
            dispatcher.send_find_node(&peer, lookup_id, target);
        }
    }

    /// Feed an inbound `Neighbours` response into the lookup it correlates
    /// with. No-op if the lookup id is unknown (e.g. already reaped).
    pub fn handle_response(
        &self,
        lookup_id: LookupId,
        responder: NodeId,
        returned: Vec<Peer>,
        table: &RoutingTable,
        dispatcher: &impl Dispatcher,
    ) {
        {
            let Some(entry) = self.lookups.get(&lookup_id) else {
                return;
            };
            let mut state = entry.lock();
            for peer in &returned {
                let _ = table.announce(peer.clone());
            }
            match state.handle_response(responder, returned) {
                LookupEvent::StartNextRound => self.dispatch_round(&mut state, dispatcher),
                LookupEvent::StillPending | LookupEvent::Fulfilled | LookupEvent::Expired => {}
            }
        }
        self.refresh_pending_gauge();
    }

    /// Sweep overdue per-query timeouts and the global expiration for every
    /// tracked lookup. Call periodically (e.g. from the node's ticking
    /// interval).
    pub fn tick(&self, now: Instant, dispatcher: &impl Dispatcher) {
        for entry in self.lookups.iter() {
            let mut state = entry.lock();
            if state.is_terminal() {
                continue;
            }
            if state.check_global_expiration(now) {
                continue;
            }
            for peer_id in state.overdue_peers(now) {
                if let LookupEvent::StartNextRound = state.handle_query_timeout(peer_id) {
                    self.dispatch_round(&mut state, dispatcher);
                }
            }
        }
        self.refresh_pending_gauge();
    }

    /// Drop every lookup that has reached a terminal state, returning how
    /// many were removed.
    pub fn reap_terminal(&self) -> usize {
        let terminal: Vec<(LookupId, LookupStatus)> = self
            .lookups
            .iter()
            .filter_map(|entry| {
                let state = entry.value().lock();
                state.is_terminal().then(|| (*entry.key(), state.status()))
            })
            .collect();
        for (id, status) in &terminal {
            self.lookups.remove(id);
            if let Some(counter) = &self.resolved_counter {
                counter.with_label_values(&[resolved_label(*status)]).inc();
            }
        }
        self.refresh_pending_gauge();
        terminal.len()
    }
}

fn resolved_label(status: LookupStatus) -> &'static str {
    match status {
        LookupStatus::Fulfilled => "fulfilled",
        LookupStatus::Expired => "expired",
        LookupStatus::Pending => "pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn peer() -> Peer {
        let sk = PrivateKey::generate(2048).unwrap();
        Peer::new(sk.public_key(), None).unwrap()
    }

    struct RecordingDispatcher {
        sent: StdMutex<Vec<(NodeId, LookupId)>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn send_find_node(&self, peer: &Peer, lookup_id: LookupId, _target: NodeId) {
            self.sent.lock().unwrap().push((peer.id(), lookup_id));
        }
    }

    #[test]
    fn commit_dispatches_first_round() {
        let local = peer().id();
        let table = RoutingTable::new(local, 20);
        for _ in 0..5 {
            table.announce(peer()).unwrap();
        }
        let dispatcher = RecordingDispatcher {
            sent: StdMutex::new(Vec::new()),
        };
        let engine = LookupEngine::new();
        let builder = LookupBuilder::new(peer().id());
        let id = engine.commit(builder, &table, &dispatcher);
        assert_eq!(engine.len(), 1);
        let sent = dispatcher.sent.lock().unwrap();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|(_, lid)| *lid == id));
    }

    #[test]
    fn metrics_track_pending_and_resolved_outcomes() {
        let pending_gauge = IntGauge::new("test_lookups_pending", "test").unwrap();
        let resolved_counter = IntCounterVec::new(
            prometheus::Opts::new("test_lookups_resolved_total", "test"),
            &["outcome"],
        )
        .unwrap();
        let engine = LookupEngine::with_metrics(pending_gauge.clone(), resolved_counter.clone());
        let dispatcher = RecordingDispatcher {
            sent: StdMutex::new(Vec::new()),
        };

        let local = peer().id();
        let table = RoutingTable::new(local, 20);
        for _ in 0..5 {
            table.announce(peer()).unwrap();
        }
        let _id = engine.commit(LookupBuilder::new(peer().id()), &table, &dispatcher);
        assert_eq!(pending_gauge.get(), 1);

        // An empty table resolves synchronously as Expired inside commit().
        let empty_table = RoutingTable::new(peer().id(), 20);
        let _expired = engine.commit(
            LookupBuilder::new(peer().id()),
            &empty_table,
            &dispatcher,
        );
        assert_eq!(engine.reap_terminal(), 1);
        assert_eq!(
            resolved_counter.with_label_values(&["expired"]).get(),
            1
        );
        assert_eq!(pending_gauge.get(), 1);
    }

    #[test]
    fn reap_terminal_clears_resolved_lookups() {
        let local = peer().id();
        let table = RoutingTable::new(local, 20);
        let dispatcher = RecordingDispatcher {
            sent: StdMutex::new(Vec::new()),
        };
        let engine = LookupEngine::new();
        let count = AtomicUsize::new(0);
        let builder = LookupBuilder::new(peer().id()).on_failure(|| {});
        let _id = engine.commit(builder, &table, &dispatcher);
        let _ = count.load(Ordering::SeqCst);
        // Empty table resolves synchronously as Expired inside commit().
        assert_eq!(engine.reap_terminal(), 1);
        assert!(engine.is_empty());
    }
}
