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

//! Node glue: wires the codec, identity, routing table, and lookup engine
//! together into a runnable event loop, generalized from the teacher's
//! libp2p swarm poll to a transport-agnostic inbound-frame channel plus a
//! ticking interval.

mod broadcast;
mod dispatch;
pub mod dedup;
pub mod transport;

pub use dedup::BroadcastDedup;
pub use transport::{InMemoryTransport, Transport};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::codec::{
    decode_packet, default_registry, encode_frame, encode_packet, kinds, FindNodePayload,
    PacketError, PacketRegistry, PingPayload,
};
use crate::config::RoutingTuning;
use crate::identity::{LocalNode, NodeId, Peer};
use crate::lookup::{Dispatcher, LookupBuilder, LookupEngine, LookupId};
use crate::metrics::Metrics;
use crate::routing::{RoutingTable, NUM_BUCKETS};

/// A running overlay node: owns the local identity, routing table, lookup
/// registry, and dedup state, and drives them from inbound frames and
/// periodic ticks.
pub struct Node<T: Transport> {
    local: LocalNode,
    table: RoutingTable,
    lookups: LookupEngine,
    registry: PacketRegistry,
    metrics: Metrics,
    dedup: Mutex<BroadcastDedup>,
    transport: Arc<T>,
    tuning: RoutingTuning,
    outstanding_pings: Mutex<HashMap<NodeId, Instant>>,
}

impl<T: Transport> Node<T> {
    /// Construct a node around a local identity and transport, tuned by
    /// `tuning`.
    pub fn new(local: LocalNode, tuning: RoutingTuning, metrics: Metrics, transport: Arc<T>) -> Self {
        let table = RoutingTable::with_metrics(
            local.id(),
            tuning.k,
            metrics.routing_table_occupancy.clone(),
        );
        let lookups = LookupEngine::with_metrics(
            metrics.lookups_pending.clone(),
            metrics.lookups_resolved_total.clone(),
        );
        let dedup = Mutex::new(BroadcastDedup::new(tuning.broadcast_dedup_capacity));
        Self {
            local,
            table,
            lookups,
            registry: default_registry(),
            metrics,
            dedup,
            transport,
            tuning,
            outstanding_pings: Mutex::new(HashMap::new()),
        }
    }

    /// This node's own identity.
    pub fn local(&self) -> &LocalNode {
        &self.local
    }

    /// The routing table backing this node.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// The lookup engine backing this node.
    pub fn lookups(&self) -> &LookupEngine {
        &self.lookups
    }

    /// The metrics this node reports against.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn dispatcher(&self) -> NodeDispatcher<'_, T> {
        NodeDispatcher {
            transport: &self.transport,
        }
    }

    /// Commit a new iterative lookup and dispatch its first round.
    pub fn start_lookup(&self, builder: LookupBuilder) -> LookupId {
        self.lookups.commit(builder, &self.table, &self.dispatcher())
    }

    /// Originate a gossip broadcast from this node.
    pub fn broadcast(&self, body: Vec<u8>) {
        broadcast::originate(self, body);
    }

    /// Decode and route one inbound, already de-framed packet.
    pub fn receive(&self, src: SocketAddr, packet_bytes: Vec<u8>) {
        match decode_packet(&self.registry, packet_bytes) {
            Ok(packet) => dispatch::dispatch(self, src, packet),
            Err(e) => {
                self.metrics
                    .frames_dropped_total
                    .with_label_values(&[packet_error_kind(&e)])
                    .inc();
                warn!(%src, error = %e, "dropping undecodable frame");
            }
        }
    }

    /// Send a liveness ping to every peer the routing table currently
    /// knows an address for.
    pub fn ping_known_peers(&self) {
        for distance in 1..=NUM_BUCKETS as u32 {
            let Ok(peers) = self.table.get_nodes(distance) else {
                continue;
            };
            for peer in peers {
                self.ping(&peer);
            }
        }
    }

    fn ping(&self, peer: &Peer) {
        let Some(addr) = peer.address() else {
            return;
        };
        let Ok(bytes) = encode_packet(kinds::PING, uuid::Uuid::new_v4(), None, &PingPayload) else {
            return;
        };
        self.outstanding_pings.lock().insert(peer.id(), Instant::now());
        self.transport.send(addr, encode_frame(&bytes));
    }

    /// Sweep the lookup registry for overdue per-query timeouts and global
    /// expirations, then reap every lookup that reached a terminal state.
    pub fn tick_lookups(&self, now: Instant) {
        self.lookups.tick(now, &self.dispatcher());
        self.lookups.reap_terminal();
    }

    /// Demote every peer whose liveness ping has gone unanswered past
    /// `tuning.ping_timeout()`, clearing it from the outstanding set either
    /// way.
    pub fn tick_pings(&self, now: Instant) {
        let timeout = self.tuning.ping_timeout();
        let overdue: Vec<NodeId> = {
            let outstanding = self.outstanding_pings.lock();
            outstanding
                .iter()
                .filter(|(_, &sent_at)| now.saturating_duration_since(sent_at) >= timeout)
                .map(|(id, _)| *id)
                .collect()
        };
        if overdue.is_empty() {
            return;
        }
        let mut outstanding = self.outstanding_pings.lock();
        for id in overdue {
            outstanding.remove(&id);
            self.table.demote(id);
        }
    }

    /// Drive this node from an inbound packet channel until it closes: a
    /// ticking interval drains overdue lookups and refreshes liveness,
    /// mirroring the teacher's `tokio::select!`-driven swarm loop. The
    /// embedder is responsible for de-framing its transport's byte stream
    /// into discrete packets before they reach this channel.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<(SocketAddr, Vec<u8>)>) {
        let mut ping_interval = tokio::time::interval(self.tuning.ping_interval());
        let mut lookup_interval = tokio::time::interval(Duration::from_millis(500));

        loop {
            tokio::select! {
                maybe_packet = inbound.recv() => {
                    match maybe_packet {
                        Some((src, bytes)) => self.receive(src, bytes),
                        None => {
                            warn!("inbound packet channel closed; node loop exiting");
                            break;
                        }
                    }
                }
                _ = ping_interval.tick() => self.ping_known_peers(),
                _ = lookup_interval.tick() => {
                    self.tick_lookups(Instant::now());
                    self.tick_pings(Instant::now());
                }
            }
        }
    }
}

struct NodeDispatcher<'a, T: Transport> {
    transport: &'a Arc<T>,
}

impl<T: Transport> Dispatcher for NodeDispatcher<'_, T> {
    fn send_find_node(&self, peer: &Peer, lookup_id: LookupId, target: NodeId) {
        let Some(addr) = peer.address() else {
            return;
        };
        let payload = FindNodePayload { lookup_id, target };
        let Ok(bytes) = encode_packet(kinds::FIND_NODE, uuid::Uuid::new_v4(), None, &payload) else {
            return;
        };
        self.transport.send(addr, encode_frame(&bytes));
    }
}

fn packet_error_kind(err: &PacketError) -> &'static str {
    match err {
        PacketError::UnknownKind(_) => "unknown_kind",
        PacketError::Decode(_) => "decode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateKey;

    fn local_node() -> LocalNode {
        LocalNode::generate(2048).unwrap()
    }

    fn remote_peer(addr: &str) -> Peer {
        let sk = PrivateKey::generate(2048).unwrap();
        Peer::new(sk.public_key(), Some(addr.parse().unwrap())).unwrap()
    }

    fn new_node() -> Node<InMemoryTransport> {
        Node::new(
            local_node(),
            RoutingTuning::default(),
            Metrics::new().unwrap(),
            Arc::new(InMemoryTransport::new()),
        )
    }

    #[test]
    fn ping_known_peers_sends_to_every_addressed_peer() {
        let node = new_node();
        node.table.announce(remote_peer("10.0.0.1:9000")).unwrap();
        node.table.announce(remote_peer("10.0.0.2:9000")).unwrap();
        node.ping_known_peers();
        assert_eq!(node.transport.sent().len(), 2);
    }

    #[test]
    fn announcement_frame_registers_sender_as_known() {
        let node = new_node();
        let remote_sk = PrivateKey::generate(2048).unwrap();
        let remote_pk = remote_sk.public_key();
        let der = remote_pk.to_spki_der().unwrap();
        let payload = crate::codec::AnnouncementPayload {
            version: crate::codec::Version::new(1, 0, 0),
            public_key_der: der,
        };
        let bytes =
            encode_packet(kinds::ANNOUNCEMENT, uuid::Uuid::new_v4(), None, &payload).unwrap();
        let src: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        node.receive(src, bytes);
        let remote_id = NodeId::from_public_key_der(&remote_pk.to_spki_der().unwrap());
        assert!(node.table.get_node(remote_id).is_some());
    }

    #[test]
    fn find_node_request_gets_a_neighbours_reply() {
        let node = new_node();
        node.table.announce(remote_peer("10.0.0.1:9000")).unwrap();
        let request = FindNodePayload {
            lookup_id: uuid::Uuid::new_v4(),
            target: NodeId::from_u128(1),
        };
        let bytes =
            encode_packet(kinds::FIND_NODE, uuid::Uuid::new_v4(), None, &request).unwrap();
        let src: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        node.receive(src, bytes);
        let sent = node.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, src);
    }

    #[test]
    fn broadcast_is_forwarded_to_peers_other_than_the_sender() {
        let node = new_node();
        let sender_addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        node.table.announce(remote_peer("10.0.0.1:9000")).unwrap();
        node.table.announce(remote_peer("10.0.0.2:9000")).unwrap();
        let payload = crate::codec::BroadcastPayload {
            body: b"hello".to_vec(),
        };
        let bytes =
            encode_packet(kinds::BROADCAST, uuid::Uuid::new_v4(), Some(4), &payload).unwrap();
        node.receive(sender_addr, bytes);
        let sent = node.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_ne!(sent[0].0, sender_addr);
    }

    #[test]
    fn ping_records_an_outstanding_entry() {
        let node = new_node();
        let peer = remote_peer("10.0.0.1:9000");
        let id = peer.id();
        node.table.announce(peer).unwrap();
        node.ping_known_peers();
        assert!(node.outstanding_pings.lock().contains_key(&id));
    }

    #[test]
    fn pong_from_known_address_clears_the_outstanding_entry() {
        let node = new_node();
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let peer = remote_peer("10.0.0.1:9000");
        let id = peer.id();
        node.table.announce(peer).unwrap();
        node.ping_known_peers();
        assert!(node.outstanding_pings.lock().contains_key(&id));

        let bytes = encode_packet(kinds::PONG, uuid::Uuid::new_v4(), None, &crate::codec::PongPayload)
            .unwrap();
        node.receive(addr, bytes);
        assert!(!node.outstanding_pings.lock().contains_key(&id));
    }

    #[test]
    fn overdue_ping_demotes_the_peer() {
        let node = new_node();
        let peer = remote_peer("10.0.0.1:9000");
        let id = peer.id();
        node.table.announce(peer).unwrap();
        node.ping_known_peers();
        assert!(node.outstanding_pings.lock().contains_key(&id));

        let past_timeout = Instant::now() + node.tuning.ping_timeout() + Duration::from_millis(1);
        node.tick_pings(past_timeout);

        assert!(!node.outstanding_pings.lock().contains_key(&id));
        let stored = node.table.get_node(id).unwrap();
        assert!(!stored.directly_connected());
        assert_eq!(stored.address(), None);
    }

    #[test]
    fn repeated_broadcast_id_is_deduped() {
        let node = new_node();
        node.table.announce(remote_peer("10.0.0.2:9000")).unwrap();
        let payload = crate::codec::BroadcastPayload {
            body: b"hello".to_vec(),
        };
        let id = uuid::Uuid::new_v4();
        let bytes = encode_packet(kinds::BROADCAST, id, Some(4), &payload).unwrap();
        let src: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        node.receive(src, bytes.clone());
        node.receive(src, bytes);
        assert_eq!(node.transport.sent().len(), 1);
        assert_eq!(node.metrics.broadcasts_deduped_total.get(), 1);
    }
}
