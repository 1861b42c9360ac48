use std::net::SocketAddr;
use std::sync::Arc;

use kadnet::codec::{encode_packet, kinds, AnnouncementPayload, BroadcastPayload, FrameDecoder, Version};
use kadnet::config::RoutingTuning;
use kadnet::identity::{LocalNode, NodeId};
use kadnet::lookup::LookupBuilder;
use kadnet::metrics::Metrics;
use kadnet::node::{InMemoryTransport, Node};

/// Strip the length-delimited frame a node's transport wraps every send in,
/// recovering the raw packet bytes `Node::receive` expects.
fn deframe(framed: &[u8]) -> Vec<u8> {
    let mut decoder = FrameDecoder::new();
    decoder.feed(framed);
    let mut frames = decoder.drain_frames().unwrap();
    assert_eq!(frames.len(), 1);
    frames.pop().unwrap()
}

fn make_node() -> (Node<InMemoryTransport>, Arc<InMemoryTransport>) {
    let transport = Arc::new(InMemoryTransport::new());
    let node = Node::new(
        LocalNode::generate(2048).unwrap(),
        RoutingTuning::default(),
        Metrics::new().unwrap(),
        transport.clone(),
    );
    (node, transport)
}

fn announcement_bytes(node: &Node<InMemoryTransport>) -> Vec<u8> {
    let payload = AnnouncementPayload {
        version: Version::new(1, 0, 0),
        public_key_der: node.local().public_key().to_spki_der().unwrap(),
    };
    encode_packet(kinds::ANNOUNCEMENT, uuid::Uuid::new_v4(), None, &payload).unwrap()
}

#[test]
fn announce_then_find_node_round_trips_between_two_nodes() {
    let (node_a, transport_a) = make_node();
    let (node_b, transport_b) = make_node();
    let addr_a: SocketAddr = "127.0.0.1:4001".parse().unwrap();
    let addr_b: SocketAddr = "127.0.0.1:4002".parse().unwrap();

    // Each side learns the other's identity and address via an announcement.
    node_b.receive(addr_a, announcement_bytes(&node_a));
    assert!(node_b.table().get_node(node_a.local().id()).is_some());

    node_a.receive(addr_b, announcement_bytes(&node_b));
    assert!(node_a.table().get_node(node_b.local().id()).is_some());

    // A looks up an arbitrary target; the only peer it knows is B, so the
    // first round's FindNode should go straight to B's address.
    let target = NodeId::from_u128(42);
    node_a.start_lookup(LookupBuilder::new(target));
    let sent_by_a = transport_a.sent();
    assert_eq!(sent_by_a.len(), 1);
    assert_eq!(sent_by_a[0].0, addr_b);

    // Feeding that request into B should produce exactly one Neighbours
    // reply addressed back to A.
    node_b.receive(addr_a, deframe(&sent_by_a[0].1));
    let sent_by_b = transport_b.sent();
    assert_eq!(sent_by_b.len(), 1);
    assert_eq!(sent_by_b[0].0, addr_a);
}

#[test]
fn broadcast_propagates_once_per_peer_and_respects_ttl_floor() {
    let (node_a, transport_a) = make_node();
    let (node_b, _transport_b) = make_node();
    let (node_c, _transport_c) = make_node();
    let addr_a: SocketAddr = "127.0.0.1:5001".parse().unwrap();
    let addr_b: SocketAddr = "127.0.0.1:5002".parse().unwrap();
    let addr_c: SocketAddr = "127.0.0.1:5003".parse().unwrap();

    node_a.receive(addr_b, announcement_bytes(&node_b));
    node_a.receive(addr_c, announcement_bytes(&node_c));

    let payload = BroadcastPayload {
        body: b"gossip".to_vec(),
    };
    let id = uuid::Uuid::new_v4();
    let bytes = encode_packet(kinds::BROADCAST, id, Some(2), &payload).unwrap();

    // A receives the broadcast as if from some fourth, unaddressed peer; it
    // should forward to both B and C exactly once.
    let origin: SocketAddr = "127.0.0.1:5099".parse().unwrap();
    node_a.receive(origin, bytes.clone());
    let sent = transport_a.sent();
    assert_eq!(sent.len(), 2);
    let destinations: Vec<SocketAddr> = sent.iter().map(|(addr, _)| *addr).collect();
    assert!(destinations.contains(&addr_b));
    assert!(destinations.contains(&addr_c));

    // The same packet id arriving again is suppressed outright.
    node_a.receive(origin, bytes);
    assert_eq!(transport_a.sent().len(), 2);
    assert_eq!(node_a.metrics().broadcasts_deduped_total.get(), 1);
}

#[test]
fn broadcast_with_ttl_one_is_not_forwarded() {
    let (node_a, transport_a) = make_node();
    let (node_b, _transport_b) = make_node();
    let addr_b: SocketAddr = "127.0.0.1:6002".parse().unwrap();
    node_a.receive(addr_b, announcement_bytes(&node_b));

    let payload = BroadcastPayload {
        body: b"dying".to_vec(),
    };
    let bytes = encode_packet(kinds::BROADCAST, uuid::Uuid::new_v4(), Some(1), &payload).unwrap();
    let origin: SocketAddr = "127.0.0.1:6099".parse().unwrap();
    node_a.receive(origin, bytes);

    assert!(transport_a.sent().is_empty());
    assert_eq!(node_a.metrics().broadcasts_dropped_total.get(), 1);
}
