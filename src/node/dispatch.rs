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

//! Routes a decoded inbound [`Packet`] to the subsystem that owns its
//! kind: C4 `announce`, C5 lookup state by [`LookupId`], or the liveness
//! tracker. Unrecognized kinds are logged and dropped.

use std::net::SocketAddr;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{
    encode_frame, encode_packet, kinds, AnnouncementPayload, FindNodePayload, HandshakePayload,
    NeighbourEntry, NeighboursPayload, Packet, PongPayload,
};
use crate::identity::Peer;

use super::{Node, Transport};

/// Everything [`dispatch`] needs to decide the reply, supplied inline to
/// keep this function free of `Node`'s generic transport parameter.
pub(super) fn dispatch<T: Transport>(node: &Node<T>, src: SocketAddr, packet: Packet) {
    match packet.kind.as_str() {
        kind if kind == kinds::HANDSHAKE => {
            if let Some(handshake) = packet.payload.as_any().downcast_ref::<HandshakePayload>() {
                debug!(%src, version = ?handshake.version, "handshake received");
            }
        }
        kind if kind == kinds::ANNOUNCEMENT => {
            if let Some(announcement) = packet.payload.as_any().downcast_ref::<AnnouncementPayload>() {
                announce_from_wire(node, &announcement.public_key_der, Some(src));
            }
        }
        kind if kind == kinds::FIND_NODE => {
            if let Some(request) = packet.payload.as_any().downcast_ref::<FindNodePayload>() {
                reply_neighbours(node, src, request);
            }
        }
        kind if kind == kinds::NEIGHBOURS => {
            if let Some(response) = packet.payload.as_any().downcast_ref::<NeighboursPayload>() {
                handle_neighbours(node, response);
            }
        }
        kind if kind == kinds::PING => {
            send_reply(node, src, kinds::PONG, &PongPayload);
        }
        kind if kind == kinds::PONG => {
            handle_pong(node, src);
        }
        kind if kind == kinds::BROADCAST => {
            super::broadcast::handle_inbound(node, src, packet);
        }
        other => {
            warn!(%src, kind = other, "dropping packet of unrecognized kind");
        }
    }
}

fn announce_from_wire<T: Transport>(node: &Node<T>, public_key_der: &[u8], addr: Option<SocketAddr>) {
    let Ok(public_key) = crate::identity::PublicKey::from_spki_der(public_key_der) else {
        node.metrics
            .crypto_failures_total
            .with_label_values(&["malformed_key"])
            .inc();
        warn!("dropping announcement with malformed key");
        return;
    };
    let Ok(peer) = Peer::new(public_key, addr) else {
        node.metrics
            .crypto_failures_total
            .with_label_values(&["unverifiable_identity"])
            .inc();
        warn!("dropping announcement with unverifiable identity");
        return;
    };
    if let Err(e) = node.table.announce(peer) {
        warn!(error = %e, "announce failed");
    }
}

fn handle_pong<T: Transport>(node: &Node<T>, src: SocketAddr) {
    let Some(peer) = node.table.find_by_address(src) else {
        debug!(%src, "pong from unknown address");
        return;
    };
    node.outstanding_pings.lock().remove(&peer.id());
}

fn reply_neighbours<T: Transport>(node: &Node<T>, src: SocketAddr, request: &FindNodePayload) {
    let candidate_limit = node.tuning.alpha * node.tuning.k;
    let closest = node
        .table
        .get_closest_nodes(request.target, node.tuning.k, candidate_limit);
    let nodes = closest
        .into_iter()
        .filter_map(|peer| {
            peer.public_key()
                .to_spki_der()
                .ok()
                .map(|der| NeighbourEntry {
                    id: peer.id(),
                    public_key_der: der,
                    address: peer.address(),
                })
        })
        .collect();
    let response = NeighboursPayload {
        lookup_id: request.lookup_id,
        nodes,
    };
    send_reply(node, src, kinds::NEIGHBOURS, &response);
}

fn handle_neighbours<T: Transport>(node: &Node<T>, response: &NeighboursPayload) {
    let mut returned = Vec::with_capacity(response.nodes.len());
    for entry in &response.nodes {
        let Ok(public_key) = crate::identity::PublicKey::from_spki_der(&entry.public_key_der)
        else {
            continue;
        };
        if let Ok(peer) = Peer::new(public_key, entry.address) {
            returned.push(peer);
        }
    }
    let responder = returned
        .first()
        .map(|p| p.id())
        .unwrap_or_else(|| crate::identity::NodeId::from_u128(0));
    node.lookups.handle_response(
        response.lookup_id,
        responder,
        returned,
        &node.table,
        &node.dispatcher(),
    );
}

fn send_reply<T: Transport>(
    node: &Node<T>,
    dest: SocketAddr,
    kind: &str,
    payload: &dyn crate::codec::PacketPayload,
) {
    let Ok(bytes) = encode_packet(kind, Uuid::new_v4(), None, payload) else {
        return;
    };
    node.transport.send(dest, encode_frame(&bytes));
}
