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

//! Broadcast forwarding: dedup against the process-wide LRU, decrement and
//! clamp ttl, fan out to every known peer but the observed sender.

use std::net::SocketAddr;

use uuid::Uuid;

use crate::codec::{encode_frame, encode_packet, kinds, BroadcastPayload, Packet};
use crate::routing::NUM_BUCKETS;

use super::{Node, Transport};

pub(super) fn handle_inbound<T: Transport>(node: &Node<T>, src: SocketAddr, packet: Packet) {
    let Some(body) = packet.payload.as_any().downcast_ref::<BroadcastPayload>() else {
        return;
    };
    if !node.dedup.lock().observe(packet.id) {
        node.metrics.broadcasts_deduped_total.inc();
        return;
    }

    let remaining = packet.ttl.unwrap_or(0).saturating_sub(1);
    if remaining == 0 {
        node.metrics.broadcasts_dropped_total.inc();
        return;
    }

    forward(node, src, packet.id, remaining.min(node.tuning.max_broadcast_ttl), &body.body);
}

/// Originate a new broadcast from this node.
pub(super) fn originate<T: Transport>(node: &Node<T>, body: Vec<u8>) {
    let id = Uuid::new_v4();
    node.dedup.lock().observe(id);
    forward(node, dead_sender(), id, node.tuning.max_broadcast_ttl, &body);
}

/// No real peer ever binds to this; it only exists so `originate` can
/// reuse `forward`'s "skip the sender" filter without excluding anyone.
fn dead_sender() -> SocketAddr {
    "0.0.0.0:0".parse().expect("valid socket address literal")
}

fn forward<T: Transport>(node: &Node<T>, sender: SocketAddr, id: Uuid, ttl: u16, body: &[u8]) {
    let payload = BroadcastPayload {
        body: body.to_vec(),
    };
    let Ok(bytes) = encode_packet(kinds::BROADCAST, id, Some(ttl), &payload) else {
        return;
    };
    let frame = encode_frame(&bytes);

    let mut forwarded = false;
    for distance in 1..=NUM_BUCKETS as u32 {
        let Ok(peers) = node.table.get_nodes(distance) else {
            continue;
        };
        for peer in peers {
            let Some(addr) = peer.address() else {
                continue;
            };
            if addr == sender {
                continue;
            }
            node.transport.send(addr, frame.clone());
            forwarded = true;
        }
    }
    if forwarded {
        node.metrics.broadcasts_forwarded_total.inc();
    }
}
