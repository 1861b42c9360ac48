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

//! Packet kinds, the registry mapping identifier strings to decoder
//! factories, and the envelope codec layered above [`super::frame`].

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

use crate::identity::NodeId;

use super::buffer::{Buffer, DecodeError, StorageValue, Version};

/// A fully decoded packet: its correlation id, registered kind, optional
/// broadcast time-to-live, and payload.
#[derive(Debug)]
pub struct Packet {
    /// Deduplication/correlation id, assigned at construction.
    pub id: Uuid,
    /// The registered identifier string this packet decoded under.
    pub kind: String,
    /// Present only for broadcast kinds.
    pub ttl: Option<u16>,
    /// The decoded payload.
    pub payload: Box<dyn PacketPayload>,
}

/// One concrete packet body: knows how to write itself after the common
/// header.
pub trait PacketPayload: fmt::Debug + Send + Sync + std::any::Any {
    /// Write this payload's fields (the header is written separately).
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError>;

    /// Narrow back to the concrete payload type for dispatch by kind.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Builds a [`PacketPayload`] from the buffer positioned just after the
/// common header.
pub type DecoderFn = fn(&mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError>;

/// Errors encoding or decoding at the packet layer.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The wire identifier did not match any registered kind.
    #[error("unknown packet kind {0:?}")]
    UnknownKind(String),
    /// A lower-level buffer decode failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Registration bookkeeping for one packet kind.
#[derive(Debug)]
struct RegisteredKind {
    broadcast: bool,
    decode: DecoderFn,
}

/// An immutable, thread-safe-for-reads table of registered packet kinds.
pub struct PacketRegistry {
    kinds: HashMap<String, RegisteredKind>,
}

impl PacketRegistry {
    /// Start building a registry.
    pub fn builder() -> PacketRegistryBuilder {
        PacketRegistryBuilder::new()
    }

    /// Whether `identifier` is registered as carrying a broadcast TTL.
    pub fn is_broadcast(&self, identifier: &str) -> Option<bool> {
        self.kinds.get(identifier).map(|k| k.broadcast)
    }

    fn decoder_for(&self, identifier: &str) -> Option<DecoderFn> {
        self.kinds.get(identifier).map(|k| k.decode)
    }
}

/// Accumulates kind registrations and validates at `register()` time.
/// Not thread-safe; produces an immutable [`PacketRegistry`] via `build()`.
#[derive(Default, Debug)]
pub struct PacketRegistryBuilder {
    kinds: HashMap<String, RegisteredKind>,
}

/// Errors from registering a packet kind.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identifier was already registered.
    #[error("duplicate packet kind registration: {0}")]
    Duplicate(String),
}

impl PacketRegistryBuilder {
    /// Start with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a packet kind's decoder. Returns an error if `identifier`
    /// is already registered.
    pub fn register(
        mut self,
        identifier: &str,
        broadcast: bool,
        decode: DecoderFn,
    ) -> Result<Self, RegistryError> {
        if self.kinds.contains_key(identifier) {
            return Err(RegistryError::Duplicate(identifier.to_string()));
        }
        self.kinds
            .insert(identifier.to_string(), RegisteredKind { broadcast, decode });
        Ok(self)
    }

    /// Finish building, producing an immutable registry.
    pub fn build(self) -> PacketRegistry {
        PacketRegistry { kinds: self.kinds }
    }
}

/// The well-known identifier strings for this protocol's built-in kinds.
pub mod kinds {
    /// Handshake: `Version` + fingerprint string.
    pub const HANDSHAKE: &str = "kadnet.handshake";
    /// Announcement: `Version` + public key.
    pub const ANNOUNCEMENT: &str = "kadnet.announcement";
    /// FindNode request.
    pub const FIND_NODE: &str = "kadnet.find_node";
    /// Neighbours response.
    pub const NEIGHBOURS: &str = "kadnet.neighbours";
    /// Liveness ping.
    pub const PING: &str = "kadnet.ping";
    /// Liveness pong.
    pub const PONG: &str = "kadnet.pong";
    /// Gossip broadcast envelope.
    pub const BROADCAST: &str = "kadnet.broadcast";
}

/// Construct the registry of built-in packet kinds.
pub fn default_registry() -> PacketRegistry {
    PacketRegistry::builder()
        .register(kinds::HANDSHAKE, false, decode_handshake)
        .and_then(|b| b.register(kinds::ANNOUNCEMENT, false, decode_announcement))
        .and_then(|b| b.register(kinds::FIND_NODE, false, decode_find_node))
        .and_then(|b| b.register(kinds::NEIGHBOURS, false, decode_neighbours))
        .and_then(|b| b.register(kinds::PING, false, decode_ping))
        .and_then(|b| b.register(kinds::PONG, false, decode_pong))
        .and_then(|b| b.register(kinds::BROADCAST, true, decode_broadcast))
        .expect("built-in packet kinds are registered exactly once")
        .build()
}

fn write_node_id(buf: &mut Buffer, id: NodeId) -> Result<(), DecodeError> {
    buf.write_uuid(Uuid::from_bytes(id.to_bytes()))
}

fn read_node_id(buf: &mut Buffer) -> Result<NodeId, DecodeError> {
    Ok(NodeId::from_bytes(*buf.read_uuid()?.as_bytes()))
}

/// `Version` + fingerprint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Protocol version the sender speaks.
    pub version: Version,
    /// A compact digest of the sender's public key.
    pub fingerprint: String,
}

impl PacketPayload for HandshakePayload {
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        self.version.write_to(buf)?;
        buf.write_string(&self.fingerprint)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_handshake(buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    let version = Version::read_from(buf)?;
    let fingerprint = buf.read_string()?;
    Ok(Box::new(HandshakePayload { version, fingerprint }))
}

/// `Version` + public key (X.509 SPKI DER bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementPayload {
    /// Protocol version the sender speaks.
    pub version: Version,
    /// The sender's public key, SPKI DER-encoded.
    pub public_key_der: Vec<u8>,
}

impl PacketPayload for AnnouncementPayload {
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        self.version.write_to(buf)?;
        buf.write_byte_array(&self.public_key_der)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_announcement(buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    let version = Version::read_from(buf)?;
    let public_key_der = buf.read_byte_array()?;
    Ok(Box::new(AnnouncementPayload {
        version,
        public_key_der,
    }))
}

/// A request to find peers near `target`, correlated by `lookup_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindNodePayload {
    /// Correlates this request with its eventual [`NeighboursPayload`].
    pub lookup_id: Uuid,
    /// The id being searched for.
    pub target: NodeId,
}

impl PacketPayload for FindNodePayload {
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        buf.write_uuid(self.lookup_id)?;
        write_node_id(buf, self.target)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_find_node(buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    let lookup_id = buf.read_uuid()?;
    let target = read_node_id(buf)?;
    Ok(Box::new(FindNodePayload { lookup_id, target }))
}

/// One peer entry within a [`NeighboursPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourEntry {
    /// The neighbour's id.
    pub id: NodeId,
    /// The neighbour's public key, SPKI DER-encoded.
    pub public_key_der: Vec<u8>,
    /// The neighbour's last-known address, if disclosed.
    pub address: Option<SocketAddr>,
}

/// A response to a [`FindNodePayload`], carrying up to `k` neighbour
/// entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighboursPayload {
    /// Correlates this response with its originating request.
    pub lookup_id: Uuid,
    /// The responder's closest known peers to the requested target.
    pub nodes: Vec<NeighbourEntry>,
}

impl PacketPayload for NeighboursPayload {
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        buf.write_uuid(self.lookup_id)?;
        buf.write_u64(self.nodes.len() as u64)?;
        for entry in &self.nodes {
            write_node_id(buf, entry.id)?;
            buf.write_byte_array(&entry.public_key_der)?;
            buf.write_socket_addr(entry.address)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_neighbours(buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    let lookup_id = buf.read_uuid()?;
    let count = buf.read_u64()? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let id = read_node_id(buf)?;
        let public_key_der = buf.read_byte_array()?;
        let address = buf.read_socket_addr()?;
        nodes.push(NeighbourEntry {
            id,
            public_key_der,
            address,
        });
    }
    Ok(Box::new(NeighboursPayload { lookup_id, nodes }))
}

/// Empty liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingPayload;

impl PacketPayload for PingPayload {
    fn write_payload(&self, _buf: &mut Buffer) -> Result<(), DecodeError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_ping(_buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    Ok(Box::new(PingPayload))
}

/// Empty liveness reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PongPayload;

impl PacketPayload for PongPayload {
    fn write_payload(&self, _buf: &mut Buffer) -> Result<(), DecodeError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_pong(_buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    Ok(Box::new(PongPayload))
}

/// A gossiped payload wrapped with a time-to-live, forwarded until `ttl`
/// reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload {
    /// Application-defined bytes being gossiped.
    pub body: Vec<u8>,
}

impl PacketPayload for BroadcastPayload {
    fn write_payload(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        buf.write_byte_array(&self.body)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn decode_broadcast(buf: &mut Buffer) -> Result<Box<dyn PacketPayload>, DecodeError> {
    let body = buf.read_byte_array()?;
    Ok(Box::new(BroadcastPayload { body }))
}

/// Encode a packet's common header and payload:
/// `string(identifier) || uuid(id) || [short(ttl) if broadcast] || payload`.
pub fn encode_packet(
    identifier: &str,
    id: Uuid,
    ttl: Option<u16>,
    payload: &dyn PacketPayload,
) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Buffer::new();
    buf.write_string(identifier)?;
    buf.write_uuid(id)?;
    if let Some(ttl) = ttl {
        buf.write_short(ttl)?;
    }
    payload.write_payload(&mut buf)?;
    Ok(buf.into_vec())
}

/// Decode a packet's common header, looking up its kind in `registry`, and
/// delegate the remaining bytes to the kind's decoder.
pub fn decode_packet(registry: &PacketRegistry, bytes: Vec<u8>) -> Result<Packet, PacketError> {
    let mut buf = Buffer::from_vec(bytes);
    let kind = buf.read_string()?;
    let broadcast = registry
        .is_broadcast(&kind)
        .ok_or_else(|| PacketError::UnknownKind(kind.clone()))?;
    let decode = registry.decoder_for(&kind).expect("kind presence checked above");
    let id = buf.read_uuid()?;
    let ttl = if broadcast { Some(buf.read_short()?) } else { None };
    let payload = decode(&mut buf)?;
    Ok(Packet {
        id,
        kind,
        ttl,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips() {
        let registry = default_registry();
        let id = Uuid::new_v4();
        let payload = HandshakePayload {
            version: Version::new(1, 2, 3),
            fingerprint: "abcdef0123456789".to_string(),
        };
        let bytes = encode_packet(kinds::HANDSHAKE, id, None, &payload).unwrap();
        let packet = decode_packet(&registry, bytes).unwrap();
        assert_eq!(packet.kind, kinds::HANDSHAKE);
        assert_eq!(packet.id, id);
        assert!(packet.ttl.is_none());
    }

    #[test]
    fn find_node_and_neighbours_round_trip() {
        let registry = default_registry();
        let lookup_id = Uuid::new_v4();
        let target = NodeId::from_u128(42);
        let request = FindNodePayload { lookup_id, target };
        let bytes = encode_packet(kinds::FIND_NODE, Uuid::new_v4(), None, &request).unwrap();
        decode_packet(&registry, bytes).unwrap();

        let response = NeighboursPayload {
            lookup_id,
            nodes: vec![NeighbourEntry {
                id: NodeId::from_u128(7),
                public_key_der: vec![1, 2, 3],
                address: Some("10.0.0.1:9000".parse().unwrap()),
            }],
        };
        let bytes = encode_packet(kinds::NEIGHBOURS, Uuid::new_v4(), None, &response).unwrap();
        let packet = decode_packet(&registry, bytes).unwrap();
        assert_eq!(packet.kind, kinds::NEIGHBOURS);
    }

    #[test]
    fn broadcast_carries_ttl() {
        let registry = default_registry();
        let payload = BroadcastPayload {
            body: b"gossip".to_vec(),
        };
        let bytes = encode_packet(kinds::BROADCAST, Uuid::new_v4(), Some(8), &payload).unwrap();
        let packet = decode_packet(&registry, bytes).unwrap();
        assert_eq!(packet.ttl, Some(8));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let registry = default_registry();
        let mut buf = Buffer::new();
        buf.write_string("not.a.real.kind").unwrap();
        buf.write_uuid(Uuid::new_v4()).unwrap();
        let err = decode_packet(&registry, buf.into_vec()).unwrap_err();
        assert!(matches!(err, PacketError::UnknownKind(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = PacketRegistry::builder()
            .register(kinds::PING, false, decode_ping)
            .unwrap()
            .register(kinds::PING, false, decode_ping)
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(kinds::PING.to_string()));
    }
}
