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

//! The wire codec: base-128 varints (C1), the typed buffer built on them
//! (C1), length-delimited framing, and the packet registry/codec (C2).

pub mod buffer;
pub mod frame;
pub mod packet;
pub mod varint;

pub use buffer::{Buffer, DecodeError, StorageValue, Version};
pub use frame::{encode_frame, FrameDecoder};
pub use packet::{
    kinds, default_registry, decode_packet, encode_packet, AnnouncementPayload, BroadcastPayload,
    DecoderFn, FindNodePayload, HandshakePayload, NeighbourEntry, NeighboursPayload, Packet,
    PacketError, PacketPayload, PacketRegistry, PacketRegistryBuilder, PingPayload, PongPayload,
    RegistryError,
};
