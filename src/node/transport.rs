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

//! The transport boundary: a real UDP/epoll binding is supplied by the
//! embedder and is out of scope here. The node depends only on this trait
//! for outbound sends; inbound frames arrive over a channel the transport
//! feeds, keeping the node loop agnostic to the concrete socket type.

use std::net::SocketAddr;

/// Sends framed bytes to a peer address. Implemented by the embedder's
/// real socket binding, or by [`InMemoryTransport`] for tests.
pub trait Transport: Send + Sync {
    /// Send one already-framed byte sequence to `peer_addr`.
    fn send(&self, peer_addr: SocketAddr, frame_bytes: Vec<u8>);
}

/// An in-memory transport for tests: captures every send instead of
/// putting bytes on a wire.
#[derive(Default)]
pub struct InMemoryTransport {
    sent: parking_lot::Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl InMemoryTransport {
    /// Construct an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send recorded so far, in order.
    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.lock().clone()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, peer_addr: SocketAddr, frame_bytes: Vec<u8>) {
        self.sent.lock().push((peer_addr, frame_bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_sent_frames_in_order() {
        let transport = InMemoryTransport::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        transport.send(addr, vec![1, 2, 3]);
        transport.send(addr, vec![4, 5]);
        let sent = transport.sent();
        assert_eq!(sent, vec![(addr, vec![1, 2, 3]), (addr, vec![4, 5])]);
    }
}
