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

//! Length-delimited framing: `varint(payload_len) || payload`.
//!
//! [`FrameDecoder`] accumulates bytes arriving from a transport and extracts
//! complete frames as they become available, leaving an incomplete trailing
//! frame buffered for the next call.

use super::buffer::DecodeError;
use super::varint::{self, MAX_VARINT64_BYTES};

/// Accumulates inbound bytes and extracts length-delimited frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-received bytes from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Extract every complete frame currently buffered, leaving any
    /// incomplete trailing frame in place.
    pub fn drain_frames(&mut self) -> Result<Vec<Vec<u8>>, DecodeError> {
        let mut frames = Vec::new();
        let mut consumed = 0usize;

        loop {
            let Some(len_bytes) =
                varint::peek_varint_len(&self.pending, consumed, MAX_VARINT64_BYTES)
            else {
                break;
            };
            let mut pos = consumed;
            let payload_len = varint::decode_u64(&self.pending, &mut pos)? as usize;
            let frame_end = pos + payload_len;
            if frame_end > self.pending.len() {
                break;
            }
            frames.push(self.pending[pos..frame_end].to_vec());
            consumed = frame_end;
        }

        self.pending.drain(0..consumed);
        Ok(frames)
    }
}

/// Encode `payload` as a single length-delimited frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + MAX_VARINT64_BYTES);
    varint::encode_u64(payload.len() as u64, &mut out);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_roundtrip() {
        let frame = encode_frame(b"hello");
        let mut dec = FrameDecoder::new();
        dec.feed(&frame);
        let frames = dec.drain_frames().unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
    }

    #[test]
    fn incomplete_frame_stays_buffered() {
        let frame = encode_frame(b"hello world");
        let mut dec = FrameDecoder::new();
        dec.feed(&frame[..frame.len() - 3]);
        assert!(dec.drain_frames().unwrap().is_empty());
        dec.feed(&frame[frame.len() - 3..]);
        let frames = dec.drain_frames().unwrap();
        assert_eq!(frames, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn many_frames_any_boundary_split() {
        let payloads: Vec<Vec<u8>> = (0..37)
            .map(|i| format!("payload-{i}").into_bytes())
            .collect();
        let mut all_bytes = Vec::new();
        for p in &payloads {
            all_bytes.extend(encode_frame(p));
        }

        for split in [1usize, 3, 7, 16, all_bytes.len()] {
            let mut dec = FrameDecoder::new();
            let mut got = Vec::new();
            let mut offset = 0;
            while offset < all_bytes.len() {
                let end = (offset + split).min(all_bytes.len());
                dec.feed(&all_bytes[offset..end]);
                got.extend(dec.drain_frames().unwrap());
                offset = end;
            }
            assert_eq!(got, payloads, "split size {split}");
        }
    }
}
