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

//! Read/write byte buffer with independent cursor positions and the typed
//! primitives the wire protocol is built from.
//!
//! A `Buffer` is not `Send`/`Sync` by contract: callers must not share one
//! across concurrent accesses. Capacity grows on write up to an optional
//! maximum; callers needing pooled backing storage construct a `Buffer`
//! around an externally-owned `Vec<u8>` via [`Buffer::from_vec`].

use uuid::Uuid;

use super::varint::{self, VarintError};

/// Errors raised while decoding from a [`Buffer`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes remained to satisfy the read.
    #[error("short read")]
    ShortRead,
    /// A varint chained more continuation bytes than its type allows.
    #[error("varint overflow")]
    VarintOverflow,
    /// A length-prefixed value declared a length that would exceed the
    /// buffer's configured maximum capacity.
    #[error("length exceeds maximum capacity")]
    TooLarge,
    /// Bytes were not valid UTF-8 where a string was expected.
    #[error("invalid utf-8")]
    InvalidUtf8,
    /// A caller-supplied type tag did not match any known decoder.
    #[error("unknown type tag {0}")]
    UnknownTypeTag(u8),
    /// A socket address string did not parse.
    #[error("invalid socket address")]
    InvalidSocketAddr,
}

impl From<VarintError> for DecodeError {
    fn from(e: VarintError) -> Self {
        match e {
            VarintError::ShortRead => DecodeError::ShortRead,
            VarintError::Overflow => DecodeError::VarintOverflow,
        }
    }
}

/// A growable byte buffer with independent read/write cursors.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    max_capacity: Option<usize>,
    read_mark: Option<usize>,
    write_mark: Option<usize>,
}

impl Buffer {
    /// Create an empty buffer with no maximum capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer bounded to `max` bytes.
    pub fn with_max_capacity(max: usize) -> Self {
        Self {
            max_capacity: Some(max),
            ..Self::default()
        }
    }

    /// Wrap externally-owned bytes for reading; the write cursor starts past
    /// the end so writes append after existing content.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let write_pos = data.len();
        Self {
            data,
            read_pos: 0,
            write_pos,
            max_capacity: None,
            read_mark: None,
            write_mark: None,
        }
    }

    /// Number of bytes available to read.
    pub fn readable(&self) -> usize {
        self.write_pos.saturating_sub(self.read_pos)
    }

    /// Whether a subsequent read of `n` bytes would succeed.
    pub fn has_readable(&self, n: usize) -> bool {
        self.readable() >= n
    }

    /// Current read cursor position.
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Set the read cursor position.
    pub fn set_read_position(&mut self, pos: usize) {
        self.read_pos = pos;
    }

    /// Mark the current read position for a later [`Buffer::reset_read`].
    pub fn mark_read(&mut self) {
        self.read_mark = Some(self.read_pos);
    }

    /// Restore the read position to the last [`Buffer::mark_read`].
    pub fn reset_read(&mut self) {
        if let Some(m) = self.read_mark {
            self.read_pos = m;
        }
    }

    /// Mark the current write position for a later [`Buffer::reset_write`].
    pub fn mark_write(&mut self) {
        self.write_mark = Some(self.write_pos);
    }

    /// Restore the write position to the last [`Buffer::mark_write`],
    /// truncating any bytes written since.
    pub fn reset_write(&mut self) {
        if let Some(m) = self.write_mark {
            self.write_pos = m;
            self.data.truncate(m);
        }
    }

    /// Bytes not yet consumed by a read.
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    /// Consume and return the whole buffer's written bytes.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.write_pos);
        self.data
    }

    fn ensure_capacity(&mut self, additional: usize) -> Result<(), DecodeError> {
        let needed = self.write_pos + additional;
        if let Some(max) = self.max_capacity {
            if needed > max {
                return Err(DecodeError::TooLarge);
            }
        }
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&[u8], DecodeError> {
        if !self.has_readable(n) {
            return Err(DecodeError::ShortRead);
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.data[start..start + n])
    }

    // -- raw bytes -----------------------------------------------------

    /// Write raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.ensure_capacity(bytes.len())?;
        self.data[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
        Ok(())
    }

    /// Read exactly `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(n)?.to_vec())
    }

    // -- fixed-width primitives -----------------------------------------

    /// Write a single byte.
    pub fn write_byte(&mut self, b: u8) -> Result<(), DecodeError> {
        self.write_raw(&[b])
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Write a big-endian fixed 16-bit short.
    pub fn write_short(&mut self, v: u16) -> Result<(), DecodeError> {
        self.write_raw(&v.to_be_bytes())
    }

    /// Read a big-endian fixed 16-bit short.
    pub fn read_short(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Write a 16-bit big-endian char code point.
    pub fn write_char(&mut self, c: u16) -> Result<(), DecodeError> {
        self.write_short(c)
    }

    /// Read a 16-bit big-endian char code point.
    pub fn read_char(&mut self) -> Result<u16, DecodeError> {
        self.read_short()
    }

    // -- varint-backed integers ------------------------------------------

    /// Write a zig-zag + varint signed 32-bit integer.
    pub fn write_i32(&mut self, v: i32) -> Result<(), DecodeError> {
        let mut tmp = Vec::new();
        varint::encode_u32(varint::zigzag_encode_i32(v), &mut tmp);
        self.write_raw(&tmp)
    }

    /// Read a zig-zag + varint signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let slice = self.remaining_slice();
        let mut pos = 0;
        let v = varint::decode_u32(slice, &mut pos)?;
        self.read_pos += pos;
        Ok(varint::zigzag_decode_u32(v))
    }

    /// Write a zig-zag + varint signed 64-bit integer.
    pub fn write_i64(&mut self, v: i64) -> Result<(), DecodeError> {
        let mut tmp = Vec::new();
        varint::encode_u64(varint::zigzag_encode_i64(v), &mut tmp);
        self.write_raw(&tmp)
    }

    /// Read a zig-zag + varint signed 64-bit integer.
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let slice = self.remaining_slice();
        let mut pos = 0;
        let v = varint::decode_u64(slice, &mut pos)?;
        self.read_pos += pos;
        Ok(varint::zigzag_decode_u64(v))
    }

    /// Write an unsigned varint 32-bit integer.
    pub fn write_u32(&mut self, v: u32) -> Result<(), DecodeError> {
        let mut tmp = Vec::new();
        varint::encode_u32(v, &mut tmp);
        self.write_raw(&tmp)
    }

    /// Read an unsigned varint 32-bit integer.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let slice = self.remaining_slice();
        let mut pos = 0;
        let v = varint::decode_u32(slice, &mut pos)?;
        self.read_pos += pos;
        Ok(v)
    }

    /// Write an unsigned varint 64-bit integer.
    pub fn write_u64(&mut self, v: u64) -> Result<(), DecodeError> {
        let mut tmp = Vec::new();
        varint::encode_u64(v, &mut tmp);
        self.write_raw(&tmp)
    }

    /// Read an unsigned varint 64-bit integer.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let slice = self.remaining_slice();
        let mut pos = 0;
        let v = varint::decode_u64(slice, &mut pos)?;
        self.read_pos += pos;
        Ok(v)
    }

    /// Is a complete varint available at the current read position without
    /// consuming it? Used as the framing oracle.
    pub fn peek_varint_available(&mut self, max_bytes: usize) -> bool {
        self.mark_read();
        let slice = self.remaining_slice();
        let found = varint::peek_varint_len(slice, 0, max_bytes).is_some();
        self.reset_read();
        found
    }

    // -- length-delimited values ------------------------------------------

    /// Write a varint length followed by raw bytes.
    pub fn write_byte_array(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.write_u64(bytes.len() as u64)?;
        self.write_raw(bytes)
    }

    /// Read a varint length followed by raw bytes.
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u64()? as usize;
        if let Some(max) = self.max_capacity {
            if len > max {
                return Err(DecodeError::TooLarge);
            }
        }
        self.read_raw(len)
    }

    /// Write a UTF-8 string as a length-prefixed byte array.
    pub fn write_string(&mut self, s: &str) -> Result<(), DecodeError> {
        self.write_byte_array(s.as_bytes())
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_byte_array()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Write a UUID as two zig-zag varint longs (msb, lsb).
    pub fn write_uuid(&mut self, id: Uuid) -> Result<(), DecodeError> {
        let (msb, lsb) = uuid_to_msb_lsb(id);
        self.write_i64(msb)?;
        self.write_i64(lsb)
    }

    /// Read a UUID encoded as two zig-zag varint longs.
    pub fn read_uuid(&mut self) -> Result<Uuid, DecodeError> {
        let msb = self.read_i64()?;
        let lsb = self.read_i64()?;
        Ok(uuid_from_msb_lsb(msb, lsb))
    }

    /// Write an optional socket address as a presence byte followed by its
    /// string form when present.
    pub fn write_socket_addr(&mut self, addr: Option<std::net::SocketAddr>) -> Result<(), DecodeError> {
        match addr {
            Some(addr) => {
                self.write_byte(1)?;
                self.write_string(&addr.to_string())
            }
            None => self.write_byte(0),
        }
    }

    /// Read an optional socket address written by [`Buffer::write_socket_addr`].
    pub fn read_socket_addr(&mut self) -> Result<Option<std::net::SocketAddr>, DecodeError> {
        if self.read_byte()? == 0 {
            return Ok(None);
        }
        let s = self.read_string()?;
        s.parse().map(Some).map_err(|_| DecodeError::InvalidSocketAddr)
    }

    /// Write a buffer-in-buffer: varint readable-length followed by its
    /// remaining bytes. This is the framing boundary primitive.
    pub fn write_nested(&mut self, inner: &Buffer) -> Result<(), DecodeError> {
        self.write_byte_array(inner.remaining_slice())
    }

    /// Read a buffer-in-buffer written by [`Buffer::write_nested`].
    pub fn read_nested(&mut self) -> Result<Buffer, DecodeError> {
        let bytes = self.read_byte_array()?;
        Ok(Buffer::from_vec(bytes))
    }
}

fn uuid_to_msb_lsb(id: Uuid) -> (i64, i64) {
    let bytes = id.as_bytes();
    let mut msb_b = [0u8; 8];
    let mut lsb_b = [0u8; 8];
    msb_b.copy_from_slice(&bytes[0..8]);
    lsb_b.copy_from_slice(&bytes[8..16]);
    (i64::from_be_bytes(msb_b), i64::from_be_bytes(lsb_b))
}

fn uuid_from_msb_lsb(msb: i64, lsb: i64) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[0..8].copy_from_slice(&msb.to_be_bytes());
    bytes[8..16].copy_from_slice(&lsb.to_be_bytes());
    Uuid::from_bytes(bytes)
}

/// A value that writes a self-describing encoded form into a buffer and can
/// be reconstructed from one.
pub trait StorageValue: Sized {
    /// Write `self` into `buf`.
    fn write_to(&self, buf: &mut Buffer) -> Result<(), DecodeError>;
    /// Reconstruct an instance by reading from `buf`.
    fn read_from(buf: &mut Buffer) -> Result<Self, DecodeError>;
}

/// Semantic version with continuation-bit-driven 1-3 byte encoding.
///
/// Each component is 7-bit unsigned (0..=127). The high bit of a component's
/// byte is set iff at least one subsequent component is non-zero, so the
/// reader's "continue while the high bit is set" rule and the writer's
/// "continue while something later is non-zero" rule agree: encoded length
/// is 1 byte when minor and patch are both zero, 2 when only patch is zero,
/// 3 otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component (0..=127).
    pub major: u8,
    /// Minor component (0..=127).
    pub minor: u8,
    /// Patch component (0..=127).
    pub patch: u8,
}

impl Version {
    /// Construct a version, clamping each component into the 7-bit range.
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major: major & 0x7F,
            minor: minor & 0x7F,
            patch: patch & 0x7F,
        }
    }
}

impl StorageValue for Version {
    fn write_to(&self, buf: &mut Buffer) -> Result<(), DecodeError> {
        let continue_major = self.minor != 0 || self.patch != 0;
        let continue_minor = self.patch != 0;
        buf.write_byte(self.major | if continue_major { 0x80 } else { 0 })?;
        if continue_major {
            buf.write_byte(self.minor | if continue_minor { 0x80 } else { 0 })?;
            if continue_minor {
                buf.write_byte(self.patch)?;
            }
        }
        Ok(())
    }

    fn read_from(buf: &mut Buffer) -> Result<Self, DecodeError> {
        let major_byte = buf.read_byte()?;
        let mut minor = 0u8;
        let mut patch = 0u8;
        if major_byte & 0x80 != 0 {
            let minor_byte = buf.read_byte()?;
            minor = minor_byte & 0x7F;
            if minor_byte & 0x80 != 0 {
                patch = buf.read_byte()? & 0x7F;
            }
        }
        Ok(Version::new(major_byte & 0x7F, minor, patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_array_roundtrip() {
        let mut buf = Buffer::new();
        buf.write_byte_array(b"hello kademlia").unwrap();
        let mut read = Buffer::from_vec(buf.into_vec());
        assert_eq!(read.read_byte_array().unwrap(), b"hello kademlia");
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Buffer::new();
        buf.write_string("peer-fingerprint").unwrap();
        let mut read = Buffer::from_vec(buf.into_vec());
        assert_eq!(read.read_string().unwrap(), "peer-fingerprint");
    }

    #[test]
    fn uuid_roundtrip() {
        let id = Uuid::new_v4();
        let mut buf = Buffer::new();
        buf.write_uuid(id).unwrap();
        let mut read = Buffer::from_vec(buf.into_vec());
        assert_eq!(read.read_uuid().unwrap(), id);
    }

    #[test]
    fn version_encoded_lengths() {
        let cases = [
            (Version::new(1, 0, 0), 1),
            (Version::new(1, 2, 0), 2),
            (Version::new(1, 2, 3), 3),
            (Version::new(0, 0, 5), 3),
        ];
        for (v, expected_len) in cases {
            let mut buf = Buffer::new();
            v.write_to(&mut buf).unwrap();
            let bytes = buf.into_vec();
            assert_eq!(bytes.len(), expected_len, "{v:?}");
            let mut read = Buffer::from_vec(bytes);
            assert_eq!(Version::read_from(&mut read).unwrap(), v);
        }
    }

    #[test]
    fn nested_buffer_is_a_framing_boundary() {
        let mut inner = Buffer::new();
        inner.write_string("payload").unwrap();

        let mut outer = Buffer::new();
        outer.write_nested(&inner).unwrap();
        outer.write_byte(0xAB).unwrap();

        let mut read = Buffer::from_vec(outer.into_vec());
        let mut nested = read.read_nested().unwrap();
        assert_eq!(nested.read_string().unwrap(), "payload");
        assert_eq!(read.read_byte().unwrap(), 0xAB);
    }

    #[test]
    fn short_read_on_truncated_input() {
        let mut buf = Buffer::from_vec(vec![0x05]);
        assert_eq!(buf.read_byte_array(), Err(DecodeError::ShortRead));
    }

    #[test]
    fn too_large_is_rejected() {
        let mut buf = Buffer::with_max_capacity(4);
        let mut tmp = Vec::new();
        varint::encode_u64(100, &mut tmp);
        tmp.extend(vec![0u8; 100]);
        let mut read = Buffer::from_vec(tmp);
        read.max_capacity = Some(4);
        assert_eq!(read.read_byte_array(), Err(DecodeError::TooLarge));
    }

    #[test]
    fn socket_addr_roundtrip() {
        let mut buf = Buffer::new();
        let addr: std::net::SocketAddr = "127.0.0.1:4321".parse().unwrap();
        buf.write_socket_addr(Some(addr)).unwrap();
        buf.write_socket_addr(None).unwrap();
        let mut read = Buffer::from_vec(buf.into_vec());
        assert_eq!(read.read_socket_addr().unwrap(), Some(addr));
        assert_eq!(read.read_socket_addr().unwrap(), None);
    }

    #[test]
    fn peek_varint_available_does_not_consume() {
        let mut buf = Buffer::new();
        buf.write_u64(300).unwrap();
        let mut read = Buffer::from_vec(buf.into_vec());
        assert!(read.peek_varint_available(10));
        assert_eq!(read.read_position(), 0);
        assert_eq!(read.read_u64().unwrap(), 300);
    }
}
