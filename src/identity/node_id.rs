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

//! 128-bit node identifiers and the XOR distance metric.

use std::fmt;

use uuid::Uuid;

/// A 128-bit overlay identifier, derived from a peer's public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u128);

impl NodeId {
    /// Construct directly from a `u128`.
    pub fn from_u128(v: u128) -> Self {
        Self(v)
    }

    /// Raw big-endian byte representation.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Construct from a big-endian byte representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Derive a `NodeId` from the X.509 SubjectPublicKeyInfo bytes of a
    /// public key: a name-based, version-3-style UUID (MD5 over the
    /// encoded key) truncated to its 128 bits, i.e. the UUID's bits
    /// themselves are the identifier.
    pub fn from_public_key_der(spki_der: &[u8]) -> Self {
        // The nil UUID namespace mirrors "no particular namespace" — the
        // encoded key bytes alone are already globally unique input.
        let id = Uuid::new_v3(&Uuid::nil(), spki_der);
        Self::from_bytes(*id.as_bytes())
    }

    /// Number of bits this id is shifted from zero — used only by tests
    /// wanting a concrete small identifier.
    pub fn from_u64(v: u64) -> Self {
        Self(v as u128)
    }

    /// XOR-distance to `other`: the bit-length of `self ^ other`.
    ///
    /// Zero iff the two ids are bit-equal. Ranges over `[0, 128]`.
    pub fn distance(&self, other: &NodeId) -> u32 {
        let x = self.0 ^ other.0;
        128 - x.leading_zeros()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:032x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn distance_literal() {
        let a = NodeId::from_u64(0x1);
        let b = NodeId::from_u64(0x3);
        assert_eq!(a.distance(&b), 2);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = NodeId::from_u64(42);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn distance_is_symmetric_and_zero_iff_equal() {
        let a = NodeId::from_u64(7);
        let b = NodeId::from_u64(99);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&a), 0);
        assert_ne!(a.distance(&b), 0);
    }

    proptest! {
        #[test]
        fn distance_symmetric_prop(a in any::<u128>(), b in any::<u128>()) {
            let na = NodeId::from_u128(a);
            let nb = NodeId::from_u128(b);
            prop_assert_eq!(na.distance(&nb), nb.distance(&na));
        }

        #[test]
        fn distance_zero_iff_equal(a in any::<u128>(), b in any::<u128>()) {
            let na = NodeId::from_u128(a);
            let nb = NodeId::from_u128(b);
            prop_assert_eq!(na.distance(&nb) == 0, a == b);
        }

        #[test]
        fn xor_metric_triangle_inequality(a in any::<u128>(), b in any::<u128>(), c in any::<u128>()) {
            let na = NodeId::from_u128(a);
            let nb = NodeId::from_u128(b);
            let nc = NodeId::from_u128(c);
            prop_assert!(na.distance(&nc) <= na.distance(&nb).max(nb.distance(&nc)));
        }

        #[test]
        fn derivation_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let a = NodeId::from_public_key_der(&bytes);
            let b = NodeId::from_public_key_der(&bytes);
            prop_assert_eq!(a, b);
        }
    }
}
