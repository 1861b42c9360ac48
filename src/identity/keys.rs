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

//! RSA key material, canonically serialized as X.509 SubjectPublicKeyInfo.

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Minimum accepted RSA key size in bits.
pub const MIN_KEY_BITS: usize = 2048;
/// Default RSA key size in bits for newly generated identities.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Key material errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Key generation failed (RNG or parameter failure).
    #[error("key generation failed")]
    Generate,
    /// A key size below [`MIN_KEY_BITS`] was requested.
    #[error("key size {0} bits is below the minimum of {MIN_KEY_BITS}")]
    TooSmall(usize),
    /// DER/SPKI encoding failed.
    #[error("key encoding failed")]
    Encode,
    /// DER/SPKI bytes did not decode to a valid key.
    #[error("malformed key encoding")]
    Decode,
}

/// An RSA public key, canonically serialized as X.509 SubjectPublicKeyInfo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Decode from X.509 SubjectPublicKeyInfo DER bytes.
    pub fn from_spki_der(bytes: &[u8]) -> Result<Self, KeyError> {
        let inner = RsaPublicKey::from_public_key_der(bytes).map_err(|_| KeyError::Decode)?;
        Ok(Self { inner })
    }

    /// Canonical X.509 SubjectPublicKeyInfo DER encoding.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, KeyError> {
        self.inner
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|_| KeyError::Encode)
    }

    /// A compact, non-unique textual digest of this key, for display and
    /// early mismatch detection — not a security boundary.
    pub fn fingerprint(&self) -> Result<String, KeyError> {
        let der = self.to_spki_der()?;
        let digest = Sha256::digest(&der);
        Ok(hex::encode(&digest[..10]))
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.inner
    }
}

/// An RSA private key. Zeroized on drop by the underlying `rsa` crate.
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Generate a new key of `bits` size. Rejects sizes below
    /// [`MIN_KEY_BITS`].
    pub fn generate(bits: usize) -> Result<Self, KeyError> {
        if bits < MIN_KEY_BITS {
            return Err(KeyError::TooSmall(bits));
        }
        let mut rng = rand::rngs::OsRng;
        let inner = RsaPrivateKey::new(&mut rng, bits).map_err(|_| KeyError::Generate)?;
        Ok(Self { inner })
    }

    /// Decode from PKCS#8 DER bytes.
    pub fn from_pkcs8_der(bytes: &[u8]) -> Result<Self, KeyError> {
        let inner = RsaPrivateKey::from_pkcs8_der(bytes).map_err(|_| KeyError::Decode)?;
        Ok(Self { inner })
    }

    /// Canonical PKCS#8 DER encoding. The returned bytes are sensitive;
    /// callers persisting them to disk are responsible for access control.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, KeyError> {
        self.inner
            .to_pkcs8_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|_| KeyError::Encode)
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: RsaPublicKey::from(&self.inner),
        }
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spki_roundtrip() {
        let sk = PrivateKey::generate(MIN_KEY_BITS).unwrap();
        let pk = sk.public_key();
        let der = pk.to_spki_der().unwrap();
        let decoded = PublicKey::from_spki_der(&der).unwrap();
        assert_eq!(pk, decoded);
    }

    #[test]
    fn pkcs8_roundtrip() {
        let sk = PrivateKey::generate(MIN_KEY_BITS).unwrap();
        let der = sk.to_pkcs8_der().unwrap();
        let sk2 = PrivateKey::from_pkcs8_der(&der).unwrap();
        assert_eq!(sk.public_key(), sk2.public_key());
    }

    #[test]
    fn rejects_undersized_keys() {
        assert!(matches!(
            PrivateKey::generate(1024),
            Err(KeyError::TooSmall(1024))
        ));
    }

    #[test]
    fn fingerprint_is_stable() {
        let sk = PrivateKey::generate(MIN_KEY_BITS).unwrap();
        let pk = sk.public_key();
        assert_eq!(pk.fingerprint().unwrap(), pk.fingerprint().unwrap());
    }
}
