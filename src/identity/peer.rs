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

//! Remote peers and the crypto envelope used to talk to them.

use std::net::SocketAddr;
use std::time::Instant;

use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::Pkcs1v15Encrypt;
use sha2::Sha256;

use super::keys::{PrivateKey, PublicKey};
use super::node_id::NodeId;

/// Errors from the per-peer crypto envelope.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A signature did not verify against the claimed public key.
    #[error("bad signature")]
    BadSignature,
    /// Decryption with the local private key failed.
    #[error("decrypt failure")]
    DecryptFailure,
    /// Encryption against a peer's public key failed.
    #[error("encrypt failure")]
    EncryptFailure,
    /// A key could not be parsed from its wire encoding.
    #[error("malformed key")]
    MalformedKey,
}

/// A remote participant in the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    id: NodeId,
    public_key: PublicKey,
    address: Option<SocketAddr>,
    last_seen: Instant,
    directly_connected: bool,
}

impl Peer {
    /// Construct a peer record from its derived id and public key.
    pub fn new(public_key: PublicKey, address: Option<SocketAddr>) -> Result<Self, CryptoError> {
        let der = public_key
            .to_spki_der()
            .map_err(|_| CryptoError::MalformedKey)?;
        Ok(Self {
            id: NodeId::from_public_key_der(&der),
            public_key,
            address,
            last_seen: Instant::now(),
            directly_connected: false,
        })
    }

    /// This peer's identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This peer's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Last observed network address, if known.
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Instant of last contact.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Whether this peer currently has an open transport connection.
    pub fn directly_connected(&self) -> bool {
        self.directly_connected
    }

    /// Record fresh contact with this peer.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Update the direct-connection flag.
    pub fn set_directly_connected(&mut self, connected: bool) {
        self.directly_connected = connected;
    }

    /// Update the last-known network address.
    pub fn set_address(&mut self, address: SocketAddr) {
        self.address = Some(address);
    }

    /// Clear the last-known network address, e.g. after liveness is lost.
    pub fn clear_address(&mut self) {
        self.address = None;
    }

    /// Encrypt `plaintext` so only this peer's holder of the matching
    /// private key can read it.
    pub fn encrypt_for(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut rng = OsRng;
        self.public_key
            .inner()
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
            .map_err(|_| CryptoError::EncryptFailure)
    }

    /// Verify a PKCS#1 v1.5 + SHA-256 signature against this peer's public
    /// key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let verifying_key: VerifyingKey<Sha256> =
            VerifyingKey::new(self.public_key.inner().clone());
        let sig = Signature::try_from(signature).map_err(|_| CryptoError::BadSignature)?;
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::BadSignature)
    }
}

/// Decrypt a ciphertext addressed to us and sign outgoing messages, using
/// the local node's private key.
pub struct CryptoEnvelope<'a> {
    private_key: &'a PrivateKey,
}

impl<'a> CryptoEnvelope<'a> {
    /// Wrap a reference to the local private key.
    pub fn new(private_key: &'a PrivateKey) -> Self {
        Self { private_key }
    }

    /// Decrypt a ciphertext produced by [`Peer::encrypt_for`] against our
    /// public key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .inner()
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::DecryptFailure)
    }

    /// Sign `message` with PKCS#1 v1.5 + SHA-256.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signing_key: SigningKey<Sha256> = SigningKey::new(self.private_key.inner().clone());
        let mut rng = OsRng;
        signing_key.sign_with_rng(&mut rng, message).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::super::keys::PrivateKey;
    use super::*;

    #[test]
    fn peer_id_is_derived_from_public_key() {
        let sk = PrivateKey::generate(2048).unwrap();
        let pk = sk.public_key();
        let der = pk.to_spki_der().unwrap();
        let expected = NodeId::from_public_key_der(&der);
        let peer = Peer::new(pk, None).unwrap();
        assert_eq!(peer.id(), expected);
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let sk = PrivateKey::generate(2048).unwrap();
        let peer = Peer::new(sk.public_key(), None).unwrap();
        let envelope = CryptoEnvelope::new(&sk);
        let ciphertext = peer.encrypt_for(b"hello kademlia").unwrap();
        let plaintext = envelope.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"hello kademlia");
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let sk = PrivateKey::generate(2048).unwrap();
        let peer = Peer::new(sk.public_key(), None).unwrap();
        let envelope = CryptoEnvelope::new(&sk);
        let sig = envelope.sign(b"announce");
        peer.verify(b"announce", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let sk = PrivateKey::generate(2048).unwrap();
        let peer = Peer::new(sk.public_key(), None).unwrap();
        let envelope = CryptoEnvelope::new(&sk);
        let sig = envelope.sign(b"announce");
        assert!(peer.verify(b"tampered", &sig).is_err());
    }
}
