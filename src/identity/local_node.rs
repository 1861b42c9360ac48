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

//! This node's own identity: key material plus the derived [`NodeId`].
//!
//! Private key bytes are written to disk atomically (write to a `.tmp`
//! sibling, `fsync`, rename) with `0600` permissions, mirroring the key
//! lifecycle used elsewhere in this codebase for sensitive material.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use zeroize::Zeroize;

use super::keys::{KeyError, PrivateKey, PublicKey, DEFAULT_KEY_BITS};
use super::node_id::NodeId;
use super::peer::CryptoEnvelope;

/// Errors from loading or persisting a local identity.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The key material itself was invalid.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Reading or writing the identity file failed.
    #[error("identity file io error")]
    Io,
}

/// This process's own identity: an RSA keypair and its derived [`NodeId`].
pub struct LocalNode {
    id: NodeId,
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl LocalNode {
    /// Generate a fresh identity of `bits` key size.
    pub fn generate(bits: usize) -> Result<Self, IdentityError> {
        let private_key = PrivateKey::generate(bits)?;
        let public_key = private_key.public_key();
        let der = public_key.to_spki_der()?;
        Ok(Self {
            id: NodeId::from_public_key_der(&der),
            private_key,
            public_key,
        })
    }

    /// Load an identity's PKCS#8 DER private key from `path`, or generate
    /// and persist a new one of [`DEFAULT_KEY_BITS`] if the file does not
    /// exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let mut der = fs::read(path).map_err(|_| IdentityError::Io)?;
            let private_key = PrivateKey::from_pkcs8_der(&der);
            der.zeroize();
            let private_key = private_key?;
            let public_key = private_key.public_key();
            let spki = public_key.to_spki_der()?;
            return Ok(Self {
                id: NodeId::from_public_key_der(&spki),
                private_key,
                public_key,
            });
        }

        let node = Self::generate(DEFAULT_KEY_BITS)?;
        node.persist(path)?;
        Ok(node)
    }

    /// Write this identity's private key to `path`, atomically and with
    /// owner-only permissions.
    pub fn persist(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| IdentityError::Io)?;
        }
        let mut der = self.private_key.to_pkcs8_der()?;

        let mut tmp = path.to_path_buf();
        tmp.set_extension("tmp");
        {
            let mut f = fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&tmp)
                .map_err(|_| IdentityError::Io)?;
            f.write_all(&der).map_err(|_| IdentityError::Io)?;
            f.sync_all().map_err(|_| IdentityError::Io)?;
        }
        der.zeroize();

        set_private_perms(&tmp);
        fs::rename(&tmp, path).map_err(|_| IdentityError::Io)?;
        set_private_perms(path);
        Ok(())
    }

    /// This node's identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node's public key, shared with peers.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// A crypto envelope bound to this node's private key, for decrypting
    /// inbound ciphertexts and signing outbound messages.
    pub fn envelope(&self) -> CryptoEnvelope<'_> {
        CryptoEnvelope::new(&self.private_key)
    }
}

fn set_private_perms(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_derives_matching_id() {
        let node = LocalNode::generate(2048).unwrap();
        let der = node.public_key().to_spki_der().unwrap();
        assert_eq!(node.id(), NodeId::from_public_key_der(&der));
    }

    #[test]
    fn persist_then_reload_yields_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.der");

        let node = LocalNode::generate(2048).unwrap();
        node.persist(&path).unwrap();

        let reloaded = LocalNode::load_or_create(&path).unwrap();
        assert_eq!(node.id(), reloaded.id());
    }

    #[test]
    fn load_or_create_generates_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.der");
        assert!(!path.exists());

        let a = LocalNode::load_or_create(&path).unwrap();
        assert!(path.exists());
        let b = LocalNode::load_or_create(&path).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[cfg(unix)]
    #[test]
    fn persisted_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.der");
        let node = LocalNode::generate(2048).unwrap();
        node.persist(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
