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

//! Node identity and the RSA crypto envelope (C3).

mod keys;
mod local_node;
mod node_id;
mod peer;

pub use keys::{KeyError, PrivateKey, PublicKey, DEFAULT_KEY_BITS, MIN_KEY_BITS};
pub use local_node::{IdentityError, LocalNode};
pub use node_id::NodeId;
pub use peer::{CryptoEnvelope, CryptoError, Peer};
