/*!
# Chain-of-Custody Identity

Key material and digests shared by every custody peer.

- Ed25519 keypairs: each peer owns exactly one and never hands out the signing half
- Signatures are detached byte strings; verification never errors, it answers `false`
- SHA-256 digests address both content and custody hops
*/

use serde::{Deserialize, Serialize};
use std::fmt;

mod error;
mod hash;
mod keypair;

pub use error::{IdentityError, IdentityResult};
pub use hash::{hash_content, hash_parts, HashDigest, DIGEST_LENGTH};
pub use keypair::{generate_keypair, sign, verify, KeyPair, PublicKey, Signature};

/// Identifier of a custody peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new peer identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests;
