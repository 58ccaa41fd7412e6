use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{IdentityError, IdentityResult};

/// Width of every digest in bytes
pub const DIGEST_LENGTH: usize = 32;

/// A SHA-256 digest, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashDigest(#[serde(with = "hex::serde")] [u8; DIGEST_LENGTH]);

impl HashDigest {
    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the digest as bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    /// Full lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashDigest({})", self.short())
    }
}

impl FromStr for HashDigest {
    type Err = IdentityError;

    fn from_str(s: &str) -> IdentityResult<Self> {
        let mut bytes = [0u8; DIGEST_LENGTH];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| IdentityError::InvalidDigest(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

/// Hash arbitrary content
pub fn hash_content(content: &[u8]) -> HashDigest {
    hash_parts(&[content])
}

/// Hash the concatenation of several byte strings
pub fn hash_parts(parts: &[&[u8]]) -> HashDigest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    HashDigest(hasher.finalize().into())
}
