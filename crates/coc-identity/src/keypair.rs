use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IdentityError, IdentityResult};

/// Represents a detached signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex::serde")] pub Vec<u8>);

impl Signature {
    /// Create a new signature from bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the signature as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(6);
        write!(f, "Signature({}..)", hex::encode(&self.0[..end]))
    }
}

/// Public half of a peer keypair
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a public key from its 32 byte encoding
    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))
    }

    /// Get the 32 byte encoding
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Check a signature over `message`
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match ed25519_dalek::Signature::from_slice(signature.as_bytes()) {
            Ok(sig) => self.0.verify(message, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0.to_bytes()[..4]))
    }
}

/// An Ed25519 signing keypair. Not `Clone`: a peer's key is never shared.
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a keypair from its 32 byte secret
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// The shareable half of this keypair
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.verifying_key)
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Generate a keypair; the verify key is available through [`KeyPair::public_key`]
pub fn generate_keypair() -> KeyPair {
    KeyPair::generate()
}

/// Sign `message` with `keypair`
pub fn sign(keypair: &KeyPair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify `signature` over `message`; malformed signatures verify false
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}
