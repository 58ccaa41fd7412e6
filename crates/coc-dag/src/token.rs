use chrono::{DateTime, Utc};
use coc_identity::{KeyPair, PeerId, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::{canonical_payload, timestamp_bytes, NodeHash};

/// A signed instruction to revoke one custody hop.
///
/// A fresh token is minted for every hop of a cascade, signed by the owner
/// of that hop; tokens are never forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionToken {
    /// Target node
    pub node_hash: NodeHash,
    /// Peer that signed this token
    pub originator_id: PeerId,
    /// When the token was issued
    pub timestamp: DateTime<Utc>,
    /// Originator's signature over the three fields above
    pub signature: Signature,
}

impl DeletionToken {
    /// Mint and sign a token for `node_hash`
    pub fn issue(
        node_hash: NodeHash,
        originator_id: PeerId,
        keypair: &KeyPair,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let payload = Self::signing_payload(&node_hash, &originator_id, &timestamp);
        let signature = keypair.sign(&payload);

        Self {
            node_hash,
            originator_id,
            timestamp,
            signature,
        }
    }

    /// Canonical bytes the originator signs
    pub fn signing_payload(
        node_hash: &NodeHash,
        originator_id: &PeerId,
        timestamp: &DateTime<Utc>,
    ) -> Vec<u8> {
        let ts = timestamp_bytes(timestamp);
        canonical_payload(&[
            node_hash.as_bytes().as_slice(),
            originator_id.as_str().as_bytes(),
            ts.as_slice(),
        ])
    }

    /// Recompute the payload and check the signature
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        let payload = Self::signing_payload(&self.node_hash, &self.originator_id, &self.timestamp);
        public_key.verify(&payload, &self.signature)
    }
}
