use chrono::{DateTime, Utc};
use coc_identity::{hash_parts, KeyPair, PeerId, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::{canonical_payload, timestamp_bytes, ContentHash, DagError, DagResult, NodeHash};

/// A single signed custody hop
///
/// The signed fields (`content_hash`, `parent_hash`, `owner_id`,
/// `recipient_ids`, `timestamp`) together with `signature` and `node_hash`
/// are fixed once minted. `children_hashes` and `depth` are annotations the
/// holding replica maintains for itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocNode {
    node_hash: NodeHash,
    content_hash: ContentHash,
    parent_hash: Option<NodeHash>,
    owner_id: PeerId,
    recipient_ids: Vec<PeerId>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    children_hashes: BTreeSet<NodeHash>,
    #[serde(default)]
    depth: u32,
    signature: Option<Signature>,
}

impl CocNode {
    /// Mint a root hop for freshly created content
    pub fn root(
        content_hash: ContentHash,
        owner: &PeerId,
        keypair: &KeyPair,
        recipients: impl IntoIterator<Item = PeerId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::mint(content_hash, None, owner, keypair, recipients, timestamp, 0)
    }

    /// Mint a child hop recording that `forwarder` passed `parent`'s content on.
    /// The content hash is carried over unchanged.
    pub fn forward_of(
        parent: &CocNode,
        forwarder: &PeerId,
        keypair: &KeyPair,
        recipients: impl IntoIterator<Item = PeerId>,
        timestamp: DateTime<Utc>,
    ) -> DagResult<Self> {
        if parent.signature.is_none() {
            return Err(DagError::InvalidNode(format!(
                "cannot forward unsigned node {}",
                parent.node_hash.short()
            )));
        }

        Ok(Self::mint(
            parent.content_hash,
            Some(parent.node_hash),
            forwarder,
            keypair,
            recipients,
            timestamp,
            parent.depth + 1,
        ))
    }

    fn mint(
        content_hash: ContentHash,
        parent_hash: Option<NodeHash>,
        owner: &PeerId,
        keypair: &KeyPair,
        recipients: impl IntoIterator<Item = PeerId>,
        timestamp: DateTime<Utc>,
        depth: u32,
    ) -> Self {
        let recipient_ids: Vec<PeerId> = recipients
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let payload = Self::signing_payload(
            &content_hash,
            parent_hash.as_ref(),
            owner,
            &recipient_ids,
            &timestamp,
        );
        let signature = keypair.sign(&payload);
        let node_hash = Self::derive_hash(&signature, &content_hash);

        debug!(
            node = %node_hash.short(),
            owner = %owner.short(),
            depth,
            "Minted custody node"
        );

        Self {
            node_hash,
            content_hash,
            parent_hash,
            owner_id: owner.clone(),
            recipient_ids,
            timestamp,
            children_hashes: BTreeSet::new(),
            depth,
            signature: Some(signature),
        }
    }

    /// Canonical bytes the owner signs
    pub fn signing_payload(
        content_hash: &ContentHash,
        parent_hash: Option<&NodeHash>,
        owner_id: &PeerId,
        recipient_ids: &[PeerId],
        timestamp: &DateTime<Utc>,
    ) -> Vec<u8> {
        let recipient_count = (recipient_ids.len() as u32).to_le_bytes();
        let ts = timestamp_bytes(timestamp);

        let mut fields: Vec<&[u8]> = Vec::with_capacity(5 + recipient_ids.len());
        fields.push(content_hash.as_bytes().as_slice());
        fields.push(parent_hash.map(|p| p.as_bytes().as_slice()).unwrap_or_default());
        fields.push(owner_id.as_str().as_bytes());
        fields.push(recipient_count.as_slice());
        fields.extend(recipient_ids.iter().map(|r| r.as_str().as_bytes()));
        fields.push(ts.as_slice());

        canonical_payload(&fields)
    }

    /// `node_hash = H(signature || content_hash)`
    pub fn derive_hash(signature: &Signature, content_hash: &ContentHash) -> NodeHash {
        hash_parts(&[signature.as_bytes(), content_hash.as_bytes().as_slice()])
    }

    /// Check the owner's signature over the signed fields, and that
    /// `node_hash` still derives from it. Never errors.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };

        if Self::derive_hash(signature, &self.content_hash) != self.node_hash {
            return false;
        }

        let payload = Self::signing_payload(
            &self.content_hash,
            self.parent_hash.as_ref(),
            &self.owner_id,
            &self.recipient_ids,
            &self.timestamp,
        );
        public_key.verify(&payload, signature)
    }

    /// Record `child` as a local child of this node and annotate its depth.
    /// Returns `false` if the link was already known or `child` is not ours.
    pub fn add_child(&mut self, child: &mut CocNode) -> bool {
        if child.parent_hash != Some(self.node_hash) {
            return false;
        }
        child.depth = self.depth + 1;
        self.children_hashes.insert(child.node_hash)
    }

    /// Merge another replica's local child links into ours
    pub fn merge_children(&mut self, other: &CocNode) {
        self.children_hashes
            .extend(other.children_hashes.iter().copied());
    }

    /// Drop the child links that came from another replica
    pub fn into_replica(mut self) -> Self {
        self.children_hashes.clear();
        self
    }

    pub fn node_hash(&self) -> &NodeHash {
        &self.node_hash
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn parent_hash(&self) -> Option<&NodeHash> {
        self.parent_hash.as_ref()
    }

    pub fn owner_id(&self) -> &PeerId {
        &self.owner_id
    }

    /// Recipients in canonical (sorted, deduplicated) order
    pub fn recipient_ids(&self) -> &[PeerId] {
        &self.recipient_ids
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn children_hashes(&self) -> &BTreeSet<NodeHash> {
        &self.children_hashes
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent_hash.is_none()
    }
}

impl fmt::Debug for CocNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CocNode(hash={}, parent={}, owner={})",
            self.node_hash.short(),
            self.parent_hash
                .map(|p| p.short())
                .unwrap_or_else(|| "ROOT".to_string()),
            self.owner_id.short()
        )
    }
}
