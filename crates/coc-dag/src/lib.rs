/*!
# Chain-of-Custody Provenance Graph

Every time content changes hands a custodian mints a [`CocNode`]: a signed,
content-addressed hop pointing at the hop it was forwarded from. The hops of a
single piece of content form a tree rooted at the original creation.

## Architectural Tenets
- A node's identity is derived from its signature and content hash, so a hop cannot
  be altered after the fact without the owner's key
- Child links and depth are local annotations; no replica is guaranteed to hold them all
- Revocation is per hop: only the owner of a hop can sign a [`DeletionToken`] for it
*/

use coc_identity::HashDigest;
use thiserror::Error;

pub mod node;
pub mod token;
pub mod traverse;

pub use node::CocNode;
pub use token::DeletionToken;
pub use traverse::{ancestors, descendants, Ancestors, Descendants, NodeSource};

/// Hash identifying a custody hop
pub type NodeHash = HashDigest;

/// Hash of the content a hop carries
pub type ContentHash = HashDigest;

/// Errors that can occur in DAG operations
#[derive(Debug, Error)]
pub enum DagError {
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}

/// Result type for DAG operations
pub type DagResult<T> = std::result::Result<T, DagError>;

/// Length-prefixed concatenation of signed fields, so that no two distinct
/// field tuples share an encoding.
pub(crate) fn canonical_payload(fields: &[&[u8]]) -> Vec<u8> {
    let capacity = fields.iter().map(|f| f.len() + 4).sum();
    let mut payload = Vec::with_capacity(capacity);
    for field in fields {
        payload.extend_from_slice(&(field.len() as u32).to_le_bytes());
        payload.extend_from_slice(field);
    }
    payload
}

pub(crate) fn timestamp_bytes(timestamp: &chrono::DateTime<chrono::Utc>) -> Vec<u8> {
    timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        .into_bytes()
}
