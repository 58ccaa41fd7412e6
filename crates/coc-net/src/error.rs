use coc_audit::AuditError;
use coc_dag::{DagError, NodeHash};
use coc_identity::PeerId;
use thiserror::Error;

/// Errors raised while issuing a revocation
#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("Peer {peer} does not own node {node} and cannot revoke it")]
    Unauthorized { peer: PeerId, node: NodeHash },

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Errors raised by peers and the network
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Node not held locally: {0}")]
    NodeNotFound(NodeHash),

    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("DAG error: {0}")]
    Dag(#[from] DagError),

    #[error("Deletion error: {0}")]
    Deletion(#[from] DeletionError),
}

/// Result type for network operations
pub type NetResult<T> = Result<T, NetError>;
