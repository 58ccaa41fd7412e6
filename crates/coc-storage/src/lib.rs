/*!
# Custody Replica Storage

Each peer keeps its own replica: the custody nodes it holds, keyed by node
hash, and the raw content those nodes point at, keyed by content hash.
Content is only dropped once no resident node references it.
*/

use coc_dag::{CocNode, ContentHash, NodeHash, NodeSource};

#[cfg(feature = "memory-storage")]
mod memory;

#[cfg(feature = "memory-storage")]
pub use memory::InMemoryStorage;

/// Outcome of evicting a node from a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    /// The node that was removed
    pub node: CocNode,
    /// Whether its content became unreferenced and was dropped too
    pub content_removed: bool,
}

/// Storage for one peer's replica.
///
/// Implementations serialize their own mutations; callers may share a backend
/// between tasks.
pub trait StorageBackend: NodeSource + Send + Sync {
    /// Insert or replace a node, returning the previous node under that hash
    fn put_node(&self, node: CocNode) -> Option<CocNode>;

    /// Remove a node
    fn remove_node(&self, node_hash: &NodeHash) -> Option<CocNode>;

    /// Apply `update` to a stored node in place. Returns `false` if absent.
    fn update_node(&self, node_hash: &NodeHash, update: &mut dyn FnMut(&mut CocNode)) -> bool;

    /// Snapshot of every resident node
    fn all_nodes(&self) -> Vec<CocNode>;

    /// Number of resident nodes
    fn node_count(&self) -> usize;

    /// Resident nodes whose `parent_hash` is `parent_hash`, whether or not
    /// the parent has linked them yet
    fn children_of(&self, parent_hash: &NodeHash) -> Vec<CocNode> {
        self.all_nodes()
            .into_iter()
            .filter(|node| node.parent_hash() == Some(parent_hash))
            .collect()
    }

    /// Store content under its hash
    fn put_content(&self, content_hash: ContentHash, content: Vec<u8>);

    /// Fetch content by hash
    fn get_content(&self, content_hash: &ContentHash) -> Option<Vec<u8>>;

    /// Remove content
    fn remove_content(&self, content_hash: &ContentHash) -> Option<Vec<u8>>;

    /// Whether any resident node still references this content
    fn is_content_referenced(&self, content_hash: &ContentHash) -> bool;

    /// Number of stored content blobs
    fn content_count(&self) -> usize;

    /// Whether a node is resident
    fn contains_node(&self, node_hash: &NodeHash) -> bool {
        self.get_node(node_hash).is_some()
    }

    /// Remove a node, then its content if nothing else references it
    fn evict_node(&self, node_hash: &NodeHash) -> Option<Eviction> {
        let node = self.remove_node(node_hash)?;
        let content_removed = if self.is_content_referenced(node.content_hash()) {
            false
        } else {
            self.remove_content(node.content_hash()).is_some()
        };

        Some(Eviction {
            node,
            content_removed,
        })
    }
}
