use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use coc_dag::{CocNode, ContentHash, NodeHash, NodeSource};
use tracing::trace;

use crate::StorageBackend;

#[derive(Default)]
struct Inner {
    /// Nodes by node hash
    nodes: HashMap<NodeHash, CocNode>,
    /// Raw content by content hash
    content: HashMap<ContentHash, Vec<u8>>,
    /// Resident nodes per content hash
    references: HashMap<ContentHash, usize>,
    /// Resident node hashes by their parent's hash
    by_parent: HashMap<NodeHash, BTreeSet<NodeHash>>,
}

impl Inner {
    fn retain_content(&mut self, content_hash: ContentHash) {
        *self.references.entry(content_hash).or_insert(0) += 1;
    }

    fn index_child(&mut self, node: &CocNode) {
        if let Some(parent) = node.parent_hash() {
            self.by_parent.entry(*parent).or_default().insert(*node.node_hash());
        }
    }

    fn unindex_child(&mut self, node: &CocNode) {
        let Some(parent) = node.parent_hash() else {
            return;
        };
        if let Some(children) = self.by_parent.get_mut(parent) {
            children.remove(node.node_hash());
            if children.is_empty() {
                self.by_parent.remove(parent);
            }
        }
    }

    fn release_content(&mut self, content_hash: &ContentHash) {
        if let Some(count) = self.references.get_mut(content_hash) {
            *count -= 1;
            if *count == 0 {
                self.references.remove(content_hash);
            }
        }
    }
}

/// In-memory replica storage. Content references are counted at node
/// insert/remove time so the unreferenced check is O(1).
#[derive(Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeSource for InMemoryStorage {
    fn get_node(&self, node_hash: &NodeHash) -> Option<CocNode> {
        self.read().nodes.get(node_hash).cloned()
    }
}

impl StorageBackend for InMemoryStorage {
    fn put_node(&self, node: CocNode) -> Option<CocNode> {
        let mut inner = self.write();
        let hash = *node.node_hash();
        inner.retain_content(*node.content_hash());
        inner.index_child(&node);
        let previous = inner.nodes.insert(hash, node);
        if let Some(prev) = &previous {
            inner.release_content(prev.content_hash());
        }
        trace!(node = %hash.short(), replaced = previous.is_some(), "Stored node");
        previous
    }

    fn remove_node(&self, node_hash: &NodeHash) -> Option<CocNode> {
        let mut inner = self.write();
        let removed = inner.nodes.remove(node_hash)?;
        inner.release_content(removed.content_hash());
        inner.unindex_child(&removed);
        Some(removed)
    }

    fn update_node(&self, node_hash: &NodeHash, update: &mut dyn FnMut(&mut CocNode)) -> bool {
        let mut inner = self.write();
        match inner.nodes.get_mut(node_hash) {
            Some(node) => {
                update(node);
                true
            }
            None => false,
        }
    }

    fn all_nodes(&self) -> Vec<CocNode> {
        self.read().nodes.values().cloned().collect()
    }

    fn node_count(&self) -> usize {
        self.read().nodes.len()
    }

    fn children_of(&self, parent_hash: &NodeHash) -> Vec<CocNode> {
        let inner = self.read();
        inner
            .by_parent
            .get(parent_hash)
            .into_iter()
            .flatten()
            .filter_map(|hash| inner.nodes.get(hash).cloned())
            .collect()
    }

    fn put_content(&self, content_hash: ContentHash, content: Vec<u8>) {
        self.write().content.insert(content_hash, content);
    }

    fn get_content(&self, content_hash: &ContentHash) -> Option<Vec<u8>> {
        self.read().content.get(content_hash).cloned()
    }

    fn remove_content(&self, content_hash: &ContentHash) -> Option<Vec<u8>> {
        self.write().content.remove(content_hash)
    }

    fn is_content_referenced(&self, content_hash: &ContentHash) -> bool {
        self.read().references.contains_key(content_hash)
    }

    fn content_count(&self) -> usize {
        self.read().content.len()
    }
}
