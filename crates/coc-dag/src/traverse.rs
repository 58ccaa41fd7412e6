/*!
Local walks over a replica's custody tree.

Both walks are iterative and keep a visited set: authentic data forms a tree,
but a corrupted replica must not be able to send them round in circles.
*/

use std::collections::{HashMap, HashSet};

use crate::{CocNode, NodeHash};

/// Anything that can resolve a node hash to the locally held node
pub trait NodeSource {
    /// Look up a node, returning `None` if it is not held locally
    fn get_node(&self, node_hash: &NodeHash) -> Option<CocNode>;
}

impl NodeSource for HashMap<NodeHash, CocNode> {
    fn get_node(&self, node_hash: &NodeHash) -> Option<CocNode> {
        self.get(node_hash).cloned()
    }
}

/// Lazy depth-first walk over the locally known descendants of a node
pub struct Descendants<'a, S: ?Sized> {
    source: &'a S,
    stack: Vec<NodeHash>,
    visited: HashSet<NodeHash>,
}

impl<'a, S: NodeSource + ?Sized> Iterator for Descendants<'a, S> {
    type Item = CocNode;

    fn next(&mut self) -> Option<CocNode> {
        while let Some(hash) = self.stack.pop() {
            if !self.visited.insert(hash) {
                continue;
            }
            let Some(node) = self.source.get_node(&hash) else {
                continue;
            };
            self.stack
                .extend(node.children_hashes().iter().rev().copied());
            return Some(node);
        }
        None
    }
}

/// Walk every descendant of `node` reachable through local child links.
/// Children missing from `source` are skipped along with their subtrees.
pub fn descendants<'a, S: NodeSource + ?Sized>(node: &CocNode, source: &'a S) -> Descendants<'a, S> {
    let mut visited = HashSet::new();
    visited.insert(*node.node_hash());

    Descendants {
        source,
        stack: node.children_hashes().iter().rev().copied().collect(),
        visited,
    }
}

/// Walk from a node's parent up towards the root
pub struct Ancestors<'a, S: ?Sized> {
    source: &'a S,
    next: Option<NodeHash>,
    visited: HashSet<NodeHash>,
}

impl<'a, S: NodeSource + ?Sized> Iterator for Ancestors<'a, S> {
    type Item = CocNode;

    fn next(&mut self) -> Option<CocNode> {
        let hash = self.next.take()?;
        if !self.visited.insert(hash) {
            return None;
        }
        let node = self.source.get_node(&hash)?;
        self.next = node.parent_hash().copied();
        Some(node)
    }
}

/// Walk the parent chain of `node`. Stops at the root or at the first
/// ancestor not held in `source`. Callers authenticating a chain verify
/// each yielded hop against its owner's key.
pub fn ancestors<'a, S: NodeSource + ?Sized>(node: &CocNode, source: &'a S) -> Ancestors<'a, S> {
    let mut visited = HashSet::new();
    visited.insert(*node.node_hash());

    Ancestors {
        source,
        next: node.parent_hash().copied(),
        visited,
    }
}
