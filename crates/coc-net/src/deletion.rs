use coc_audit::{AuditEventType, AuditLog};
use coc_dag::{CocNode, DeletionToken, NodeHash, NodeSource};
use coc_storage::StorageBackend;
use coc_identity::{PeerId, PublicKey};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::discovery::PeerDiscovery;
use crate::error::DeletionError;
use crate::peer::Peer;

/// Result of handing a revocation to a replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The originator is not registered, so the token cannot be checked
    UnknownOriginator,
    /// The signature does not verify against the originator's key
    InvalidSignature,
    /// Validly signed, but by someone other than the node's owner
    NotCustodian,
    /// The replica never held the node (or already dropped it)
    NotHeld,
    /// The node was removed
    Deleted {
        /// Whether the content went with it
        content_removed: bool,
        /// Hops this replica's owner produced and re-revoked in turn
        cascaded: Vec<NodeHash>,
    },
}

impl ProcessOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, ProcessOutcome::Deleted { .. })
    }
}

/// Issues and honours revocation tokens.
///
/// One engine is shared by every peer of a simulation. It records each
/// decision in the audit ledger and resolves originator keys through the
/// discovery registry, which it holds weakly since the registry owns the
/// peers that own the engine.
pub struct DeletionEngine {
    audit: Arc<AuditLog>,
    discovery: Weak<dyn PeerDiscovery>,
    clock: Arc<dyn Clock>,
}

impl DeletionEngine {
    pub fn new(audit: Arc<AuditLog>, discovery: &Arc<dyn PeerDiscovery>, clock: Arc<dyn Clock>) -> Self {
        Self {
            audit,
            discovery: Arc::downgrade(discovery),
            clock,
        }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Verifying key of a registered peer
    pub fn resolve_key(&self, peer_id: &PeerId) -> Option<PublicKey> {
        self.discovery.upgrade()?.public_key(peer_id)
    }

    /// Sign a revocation for `node`. Only its owner may do so.
    pub fn issue_token(&self, node: &CocNode, originator: &Peer) -> Result<DeletionToken, DeletionError> {
        if node.owner_id() != originator.id() {
            warn!(
                peer = %originator.id().short(),
                node = %node.node_hash().short(),
                owner = %node.owner_id().short(),
                "Refusing to issue token for a node the peer does not own"
            );
            return Err(DeletionError::Unauthorized {
                peer: originator.id().clone(),
                node: *node.node_hash(),
            });
        }

        let token = DeletionToken::issue(
            *node.node_hash(),
            originator.id().clone(),
            originator.keypair(),
            self.clock.now(),
        );

        self.audit.log_event(
            AuditEventType::DeleteIssue,
            originator.id().as_str(),
            &node_target(node.node_hash()),
            "",
        )?;
        info!(peer = %originator.id().short(), node = %node.node_hash().short(), "Issued deletion token");

        Ok(token)
    }

    /// Apply `token` to `peer`'s replica and re-revoke the hops `peer` itself
    /// forwarded from the deleted node. Never fails; every rejection is an
    /// outcome.
    pub fn process_token(&self, token: &DeletionToken, peer: &Peer) -> ProcessOutcome {
        let target = node_target(&token.node_hash);

        let Some(public_key) = self.resolve_key(&token.originator_id) else {
            debug!(
                peer = %peer.id().short(),
                originator = %token.originator_id.short(),
                "Originator unknown, cannot verify token"
            );
            return ProcessOutcome::UnknownOriginator;
        };

        if !token.verify(&public_key) {
            warn!(
                peer = %peer.id().short(),
                node = %token.node_hash.short(),
                originator = %token.originator_id.short(),
                "Invalid signature on deletion token, discarding"
            );
            self.record(AuditEventType::DeleteFail, peer.id(), &target, "Invalid signature");
            return ProcessOutcome::InvalidSignature;
        }

        let (content_removed, children) = {
            let _replica = peer.lock_replica();
            let storage = peer.storage();

            let Some(node) = storage.get_node(&token.node_hash) else {
                debug!(peer = %peer.id().short(), node = %token.node_hash.short(), "Node not held, nothing to delete");
                return ProcessOutcome::NotHeld;
            };

            if node.owner_id() != &token.originator_id {
                warn!(
                    peer = %peer.id().short(),
                    node = %token.node_hash.short(),
                    originator = %token.originator_id.short(),
                    owner = %node.owner_id().short(),
                    "Deletion token not signed by the node owner"
                );
                self.record(
                    AuditEventType::DeleteFail,
                    peer.id(),
                    &target,
                    "originator is not the node owner",
                );
                return ProcessOutcome::NotCustodian;
            }

            // Hops this peer produced from the node; it alone can revoke them
            let children: Vec<CocNode> = node
                .children_hashes()
                .iter()
                .filter_map(|hash| storage.get_node(hash))
                .filter(|child| child.owner_id() == peer.id())
                .collect();

            let content_removed = storage
                .evict_node(node.node_hash())
                .map(|eviction| eviction.content_removed)
                .unwrap_or(false);

            (content_removed, children)
        };

        self.record(AuditEventType::DeleteSuccess, peer.id(), &target, "");
        info!(
            peer = %peer.id().short(),
            node = %token.node_hash.short(),
            content_removed,
            cascading = children.len(),
            "Deleted node"
        );
        peer.notifications()
            .on_deletion_requested(peer.id(), &token.node_hash, &token.originator_id);

        let mut cascaded = Vec::with_capacity(children.len());
        for child in children {
            match peer.initiate_deletion(&child) {
                Ok(_) => cascaded.push(*child.node_hash()),
                Err(e) => error!(
                    peer = %peer.id().short(),
                    node = %child.node_hash().short(),
                    error = %e,
                    "Failed to cascade deletion"
                ),
            }
        }

        ProcessOutcome::Deleted {
            content_removed,
            cascaded,
        }
    }

    fn record(&self, event: AuditEventType, actor: &PeerId, target: &str, details: &str) {
        if let Err(e) = self.audit.log_event(event, actor.as_str(), target, details) {
            error!(event = %event, error = %e, "Failed to write audit entry");
        }
    }
}

fn node_target(node_hash: &NodeHash) -> String {
    format!("Node: {}", node_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::discovery::PeerRegistry;
    use crate::message::{Envelope, Payload};
    use coc_identity::{generate_keypair, hash_content, Signature};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        audit: Arc<AuditLog>,
        registry: Arc<dyn PeerDiscovery>,
        engine: Arc<DeletionEngine>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let audit = Arc::new(AuditLog::open(dir.path()).unwrap());
            let registry: Arc<dyn PeerDiscovery> = Arc::new(PeerRegistry::new());
            let engine = Arc::new(DeletionEngine::new(audit.clone(), &registry, Arc::new(SystemClock)));
            Self {
                _dir: dir,
                audit,
                registry,
                engine,
            }
        }

        fn peer(&self, name: &str) -> Arc<Peer> {
            let peer = Peer::builder(self.engine.clone()).id(PeerId::new(name)).build();
            self.registry.register_peer(peer.clone());
            peer
        }

        fn count(&self, event: AuditEventType) -> usize {
            self.audit
                .entries()
                .unwrap()
                .iter()
                .filter(|e| e.event_type == event.as_str())
                .count()
        }
    }

    fn hand_over(from: &Peer, to: &Peer, node: &CocNode, content: &[u8]) {
        to.receive(Envelope::new(
            from.id().clone(),
            to.id().clone(),
            Payload::CocData {
                node: node.clone(),
                content: content.to_vec(),
            },
        ));
    }

    #[test]
    fn test_non_owner_cannot_issue() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let root = alice.create_root(b"hello", vec![bob.id().clone()]);

        let result = fx.engine.issue_token(&root, &bob);
        assert!(matches!(result, Err(DeletionError::Unauthorized { .. })));
        assert_eq!(fx.count(AuditEventType::DeleteIssue), 0);
        assert!(alice.storage().contains_node(root.node_hash()));
    }

    #[test]
    fn test_owner_token_deletes_replica() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let root = alice.create_root(b"hello", vec![bob.id().clone()]);
        hand_over(&alice, &bob, &root, b"hello");
        assert!(bob.storage().contains_node(root.node_hash()));

        let token = fx.engine.issue_token(&root, &alice).unwrap();
        assert!(token.verify(&alice.public_key()));
        assert_eq!(fx.count(AuditEventType::DeleteIssue), 1);

        let outcome = fx.engine.process_token(&token, &bob);
        assert_eq!(
            outcome,
            ProcessOutcome::Deleted {
                content_removed: true,
                cascaded: vec![]
            }
        );
        assert!(!bob.storage().contains_node(root.node_hash()));
        assert!(bob.storage().get_content(root.content_hash()).is_none());
        assert_eq!(fx.count(AuditEventType::DeleteSuccess), 1);

        // Replaying the token changes nothing
        assert_eq!(fx.engine.process_token(&token, &bob), ProcessOutcome::NotHeld);
        assert_eq!(fx.count(AuditEventType::DeleteSuccess), 1);
    }

    #[test]
    fn test_bad_signature_leaves_replica_untouched() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let mallory_keys = generate_keypair();
        let root = alice.create_root(b"hello", vec![bob.id().clone()]);
        hand_over(&alice, &bob, &root, b"hello");

        let mut tampered = fx.engine.issue_token(&root, &alice).unwrap();
        let mut bytes = tampered.signature.as_bytes().to_vec();
        bytes[0] ^= 0x01;
        tampered.signature = Signature::new(bytes);

        let forged = DeletionToken::issue(*root.node_hash(), alice.id().clone(), &mallory_keys, chrono::Utc::now());

        for token in [tampered, forged] {
            assert_eq!(fx.engine.process_token(&token, &bob), ProcessOutcome::InvalidSignature);
            assert!(bob.storage().contains_node(root.node_hash()));
            assert!(bob.storage().get_content(root.content_hash()).is_some());
        }
        assert_eq!(fx.count(AuditEventType::DeleteFail), 2);
        assert_eq!(fx.count(AuditEventType::DeleteSuccess), 0);
        assert!(fx.audit.verify_log_integrity());
    }

    #[test]
    fn test_token_from_non_owner_is_rejected() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let carol = fx.peer("carol");
        let root = alice.create_root(b"hello", vec![bob.id().clone(), carol.id().clone()]);
        hand_over(&alice, &carol, &root, b"hello");

        // Bob signs with his own key, so the signature is fine
        let token = DeletionToken::issue(*root.node_hash(), bob.id().clone(), bob.keypair(), chrono::Utc::now());
        assert_eq!(fx.engine.process_token(&token, &carol), ProcessOutcome::NotCustodian);
        assert!(carol.storage().contains_node(root.node_hash()));

        let fail = fx
            .audit
            .entries()
            .unwrap()
            .into_iter()
            .find(|e| e.event_type == "DELETE_FAIL")
            .unwrap();
        assert_eq!(fail.details, "originator is not the node owner");
        assert_eq!(fail.actor, "carol");
    }

    #[test]
    fn test_unknown_originator_is_soft() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let ghost_keys = generate_keypair();
        let root = alice.create_root(b"hello", vec![]);

        let token = DeletionToken::issue(*root.node_hash(), PeerId::new("ghost"), &ghost_keys, chrono::Utc::now());
        assert_eq!(fx.engine.process_token(&token, &alice), ProcessOutcome::UnknownOriginator);
        assert!(alice.storage().contains_node(root.node_hash()));
        assert_eq!(fx.count(AuditEventType::DeleteFail), 0);
    }

    #[test]
    fn test_token_for_unheld_node_is_noop() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let dave = fx.peer("dave");
        let root = alice.create_root(b"hello", vec![]);
        let token = fx.engine.issue_token(&root, &alice).unwrap();

        let before = fx.audit.entries().unwrap().len();
        assert_eq!(fx.engine.process_token(&token, &dave), ProcessOutcome::NotHeld);
        assert_eq!(fx.audit.entries().unwrap().len(), before);
        assert_eq!(hash_content(b"hello"), *root.content_hash());
    }

    #[test]
    fn test_cascade_through_own_forwards() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let root = alice.create_root(b"hello", vec![bob.id().clone()]);
        hand_over(&alice, &bob, &root, b"hello");

        let forward = bob.forward(root.node_hash(), vec![PeerId::new("carol")]).unwrap();
        assert!(bob
            .storage()
            .get_node(root.node_hash())
            .unwrap()
            .children_hashes()
            .contains(forward.node_hash()));

        let token = fx.engine.issue_token(&root, &alice).unwrap();
        let outcome = fx.engine.process_token(&token, &bob);
        assert_eq!(
            outcome,
            ProcessOutcome::Deleted {
                content_removed: false,
                cascaded: vec![*forward.node_hash()]
            }
        );

        // Bob's own revocation of the forward is applied to his replica too
        assert_eq!(bob.storage().node_count(), 0);
        assert_eq!(bob.storage().content_count(), 0);
        assert_eq!(fx.count(AuditEventType::DeleteIssue), 2);
        assert_eq!(fx.count(AuditEventType::DeleteSuccess), 2);
    }

    #[test]
    fn test_forward_of_revoked_node_fails() {
        let fx = Fixture::new();
        let alice = fx.peer("alice");
        let bob = fx.peer("bob");
        let root = alice.create_root(b"hello", vec![bob.id().clone()]);
        hand_over(&alice, &bob, &root, b"hello");

        let token = fx.engine.issue_token(&root, &alice).unwrap();
        assert!(fx.engine.process_token(&token, &bob).is_deleted());

        let result = bob.forward(root.node_hash(), vec![PeerId::new("carol")]);
        assert!(matches!(result, Err(crate::error::NetError::NodeNotFound(_))));
        assert_eq!(bob.storage().node_count(), 0);
    }

    #[test]
    fn test_no_forward_survives_concurrent_revocation() {
        for _ in 0..20 {
            let fx = Fixture::new();
            let alice = fx.peer("alice");
            let bob = fx.peer("bob");
            let root = alice.create_root(b"hello", vec![bob.id().clone()]);
            hand_over(&alice, &bob, &root, b"hello");
            let token = fx.engine.issue_token(&root, &alice).unwrap();

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for i in 0..200 {
                        let recipient = PeerId::new(format!("carol-{}", i));
                        if bob.forward(root.node_hash(), vec![recipient]).is_err() {
                            break;
                        }
                    }
                });
                scope.spawn(|| {
                    assert!(fx.engine.process_token(&token, &bob).is_deleted());
                });
            });

            // Every forward minted before the revocation was cascaded; none after it exist
            assert_eq!(bob.storage().node_count(), 0);
            assert_eq!(bob.storage().content_count(), 0);
        }
    }
}
