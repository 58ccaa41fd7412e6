use coc_identity::{PeerId, PublicKey};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::peer::Peer;

/// Registry mapping peer identities to live peers
pub trait PeerDiscovery: Send + Sync {
    fn find_peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>>;

    /// Register (or replace) a peer under its id
    fn register_peer(&self, peer: Arc<Peer>) -> bool;

    fn unregister_peer(&self, peer_id: &PeerId) -> bool;

    fn list_online_peers(&self) -> Vec<PeerId>;

    /// `false` for unknown peers
    fn get_peer_status(&self, peer_id: &PeerId) -> bool;

    /// Verifying key of a registered peer
    fn public_key(&self, peer_id: &PeerId) -> Option<PublicKey> {
        self.find_peer(peer_id).map(|peer| peer.public_key())
    }
}

/// In-process registry, scoped to one simulation run
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerDiscovery for PeerRegistry {
    fn find_peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer_id)
            .cloned()
    }

    fn register_peer(&self, peer: Arc<Peer>) -> bool {
        debug!(peer = %peer.id().short(), "Registering peer");
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.id().clone(), peer);
        true
    }

    fn unregister_peer(&self, peer_id: &PeerId) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer_id)
            .is_some()
    }

    fn list_online_peers(&self) -> Vec<PeerId> {
        let mut online: Vec<PeerId> = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|peer| peer.is_online())
            .map(|peer| peer.id().clone())
            .collect();
        online.sort();
        online
    }

    fn get_peer_status(&self, peer_id: &PeerId) -> bool {
        self.find_peer(peer_id).map(|peer| peer.is_online()).unwrap_or(false)
    }
}
