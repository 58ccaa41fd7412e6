use chrono::{DateTime, Utc};
use coc_dag::{CocNode, ContentHash, DeletionToken, NodeHash, NodeSource};
use coc_identity::{hash_content, KeyPair, PeerId, PublicKey};
use coc_storage::{InMemoryStorage, StorageBackend};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::PeerConfig;
use crate::deletion::DeletionEngine;
use crate::error::{DeletionError, NetError, NetResult};
use crate::message::{Envelope, Payload};
use crate::monitor::{EncryptionPolicy, NoEncryption, NullTransferMonitor, TransferAccessType, TransferMonitor};
use crate::network::{Network, RouteOutcome};
use crate::notification::{LoggingNotificationHandler, NotificationHandler};

/// A message waiting for its offline recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub enqueued_at: DateTime<Utc>,
    pub envelope: Envelope,
}

/// What happened to the offline queue on coming back online
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages handed to the receive path
    pub delivered: usize,
    /// Messages older than the TTL, dropped unread
    pub expired: usize,
}

struct PeerState {
    online: bool,
    last_transition: DateTime<Utc>,
    queue: VecDeque<QueuedMessage>,
    evicted: usize,
}

/// A custody participant: one keypair, one replica, one offline queue
pub struct Peer {
    id: PeerId,
    keypair: KeyPair,
    storage: Box<dyn StorageBackend>,
    state: Mutex<PeerState>,
    /// Serializes multi-step replica mutations (receive, forward, revoke)
    replica: Mutex<()>,
    network: OnceLock<Weak<Network>>,
    engine: Arc<DeletionEngine>,
    monitor: Arc<dyn TransferMonitor>,
    encryption: Arc<dyn EncryptionPolicy>,
    notifications: Arc<dyn NotificationHandler>,
    clock: Arc<dyn Clock>,
    config: PeerConfig,
}

/// Builder for [`Peer`]; everything but the deletion engine has a default
pub struct PeerBuilder {
    engine: Arc<DeletionEngine>,
    id: Option<PeerId>,
    keypair: Option<KeyPair>,
    storage: Option<Box<dyn StorageBackend>>,
    monitor: Option<Arc<dyn TransferMonitor>>,
    encryption: Option<Arc<dyn EncryptionPolicy>>,
    notifications: Option<Arc<dyn NotificationHandler>>,
    clock: Option<Arc<dyn Clock>>,
    config: PeerConfig,
    online: bool,
}

impl PeerBuilder {
    /// Peer identifier; a random UUID if unset
    pub fn id(mut self, id: PeerId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    pub fn storage(mut self, storage: Box<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transfer_monitor(mut self, monitor: Arc<dyn TransferMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn encryption_policy(mut self, encryption: Arc<dyn EncryptionPolicy>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn notification_handler(mut self, notifications: Arc<dyn NotificationHandler>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Clock for queue timestamps; defaults to the engine's
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start offline instead of online
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn build(self) -> Arc<Peer> {
        let clock = self.clock.unwrap_or_else(|| self.engine.clock().clone());
        let id = self.id.unwrap_or_else(|| PeerId::new(Uuid::new_v4().to_string()));

        let peer = Peer {
            keypair: self.keypair.unwrap_or_else(KeyPair::generate),
            storage: self.storage.unwrap_or_else(|| Box::new(InMemoryStorage::new())),
            state: Mutex::new(PeerState {
                online: self.online,
                last_transition: clock.now(),
                queue: VecDeque::new(),
                evicted: 0,
            }),
            replica: Mutex::new(()),
            network: OnceLock::new(),
            engine: self.engine,
            monitor: self.monitor.unwrap_or_else(|| Arc::new(NullTransferMonitor)),
            encryption: self.encryption.unwrap_or_else(|| Arc::new(NoEncryption)),
            notifications: self
                .notifications
                .unwrap_or_else(|| Arc::new(LoggingNotificationHandler)),
            clock,
            config: self.config,
            id,
        };

        info!(peer = %peer.id.short(), online = self.online, "Created peer");
        Arc::new(peer)
    }
}

impl Peer {
    pub fn builder(engine: Arc<DeletionEngine>) -> PeerBuilder {
        PeerBuilder {
            engine,
            id: None,
            keypair: None,
            storage: None,
            monitor: None,
            encryption: None,
            notifications: None,
            clock: None,
            config: PeerConfig::default(),
            online: true,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// This peer's replica
    pub fn storage(&self) -> &dyn StorageBackend {
        self.storage.as_ref()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.state().online
    }

    /// When the peer last went online or offline
    pub fn last_transition(&self) -> DateTime<Utc> {
        self.state().last_transition
    }

    pub fn queue_len(&self) -> usize {
        self.state().queue.len()
    }

    /// Snapshot of the offline queue, oldest first
    pub fn queued_messages(&self) -> Vec<QueuedMessage> {
        self.state().queue.iter().cloned().collect()
    }

    /// Messages evicted because the offline queue was full
    pub fn evicted_count(&self) -> usize {
        self.state().evicted
    }

    /// The network this peer was added to, if it still exists
    pub fn network(&self) -> Option<Arc<Network>> {
        self.network.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, network: Weak<Network>) -> bool {
        self.network.set(network).is_ok()
    }

    pub(crate) fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub(crate) fn notifications(&self) -> &dyn NotificationHandler {
        self.notifications.as_ref()
    }

    pub(crate) fn lock_replica(&self) -> MutexGuard<'_, ()> {
        self.replica.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a root hop for new content and keep both locally
    pub fn create_root(&self, content: &[u8], recipients: impl IntoIterator<Item = PeerId>) -> CocNode {
        let content_hash = hash_content(content);
        let node = CocNode::root(content_hash, &self.id, &self.keypair, recipients, self.clock.now());

        {
            let _replica = self.lock_replica();
            self.storage.put_content(content_hash, content.to_vec());
            self.storage.put_node(node.clone());
        }

        info!(
            peer = %self.id.short(),
            node = %node.node_hash().short(),
            recipients = node.recipient_ids().len(),
            "Created root node"
        );
        node
    }

    /// Mint a child of a locally held hop, recording this peer as its owner
    pub fn forward(&self, parent_hash: &NodeHash, recipients: impl IntoIterator<Item = PeerId>) -> NetResult<CocNode> {
        // Held from lookup to insert: a concurrent revocation either collects
        // the child or leaves no parent to forward from
        let child = {
            let _replica = self.lock_replica();
            let parent = self
                .storage
                .get_node(parent_hash)
                .ok_or(NetError::NodeNotFound(*parent_hash))?;
            let mut child = CocNode::forward_of(&parent, &self.id, &self.keypair, recipients, self.clock.now())?;

            let linked = self.storage.update_node(parent_hash, &mut |stored: &mut CocNode| {
                stored.add_child(&mut child);
            });
            if !linked {
                return Err(NetError::NodeNotFound(*parent_hash));
            }
            self.storage.put_node(child.clone());
            child
        };

        self.monitor
            .on_message_accessed(child.content_hash(), &self.id, TransferAccessType::Forward);
        self.notifications
            .on_message_forwarded(&self.id, child.node_hash(), child.recipient_ids());
        info!(
            peer = %self.id.short(),
            parent = %parent_hash.short(),
            node = %child.node_hash().short(),
            depth = child.depth(),
            "Forwarded node"
        );

        Ok(child)
    }

    /// Send a held hop and its content to each of its recipients. Returns how
    /// many sends the network accepted.
    pub fn share(&self, node: &CocNode) -> usize {
        let content_hash = node.content_hash();
        let Some(content) = self.storage.get_content(content_hash) else {
            warn!(
                peer = %self.id.short(),
                node = %node.node_hash().short(),
                "Content not held locally, skipping send"
            );
            return 0;
        };

        let mut routed = 0;
        for recipient in node.recipient_ids() {
            if recipient == &self.id {
                continue;
            }

            self.monitor.on_transfer_attempt(content_hash, &self.id, recipient);
            if !self.monitor.should_allow_transfer(content_hash, &self.id) {
                info!(
                    peer = %self.id.short(),
                    recipient = %recipient.short(),
                    node = %node.node_hash().short(),
                    "Transfer blocked by monitor"
                );
                continue;
            }

            let mode = self
                .monitor
                .get_encryption_policy(content_hash, recipient)
                .forced_mode()
                .unwrap_or_else(|| self.encryption.policy_for_peer(recipient));
            let sealed = self.encryption.encrypt_for_transfer(&content, recipient, mode);

            let payload = Payload::CocData {
                node: node.clone().into_replica(),
                content: sealed,
            };
            if self.send(recipient, payload).is_routed() {
                routed += 1;
            }
        }
        routed
    }

    /// Hand a payload to the network
    pub fn send(&self, recipient: &PeerId, payload: Payload) -> RouteOutcome {
        let Some(network) = self.network() else {
            warn!(
                peer = %self.id.short(),
                recipient = %recipient.short(),
                message_type = payload.message_type(),
                "Cannot send message: not connected to a network"
            );
            return RouteOutcome::Dropped;
        };
        network.route(Envelope::new(self.id.clone(), recipient.clone(), payload))
    }

    /// Revoke a hop this peer owns: drop it from the local replica and send
    /// the token to the hop's recipients
    pub fn initiate_deletion(&self, node: &CocNode) -> Result<DeletionToken, DeletionError> {
        let token = self.engine.issue_token(node, self)?;

        let local = self.engine.process_token(&token, self);
        debug!(peer = %self.id.short(), node = %node.node_hash().short(), outcome = ?local, "Applied revocation locally");

        for recipient in node.recipient_ids() {
            if recipient != &self.id {
                self.send(recipient, Payload::DeletionToken(token.clone()));
            }
        }
        Ok(token)
    }

    pub fn go_offline(&self) {
        {
            let mut state = self.state();
            state.online = false;
            state.last_transition = self.clock.now();
        }
        self.notifications.on_peer_status_changed(&self.id, false);
        info!(peer = %self.id.short(), "Went offline");
    }

    /// Come online and drain the offline queue in enqueue order, dropping
    /// anything older than the TTL. The queue is empty afterwards.
    pub fn go_online(&self) -> DrainReport {
        let now = self.clock.now();
        let queued = {
            let mut state = self.state();
            state.online = true;
            state.last_transition = now;
            std::mem::take(&mut state.queue)
        };
        self.notifications.on_peer_status_changed(&self.id, true);

        let ttl = self.config.message_ttl();
        let mut report = DrainReport::default();
        for QueuedMessage { enqueued_at, envelope } in queued {
            if now - enqueued_at <= ttl {
                self.receive(envelope);
                report.delivered += 1;
            } else {
                debug!(
                    peer = %self.id.short(),
                    sender = %envelope.sender_id.short(),
                    message_type = envelope.message_type(),
                    "Queued message expired"
                );
                report.expired += 1;
            }
        }

        self.notifications.on_queue_processed(&self.id, report.delivered);
        info!(
            peer = %self.id.short(),
            delivered = report.delivered,
            expired = report.expired,
            "Came online, offline queue processed"
        );
        report
    }

    /// Queue `envelope` if this peer is offline, otherwise hand it back for
    /// immediate delivery. The state check and the push happen under one
    /// lock, so nothing can land in the queue after `go_online` drained it.
    pub(crate) fn accept_or_queue(&self, envelope: Envelope) -> Option<Envelope> {
        let enqueued_at = self.clock.now();
        let cap = self.config.max_offline_queue;

        let mut state = self.state();
        if state.online {
            return Some(envelope);
        }
        state.queue.push_back(QueuedMessage { enqueued_at, envelope });
        while cap > 0 && state.queue.len() > cap {
            if let Some(evicted) = state.queue.pop_front() {
                state.evicted += 1;
                warn!(
                    peer = %self.id.short(),
                    sender = %evicted.envelope.sender_id.short(),
                    cap,
                    "Offline queue full, evicted oldest message"
                );
            }
        }
        None
    }

    /// Handle a message addressed to this peer
    pub fn receive(&self, envelope: Envelope) {
        let Envelope {
            sender_id,
            recipient_id,
            payload,
        } = envelope;

        if recipient_id != self.id {
            warn!(peer = %self.id.short(), recipient = %recipient_id.short(), "Dropping misaddressed message");
            return;
        }

        match payload {
            Payload::CocData { node, content } => self.receive_node(node, content, &sender_id),
            Payload::DeletionToken(token) => {
                let outcome = self.engine.process_token(&token, self);
                debug!(
                    peer = %self.id.short(),
                    node = %token.node_hash.short(),
                    outcome = ?outcome,
                    "Processed deletion token"
                );
            }
        }
    }

    fn receive_node(&self, node: CocNode, sealed: Vec<u8>, sender_id: &PeerId) {
        let node_hash = *node.node_hash();
        let content_hash = *node.content_hash();

        let Some(content) = self.encryption.decrypt_if_allowed(&sealed, &self.id) else {
            warn!(peer = %self.id.short(), node = %node_hash.short(), "Cannot unseal content, dropping node");
            return;
        };
        if hash_content(&content) != content_hash {
            warn!(peer = %self.id.short(), node = %node_hash.short(), "Content does not match its hash, dropping node");
            return;
        }
        if let Some(owner_key) = self.engine.resolve_key(node.owner_id()) {
            if !node.verify_signature(&owner_key) {
                warn!(
                    peer = %self.id.short(),
                    node = %node_hash.short(),
                    owner = %node.owner_id().short(),
                    "Node signature does not verify, dropping node"
                );
                return;
            }
        }

        self.store_replica(node.into_replica(), content);

        self.monitor
            .on_message_accessed(&content_hash, &self.id, TransferAccessType::Save);
        self.notifications
            .on_message_received(&self.id, &node_hash, sender_id);
        info!(peer = %self.id.short(), node = %node_hash.short(), sender = %sender_id.short(), "Received and stored node");
    }

    fn store_replica(&self, mut node: CocNode, content: Vec<u8>) {
        let _replica = self.lock_replica();

        if let Some(existing) = self.storage.get_node(node.node_hash()) {
            node.merge_children(&existing);
        }

        if let Some(parent_hash) = node.parent_hash().copied() {
            let linked = self.storage.update_node(&parent_hash, &mut |parent: &mut CocNode| {
                parent.add_child(&mut node);
            });
            if !linked {
                debug!(
                    peer = %self.id.short(),
                    node = %node.node_hash().short(),
                    parent = %parent_hash.short(),
                    "Parent not held, storing without backlink"
                );
            }
        }

        if self.config.repair_orphans {
            self.adopt_orphans(&mut node);
        }

        self.storage.put_content(*node.content_hash(), content);
        self.storage.put_node(node);
    }

    /// Link children that arrived before `node` did
    fn adopt_orphans(&self, node: &mut CocNode) {
        let orphans: Vec<CocNode> = self
            .storage
            .children_of(node.node_hash())
            .into_iter()
            .filter(|n| !node.children_hashes().contains(n.node_hash()))
            .collect();

        for mut orphan in orphans {
            if node.add_child(&mut orphan) {
                debug!(
                    peer = %self.id.short(),
                    parent = %node.node_hash().short(),
                    child = %orphan.node_hash().short(),
                    "Linked orphaned child"
                );
                self.storage.put_node(orphan);
            }
        }
    }

    /// Read held content, reporting the access to the transfer monitor
    pub fn read_content(&self, content_hash: &ContentHash) -> Option<Vec<u8>> {
        let content = self.storage.get_content(content_hash)?;
        self.monitor
            .on_message_accessed(content_hash, &self.id, TransferAccessType::Read);
        Some(content)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("online", &state.online)
            .field("queued", &state.queue.len())
            .field("nodes", &self.storage.node_count())
            .finish()
    }
}
