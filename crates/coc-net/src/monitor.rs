//! Extension points consulted on every outbound content transfer.

use coc_dag::ContentHash;
use coc_identity::PeerId;
use serde::{Deserialize, Serialize};

/// How a peer touched a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferAccessType {
    Read,
    Copy,
    Save,
    Forward,
}

/// What a monitor wants done with content leaving a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionPolicyKind {
    /// Defer to the sender's [`EncryptionPolicy`]
    Allow,
    /// Seal so a known key can recover it
    KnownKey,
    /// Seal with a key nobody keeps
    UnknownKey,
}

/// Observes and gates content transfers
pub trait TransferMonitor: Send + Sync {
    fn on_message_accessed(&self, content_hash: &ContentHash, peer_id: &PeerId, access: TransferAccessType);

    fn on_transfer_attempt(&self, content_hash: &ContentHash, peer_id: &PeerId, destination: &PeerId);

    fn should_allow_transfer(&self, content_hash: &ContentHash, peer_id: &PeerId) -> bool;

    fn get_encryption_policy(&self, content_hash: &ContentHash, peer_id: &PeerId) -> EncryptionPolicyKind;
}

/// Monitor that allows everything and records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransferMonitor;

impl TransferMonitor for NullTransferMonitor {
    fn on_message_accessed(&self, _: &ContentHash, _: &PeerId, _: TransferAccessType) {}

    fn on_transfer_attempt(&self, _: &ContentHash, _: &PeerId, _: &PeerId) {}

    fn should_allow_transfer(&self, _: &ContentHash, _: &PeerId) -> bool {
        true
    }

    fn get_encryption_policy(&self, _: &ContentHash, _: &PeerId) -> EncryptionPolicyKind {
        EncryptionPolicyKind::Allow
    }
}

/// Sealing mode applied to content in transit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionMode {
    None,
    Recoverable,
    Irrecoverable,
}

impl EncryptionPolicyKind {
    /// Mode the monitor insists on, if any
    pub fn forced_mode(self) -> Option<EncryptionMode> {
        match self {
            EncryptionPolicyKind::Allow => None,
            EncryptionPolicyKind::KnownKey => Some(EncryptionMode::Recoverable),
            EncryptionPolicyKind::UnknownKey => Some(EncryptionMode::Irrecoverable),
        }
    }
}

/// Seals content for a recipient and unseals it on arrival
pub trait EncryptionPolicy: Send + Sync {
    fn policy_for_peer(&self, peer_id: &PeerId) -> EncryptionMode;

    fn encrypt_for_transfer(&self, content: &[u8], peer_id: &PeerId, mode: EncryptionMode) -> Vec<u8>;

    fn can_decrypt(&self, sealed: &[u8], peer_id: &PeerId) -> bool;

    /// `None` if `peer_id` may not recover the content
    fn decrypt_if_allowed(&self, sealed: &[u8], peer_id: &PeerId) -> Option<Vec<u8>>;
}

/// Content travels as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEncryption;

impl EncryptionPolicy for NoEncryption {
    fn policy_for_peer(&self, _: &PeerId) -> EncryptionMode {
        EncryptionMode::None
    }

    fn encrypt_for_transfer(&self, content: &[u8], _: &PeerId, _: EncryptionMode) -> Vec<u8> {
        content.to_vec()
    }

    fn can_decrypt(&self, _: &[u8], _: &PeerId) -> bool {
        true
    }

    fn decrypt_if_allowed(&self, sealed: &[u8], _: &PeerId) -> Option<Vec<u8>> {
        Some(sealed.to_vec())
    }
}
