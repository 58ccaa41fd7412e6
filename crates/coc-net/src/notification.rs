use coc_dag::NodeHash;
use coc_identity::PeerId;
use tracing::info;

/// Fire-and-forget observer of peer activity
pub trait NotificationHandler: Send + Sync {
    fn on_message_received(&self, peer_id: &PeerId, node_hash: &NodeHash, sender_id: &PeerId);

    fn on_message_forwarded(&self, peer_id: &PeerId, node_hash: &NodeHash, recipients: &[PeerId]);

    fn on_deletion_requested(&self, peer_id: &PeerId, node_hash: &NodeHash, originator_id: &PeerId);

    fn on_peer_status_changed(&self, peer_id: &PeerId, online: bool);

    fn on_queue_processed(&self, peer_id: &PeerId, delivered: usize);
}

/// Default handler: every notification becomes a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationHandler;

impl NotificationHandler for LoggingNotificationHandler {
    fn on_message_received(&self, peer_id: &PeerId, node_hash: &NodeHash, sender_id: &PeerId) {
        info!(peer = %peer_id.short(), node = %node_hash.short(), sender = %sender_id.short(), "Message received");
    }

    fn on_message_forwarded(&self, peer_id: &PeerId, node_hash: &NodeHash, recipients: &[PeerId]) {
        info!(
            peer = %peer_id.short(),
            node = %node_hash.short(),
            recipients = recipients.len(),
            "Message forwarded"
        );
    }

    fn on_deletion_requested(&self, peer_id: &PeerId, node_hash: &NodeHash, originator_id: &PeerId) {
        info!(
            peer = %peer_id.short(),
            node = %node_hash.short(),
            originator = %originator_id.short(),
            "Deletion honoured"
        );
    }

    fn on_peer_status_changed(&self, peer_id: &PeerId, online: bool) {
        info!(peer = %peer_id.short(), online, "Peer status changed");
    }

    fn on_queue_processed(&self, peer_id: &PeerId, delivered: usize) {
        info!(peer = %peer_id.short(), delivered, "Offline queue processed");
    }
}
