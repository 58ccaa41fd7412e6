use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use coc_identity::PeerId;

use crate::config::NetworkConfig;
use crate::discovery::PeerDiscovery;
use crate::message::Envelope;
use crate::peer::Peer;

/// What the network did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivery scheduled after a simulated delay
    Scheduled,
    /// Recipient offline; appended to its queue
    Queued,
    /// Unknown recipient or unusable frame
    Dropped,
}

impl RouteOutcome {
    pub fn is_routed(self) -> bool {
        !matches!(self, RouteOutcome::Dropped)
    }
}

/// In-process message router with simulated latency
pub struct Network {
    discovery: Arc<dyn PeerDiscovery>,
    config: NetworkConfig,
    /// Deliveries scheduled but not yet completed
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Network {
    pub fn new(discovery: Arc<dyn PeerDiscovery>, config: NetworkConfig) -> Arc<Self> {
        info!(
            min_delay_ms = config.min_delay_ms,
            max_delay_ms = config.max_delay_ms,
            "Network simulator initialized"
        );
        Arc::new(Self {
            discovery,
            config,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    pub fn discovery(&self) -> &Arc<dyn PeerDiscovery> {
        &self.discovery
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn find_peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.discovery.find_peer(peer_id)
    }

    /// Register a peer and give it a handle back to this network
    pub fn add_peer(self: &Arc<Self>, peer: Arc<Peer>) -> bool {
        if !peer.attach(Arc::downgrade(self)) {
            warn!(peer = %peer.id().short(), "Peer already attached to a network");
        }
        let registered = self.discovery.register_peer(Arc::clone(&peer));
        info!(peer = %peer.id().short(), "Peer joined the network");
        registered
    }

    /// Number of scheduled deliveries still pending
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Deliver to an online recipient after a random delay, queue for an
    /// offline one, drop for an unknown one.
    ///
    /// The envelope is serialized here and decoded on arrival, so the
    /// recipient never shares memory with the sender's copy.
    pub fn route(self: &Arc<Self>, envelope: Envelope) -> RouteOutcome {
        let Some(recipient) = self.discovery.find_peer(&envelope.recipient_id) else {
            warn!(
                recipient = %envelope.recipient_id.short(),
                message_type = envelope.message_type(),
                "Peer does not exist, message dropped"
            );
            return RouteOutcome::Dropped;
        };

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode message, dropped");
                return RouteOutcome::Dropped;
            }
        };

        let copy = match Envelope::decode(&frame) {
            Ok(copy) => copy,
            Err(e) => {
                warn!(error = %e, "Undecodable frame, dropped");
                return RouteOutcome::Dropped;
            }
        };
        if recipient.accept_or_queue(copy).is_none() {
            info!(
                recipient = %envelope.recipient_id.short(),
                message_type = envelope.message_type(),
                "Peer is offline, message queued"
            );
            return RouteOutcome::Queued;
        }

        let delay = self.sample_delay();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        debug!(
            sender = %envelope.sender_id.short(),
            recipient = %envelope.recipient_id.short(),
            message_type = envelope.message_type(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling delivery"
        );

        match Handle::try_current() {
            Ok(handle) => {
                let network = Arc::clone(self);
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    network.deliver(&recipient, &frame);
                    network.complete_delivery();
                });
            }
            Err(_) => {
                self.deliver(&recipient, &frame);
                self.complete_delivery();
            }
        }

        RouteOutcome::Scheduled
    }

    /// Resolves once every scheduled delivery, including ones scheduled by
    /// other deliveries, has completed
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn sample_delay(&self) -> Duration {
        let (min, max) = self.config.delay_bounds_ms();
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn deliver(&self, recipient: &Peer, frame: &[u8]) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(recipient = %recipient.id().short(), error = %e, "Undecodable frame, dropped");
                return;
            }
        };

        match recipient.accept_or_queue(envelope) {
            Some(envelope) => recipient.receive(envelope),
            None => debug!(recipient = %recipient.id().short(), "Recipient went offline in flight, queued"),
        }
    }

    fn complete_delivery(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}
