use anyhow::Result;
use coc_audit::AuditLog;
use coc_dag::{ContentHash, NodeHash, NodeSource};
use coc_identity::PeerId;
use coc_storage::StorageBackend;
use coc_net::{
    DeletionEngine, EncryptionMode, EncryptionPolicy, EncryptionPolicyKind, Network, NetworkConfig,
    NotificationHandler, Peer, PeerDiscovery, PeerRegistry, SystemClock, TransferAccessType,
    TransferMonitor,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingMonitor {
    deny: bool,
    force: Option<EncryptionPolicyKind>,
    accesses: Mutex<Vec<(PeerId, TransferAccessType)>>,
    attempts: Mutex<Vec<(PeerId, PeerId)>>,
}

impl TransferMonitor for RecordingMonitor {
    fn on_message_accessed(&self, _: &ContentHash, peer_id: &PeerId, access: TransferAccessType) {
        self.accesses.lock().unwrap().push((peer_id.clone(), access));
    }

    fn on_transfer_attempt(&self, _: &ContentHash, peer_id: &PeerId, destination: &PeerId) {
        self.attempts
            .lock()
            .unwrap()
            .push((peer_id.clone(), destination.clone()));
    }

    fn should_allow_transfer(&self, _: &ContentHash, _: &PeerId) -> bool {
        !self.deny
    }

    fn get_encryption_policy(&self, _: &ContentHash, _: &PeerId) -> EncryptionPolicyKind {
        self.force.unwrap_or(EncryptionPolicyKind::Allow)
    }
}

/// XOR "sealing"; irrecoverable content cannot be opened by anyone
#[derive(Default)]
struct XorSeal {
    modes: Mutex<Vec<EncryptionMode>>,
}

impl EncryptionPolicy for XorSeal {
    fn policy_for_peer(&self, _: &PeerId) -> EncryptionMode {
        EncryptionMode::Recoverable
    }

    fn encrypt_for_transfer(&self, content: &[u8], _: &PeerId, mode: EncryptionMode) -> Vec<u8> {
        self.modes.lock().unwrap().push(mode);
        let mut sealed = vec![mode as u8];
        sealed.extend(content.iter().map(|b| b ^ 0x5a));
        sealed
    }

    fn can_decrypt(&self, sealed: &[u8], _: &PeerId) -> bool {
        sealed.first() == Some(&(EncryptionMode::Recoverable as u8))
    }

    fn decrypt_if_allowed(&self, sealed: &[u8], peer_id: &PeerId) -> Option<Vec<u8>> {
        if !self.can_decrypt(sealed, peer_id) {
            return None;
        }
        Some(sealed[1..].iter().map(|b| b ^ 0x5a).collect())
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationHandler for RecordingHandler {
    fn on_message_received(&self, peer_id: &PeerId, _: &NodeHash, sender_id: &PeerId) {
        self.push(format!("received:{}<-{}", peer_id, sender_id));
    }

    fn on_message_forwarded(&self, peer_id: &PeerId, _: &NodeHash, recipients: &[PeerId]) {
        self.push(format!("forwarded:{}:{}", peer_id, recipients.len()));
    }

    fn on_deletion_requested(&self, peer_id: &PeerId, _: &NodeHash, originator_id: &PeerId) {
        self.push(format!("deleted:{}<-{}", peer_id, originator_id));
    }

    fn on_peer_status_changed(&self, peer_id: &PeerId, online: bool) {
        self.push(format!("status:{}:{}", peer_id, online));
    }

    fn on_queue_processed(&self, peer_id: &PeerId, delivered: usize) {
        self.push(format!("drained:{}:{}", peer_id, delivered));
    }
}

struct Sim {
    _dir: TempDir,
    engine: Arc<DeletionEngine>,
    network: Arc<Network>,
}

fn sim() -> Result<Sim> {
    let dir = TempDir::new()?;
    let audit = Arc::new(AuditLog::open(dir.path())?);
    let registry: Arc<dyn PeerDiscovery> = Arc::new(PeerRegistry::new());
    let engine = Arc::new(DeletionEngine::new(audit, &registry, Arc::new(SystemClock)));
    let network = Network::new(
        registry,
        NetworkConfig {
            min_delay_ms: 0,
            max_delay_ms: 2,
        },
    );
    Ok(Sim {
        _dir: dir,
        engine,
        network,
    })
}

#[tokio::test]
async fn monitor_blocks_transfers() -> Result<()> {
    let sim = sim()?;
    let monitor = Arc::new(RecordingMonitor {
        deny: true,
        ..RecordingMonitor::default()
    });
    let a = Peer::builder(sim.engine.clone())
        .id(PeerId::new("a"))
        .transfer_monitor(monitor.clone())
        .build();
    let b = Peer::builder(sim.engine.clone()).id(PeerId::new("b")).build();
    sim.network.add_peer(a.clone());
    sim.network.add_peer(b.clone());

    let m = a.create_root(b"secret", vec![b.id().clone()]);
    assert_eq!(a.share(&m), 0);
    sim.network.wait_idle().await;

    assert_eq!(b.storage().node_count(), 0);
    assert_eq!(
        *monitor.attempts.lock().unwrap(),
        vec![(a.id().clone(), b.id().clone())]
    );
    Ok(())
}

#[tokio::test]
async fn monitor_sees_forward_save_and_read() -> Result<()> {
    let sim = sim()?;
    let monitor = Arc::new(RecordingMonitor::default());
    let a = Peer::builder(sim.engine.clone()).id(PeerId::new("a")).build();
    let b = Peer::builder(sim.engine.clone())
        .id(PeerId::new("b"))
        .transfer_monitor(monitor.clone())
        .build();
    sim.network.add_peer(a.clone());
    sim.network.add_peer(b.clone());

    let m = a.create_root(b"hello", vec![b.id().clone()]);
    a.share(&m);
    sim.network.wait_idle().await;

    b.forward(m.node_hash(), vec![PeerId::new("c")])?;
    assert_eq!(b.read_content(m.content_hash()), Some(b"hello".to_vec()));

    let accesses: Vec<TransferAccessType> = monitor
        .accesses
        .lock()
        .unwrap()
        .iter()
        .map(|(_, access)| *access)
        .collect();
    assert_eq!(
        accesses,
        vec![
            TransferAccessType::Save,
            TransferAccessType::Forward,
            TransferAccessType::Read
        ]
    );
    Ok(())
}

#[tokio::test]
async fn sealed_content_arrives_intact() -> Result<()> {
    let sim = sim()?;
    let seal = Arc::new(XorSeal::default());
    let a = Peer::builder(sim.engine.clone())
        .id(PeerId::new("a"))
        .encryption_policy(seal.clone())
        .build();
    let b = Peer::builder(sim.engine.clone())
        .id(PeerId::new("b"))
        .encryption_policy(seal.clone())
        .build();
    sim.network.add_peer(a.clone());
    sim.network.add_peer(b.clone());

    let m = a.create_root(b"hello", vec![b.id().clone()]);
    a.share(&m);
    sim.network.wait_idle().await;

    assert_eq!(b.read_content(m.content_hash()), Some(b"hello".to_vec()));
    assert_eq!(*seal.modes.lock().unwrap(), vec![EncryptionMode::Recoverable]);
    Ok(())
}

#[tokio::test]
async fn monitor_can_force_irrecoverable_sealing() -> Result<()> {
    let sim = sim()?;
    let seal = Arc::new(XorSeal::default());
    let monitor = Arc::new(RecordingMonitor {
        force: Some(EncryptionPolicyKind::UnknownKey),
        ..RecordingMonitor::default()
    });
    let a = Peer::builder(sim.engine.clone())
        .id(PeerId::new("a"))
        .encryption_policy(seal.clone())
        .transfer_monitor(monitor)
        .build();
    let b = Peer::builder(sim.engine.clone())
        .id(PeerId::new("b"))
        .encryption_policy(seal.clone())
        .build();
    sim.network.add_peer(a.clone());
    sim.network.add_peer(b.clone());

    let m = a.create_root(b"hello", vec![b.id().clone()]);
    assert_eq!(a.share(&m), 1);
    sim.network.wait_idle().await;

    assert_eq!(*seal.modes.lock().unwrap(), vec![EncryptionMode::Irrecoverable]);
    assert!(b.storage().get_node(m.node_hash()).is_none());
    Ok(())
}

#[tokio::test]
async fn notifications_follow_the_lifecycle() -> Result<()> {
    let sim = sim()?;
    let handler = Arc::new(RecordingHandler::default());
    let a = Peer::builder(sim.engine.clone()).id(PeerId::new("a")).build();
    let b = Peer::builder(sim.engine.clone())
        .id(PeerId::new("b"))
        .notification_handler(handler.clone())
        .build();
    sim.network.add_peer(a.clone());
    sim.network.add_peer(b.clone());

    b.go_offline();
    let m = a.create_root(b"hello", vec![b.id().clone()]);
    a.share(&m);
    let report = b.go_online();
    assert_eq!(report.delivered, 1);

    b.forward(m.node_hash(), vec![PeerId::new("c"), PeerId::new("d")])?;
    a.initiate_deletion(&m)?;
    sim.network.wait_idle().await;

    assert_eq!(
        handler.events(),
        vec![
            "status:b:false",
            "status:b:true",
            "received:b<-a",
            "drained:b:1",
            "forwarded:b:2",
            "deleted:b<-a",
            "deleted:b<-b",
        ]
    );
    Ok(())
}
