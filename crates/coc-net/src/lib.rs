/*!
# Simulated Custody Network

Peers mint and forward custody hops, a [`Network`] carries them between
peers with simulated latency, and a shared [`DeletionEngine`] drives
revocation hop by hop through the forwarding tree.

Everything runs in one process. Delivery is scheduled on the ambient tokio
runtime; without one, messages are delivered inline.

## Ownership
- [`PeerDiscovery`] owns the registered peers
- each [`Peer`] owns its keypair, replica and offline queue, and holds the
  [`Network`] and the discovery registry only weakly
*/

pub mod clock;
pub mod config;
pub mod deletion;
pub mod discovery;
pub mod error;
pub mod message;
pub mod monitor;
pub mod network;
pub mod notification;
pub mod peer;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuditConfig, ConfigError, CustodyConfig, LoggingConfig, NetworkConfig, PeerConfig};
pub use deletion::{DeletionEngine, ProcessOutcome};
pub use discovery::{PeerDiscovery, PeerRegistry};
pub use error::{DeletionError, NetError, NetResult};
pub use message::{Envelope, Payload};
pub use monitor::{
    EncryptionMode, EncryptionPolicy, EncryptionPolicyKind, NoEncryption, NullTransferMonitor,
    TransferAccessType, TransferMonitor,
};
pub use network::{Network, RouteOutcome};
pub use notification::{LoggingNotificationHandler, NotificationHandler};
pub use peer::{DrainReport, Peer, PeerBuilder, QueuedMessage};
