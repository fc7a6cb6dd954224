pub mod codec;
pub mod message;
pub mod network;
pub mod peer;

pub use codec::MAX_MESSAGE_SIZE;
pub use message::{Message, MessageKind, MessagePayload, PeerAddress};
pub use network::{ChainHandler, MaintenanceReport, P2PConfig, P2PNetwork};
pub use peer::{MAX_CONNECT_ATTEMPTS, PEER_EVICTION_SECS, Peer, PeerInfo, PeerState, PeerTable};
