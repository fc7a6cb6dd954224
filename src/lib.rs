pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod transaction;
pub mod wallet;

pub use config::NodeConfig;
pub use node::{MiningJob, Node, NodeStatus};
