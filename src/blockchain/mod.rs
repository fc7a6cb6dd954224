pub mod block;
pub mod model;

pub use block::{Block, meets_difficulty};
pub use model::{Blockchain, is_valid_chain};

/// Default Proof-of-Work difficulty (number of leading zero hex digits).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Default reward credited to the miner of each block.
pub const DEFAULT_MINING_REWARD: f64 = 10.0;

/// Previous-hash value carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Default number of pending transactions pulled into one block.
pub const MAX_TXS_PER_BLOCK: usize = 10;

/// Current Unix time in seconds with sub-second precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
