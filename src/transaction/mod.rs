pub mod model;
pub mod pool;
pub mod validator;

pub use model::{
    FAUCET_SIGNATURE, GENESIS_SENDER, GENESIS_SIGNATURE, MINING_REWARD_SIGNATURE, SYSTEM_SENDER,
    SYSTEM_SIGNATURES, Transaction,
};
pub use pool::{DEFAULT_MAX_POOL_SIZE, PoolStats, TransactionPool};
pub use validator::{Admission, TransactionValidator};
