use thiserror::Error;

/// Rejection of a transaction by the admission policy. `Display` is the reason
/// reported back to whoever submitted the transaction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required transaction fields")]
    MissingFields,
    #[error("Transaction amount must be positive")]
    NonPositiveAmount,
    #[error("Sender and recipient cannot be the same")]
    SelfTransfer,
    #[error("Invalid system transaction signature")]
    InvalidSystemSignature,
    #[error("Insufficient balance: has {balance}, needs {amount}")]
    InsufficientBalance { balance: f64, amount: f64 },
    #[error("Invalid transaction signature")]
    InvalidSignature,
    #[error("Double spending detected")]
    DoubleSpend,
    #[error("Transaction pool is full ({capacity} entries)")]
    PoolFull { capacity: usize },
    #[error("Reserved sender cannot be submitted")]
    ReservedSender,
}

/// Integrity failure of an append or replace attempt. The ledger is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("previous hash {found} does not match head {expected}")]
    BrokenLink { expected: String, found: String },
    #[error("block index {found} does not follow head (expected {expected})")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("stored hash {stored} does not match recomputed hash {computed}")]
    HashMismatch { stored: String, computed: String },
    #[error("hash {hash} does not meet difficulty {difficulty}")]
    InsufficientWork { hash: String, difficulty: u32 },
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("frame of {0} bytes exceeds the maximum message size")]
    FrameTooLarge(usize),
    #[error("refusing to connect to self ({0})")]
    SelfConnection(String),
    #[error("network is not running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Already mining a block")]
    MiningInProgress,
    #[error("mining was cancelled")]
    MiningCancelled,
    #[error("failed to start miner thread: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}
