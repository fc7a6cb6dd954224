use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blockchain::unix_now;

/// Reserved sender for node-issued credits (mining rewards, faucet credits).
pub const SYSTEM_SENDER: &str = "system";
/// Reserved sender used only inside the genesis block.
pub const GENESIS_SENDER: &str = "genesis";

pub const MINING_REWARD_SIGNATURE: &str = "mining_reward";
pub const GENESIS_SIGNATURE: &str = "genesis_signature";
pub const FAUCET_SIGNATURE: &str = "SYSTEM";

/// Signature values a reserved sender may carry instead of a real signature.
pub const SYSTEM_SIGNATURES: [&str; 4] = [
    MINING_REWARD_SIGNATURE,
    GENESIS_SIGNATURE,
    FAUCET_SIGNATURE,
    "",
];

/// A value transfer between two addresses. Balances are derived by replaying
/// every confirmed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Derived id, written on pool admission (see [`Transaction::compute_id`]).
    /// Whatever a client sends here is overwritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default = "unset_number")]
    pub amount: f64,
    #[serde(default = "unset_number")]
    pub timestamp: f64, // Unix seconds (UTC), sub-second precision
    /// Base64 compact ECDSA signature, or an allow-listed marker for reserved senders.
    #[serde(default)]
    pub signature: Option<String>,
    /// Hex-encoded compressed secp256k1 public key of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_public_key: Option<String>,
}

/// Placeholder for a numeric field absent from the input. Validation reports
/// it as a missing field.
fn unset_number() -> f64 {
    f64::NAN
}

impl Transaction {
    /// Build an unsigned transfer stamped with the current time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: None,
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: unix_now(),
            signature: None,
            sender_public_key: None,
        }
    }

    /// Node-issued credit from the reserved `system` sender.
    pub fn system(recipient: impl Into<String>, amount: f64, signature: &str) -> Self {
        let mut tx = Self::new(SYSTEM_SENDER, recipient, amount);
        tx.signature = Some(signature.to_string());
        tx.with_id()
    }

    /// Coinbase credit paid to the miner of a block.
    pub fn reward(miner_address: impl Into<String>, amount: f64) -> Self {
        Self::system(miner_address, amount, MINING_REWARD_SIGNATURE)
    }

    /// The synthetic zero-amount entry carried by block 0.
    pub fn genesis() -> Self {
        let mut tx = Self::new(GENESIS_SENDER, GENESIS_SENDER, 0.0);
        tx.signature = Some(GENESIS_SIGNATURE.to_string());
        tx.with_id()
    }

    /// Whether the sender is one of the reserved node-issued senders.
    pub fn is_reserved_sender(&self) -> bool {
        self.sender == SYSTEM_SENDER || self.sender == GENESIS_SENDER
    }

    /// Whether this is a miner reward synthesized at block assembly.
    pub fn is_coinbase(&self) -> bool {
        self.sender == SYSTEM_SENDER && self.signature.as_deref() == Some(MINING_REWARD_SIGNATURE)
    }

    /// Canonical encoding of (sender, recipient, amount, timestamp): JSON with
    /// lexicographically ordered keys. This is what gets hashed, signed and
    /// used to derive the id.
    pub fn signing_payload(&self) -> Vec<u8> {
        let payload = serde_json::json!({
            "amount": self.amount,
            "recipient": self.recipient,
            "sender": self.sender,
            "timestamp": self.timestamp,
        });
        payload.to_string().into_bytes()
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_payload());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Derived id, recomputed from content (ignores any stored id).
    pub fn compute_id(&self) -> String {
        hex::encode(self.sighash())
    }

    /// Stamp the derived id, replacing any stored value.
    pub fn with_id(mut self) -> Self {
        self.transaction_id = Some(self.compute_id());
        self
    }
}
