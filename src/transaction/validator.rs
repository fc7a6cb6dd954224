use super::model::{SYSTEM_SIGNATURES, Transaction};
use crate::blockchain::Blockchain;
use crate::error::ValidationError;
use crate::wallet::verify_transaction;

/// Outcome of a successful validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Node-issued entry (reserved sender with an allow-listed marker).
    System,
    /// Signed user transfer that passed balance, signature and replay checks.
    User,
}

impl Admission {
    pub fn reason(&self) -> &'static str {
        match self {
            Admission::System => "System transaction",
            Admission::User => "Transaction valid",
        }
    }
}

/// Admission policy for unconfirmed transactions. Checks run in a fixed order
/// and stop at the first failure.
pub struct TransactionValidator<'a> {
    chain: &'a Blockchain,
    pending: &'a [Transaction],
}

impl<'a> TransactionValidator<'a> {
    /// `pending` is the set of unconfirmed entries a duplicate is checked against.
    pub fn new(chain: &'a Blockchain, pending: &'a [Transaction]) -> Self {
        Self { chain, pending }
    }

    pub fn validate(&self, tx: &Transaction) -> Result<Admission, ValidationError> {
        if tx.sender.is_empty()
            || tx.recipient.is_empty()
            || tx.signature.is_none()
            || tx.amount.is_nan()
            || !tx.timestamp.is_finite()
        {
            return Err(ValidationError::MissingFields);
        }
        if !(tx.amount > 0.0) {
            return Err(ValidationError::NonPositiveAmount);
        }
        if tx.sender == tx.recipient {
            return Err(ValidationError::SelfTransfer);
        }

        if tx.is_reserved_sender() {
            let signature = tx.signature.as_deref().unwrap_or_default();
            if !SYSTEM_SIGNATURES.contains(&signature) {
                return Err(ValidationError::InvalidSystemSignature);
            }
            return Ok(Admission::System);
        }

        let balance = self.chain.balance_of(&tx.sender);
        if balance < tx.amount {
            return Err(ValidationError::InsufficientBalance {
                balance,
                amount: tx.amount,
            });
        }

        let verified = tx
            .sender_public_key
            .as_deref()
            .is_some_and(|pk| verify_transaction(tx, pk));
        if !verified {
            return Err(ValidationError::InvalidSignature);
        }

        if self.is_duplicate(tx) {
            return Err(ValidationError::DoubleSpend);
        }

        Ok(Admission::User)
    }

    fn is_duplicate(&self, tx: &Transaction) -> bool {
        let id = tx.compute_id();
        self.chain.contains_transaction(&id) || self.pending.iter().any(|p| p.compute_id() == id)
    }
}
