//! Transaction handling for the ledger
//!
//! Account-model transfers: a sender, a receiver, a positive amount and a
//! creation timestamp. The transaction ID is the hash of those fields, so a
//! transaction cannot be altered without changing its identity.

use crate::core::amount::Amount;
use crate::core::codec::encode_transaction_fields;
use crate::crypto::sha256_hex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The privileged wallet that issues block rewards and genesis allocations
pub const SYSTEM_WALLET: &str = "SYSTEM";

/// Structural transaction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
    #[error("Sender is empty")]
    EmptySender,
    #[error("Receiver is empty")]
    EmptyReceiver,
    #[error("Transaction ID {0} does not match its contents")]
    IdMismatch(String),
}

/// A transfer between two wallets
///
/// Fields are read-only outside the crate; construct through
/// [`Transaction::new`] or [`Transaction::with_timestamp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: String,
    pub(crate) sender: String,
    pub(crate) receiver: String,
    pub(crate) amount: Amount,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction stamped with the current time
    pub fn new(sender: &str, receiver: &str, amount: Amount) -> Self {
        Self::with_timestamp(sender, receiver, amount, Utc::now())
    }

    /// Create a transaction with an explicit creation time
    pub fn with_timestamp(
        sender: &str,
        receiver: &str,
        amount: Amount,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let id = Self::compute_id(sender, receiver, amount, &timestamp);
        Self {
            id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            timestamp,
        }
    }

    /// Create a reward (or genesis allocation) paid by the system wallet
    pub fn reward(receiver: &str, amount: Amount, timestamp: DateTime<Utc>) -> Self {
        Self::with_timestamp(SYSTEM_WALLET, receiver, amount, timestamp)
    }

    fn compute_id(sender: &str, receiver: &str, amount: Amount, timestamp: &DateTime<Utc>) -> String {
        sha256_hex(&encode_transaction_fields(sender, receiver, amount, timestamp))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this transaction is issued by the system wallet
    pub fn is_reward(&self) -> bool {
        self.sender == SYSTEM_WALLET
    }

    /// Recompute the ID from the transaction's fields
    pub fn verify_id(&self) -> bool {
        self.id == Self::compute_id(&self.sender, &self.receiver, self.amount, &self.timestamp)
    }

    /// Check that the transaction is well formed
    ///
    /// Self-payments are allowed; they still need funds to cover the amount.
    pub fn check_well_formed(&self) -> Result<(), TransactionError> {
        if self.sender.trim().is_empty() {
            return Err(TransactionError::EmptySender);
        }
        if self.receiver.trim().is_empty() {
            return Err(TransactionError::EmptyReceiver);
        }
        if !self.amount.is_positive() {
            return Err(TransactionError::NonPositiveAmount(self.amount));
        }
        if !self.verify_id() {
            return Err(TransactionError::IdMismatch(self.id.clone()));
        }
        Ok(())
    }

    /// Two transactions conflict when they share a sender whose available
    /// balance cannot cover both
    pub fn conflicts_with(&self, other: &Transaction, available: Amount) -> bool {
        if self.id == other.id || self.sender != other.sender {
            return false;
        }
        match self.amount.checked_add(other.amount) {
            Some(total) => total > available,
            None => true,
        }
    }

    /// Short form for logs
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_is_content_hash() {
        let tx = Transaction::new("alice", "bob", Amount::from_coins(10));
        assert_eq!(tx.id().len(), 64);
        assert!(tx.verify_id());
        assert!(tx.check_well_formed().is_ok());

        let same = Transaction::with_timestamp("alice", "bob", Amount::from_coins(10), tx.timestamp());
        assert_eq!(same.id(), tx.id());
    }

    #[test]
    fn test_tampering_breaks_id() {
        let mut tx = Transaction::new("alice", "bob", Amount::from_coins(10));
        tx.amount = Amount::from_coins(1000);
        assert!(!tx.verify_id());
        assert_eq!(
            tx.check_well_formed(),
            Err(TransactionError::IdMismatch(tx.id.clone()))
        );
    }

    #[test]
    fn test_malformed_transactions() {
        let zero = Transaction::new("alice", "bob", Amount::ZERO);
        assert_eq!(
            zero.check_well_formed(),
            Err(TransactionError::NonPositiveAmount(Amount::ZERO))
        );

        let negative = Transaction::new("alice", "bob", Amount::from_coins(-1));
        assert!(negative.check_well_formed().is_err());

        let no_sender = Transaction::new(" ", "bob", Amount::from_coins(1));
        assert_eq!(no_sender.check_well_formed(), Err(TransactionError::EmptySender));

        let no_receiver = Transaction::new("alice", "", Amount::from_coins(1));
        assert_eq!(no_receiver.check_well_formed(), Err(TransactionError::EmptyReceiver));
    }

    #[test]
    fn test_self_payment_is_well_formed() {
        let tx = Transaction::new("alice", "alice", Amount::from_coins(1));
        assert!(tx.check_well_formed().is_ok());
    }

    #[test]
    fn test_conflicting_transactions() {
        let now = Utc::now();
        let honest = Transaction::with_timestamp("mallory", "merchant", Amount::from_coins(10), now);
        let shadow = Transaction::with_timestamp("mallory", "mallory-shadow", Amount::from_coins(10), now);

        assert!(honest.conflicts_with(&shadow, Amount::from_coins(10)));
        assert!(!honest.conflicts_with(&shadow, Amount::from_coins(20)));

        let unrelated = Transaction::with_timestamp("carol", "merchant", Amount::from_coins(10), now);
        assert!(!honest.conflicts_with(&unrelated, Amount::ZERO));
        assert!(!honest.conflicts_with(&honest, Amount::ZERO));
    }

    #[test]
    fn test_reward_transaction() {
        let tx = Transaction::reward("miner", Amount::from_coins(1), Utc::now());
        assert!(tx.is_reward());
        assert_eq!(tx.sender(), SYSTEM_WALLET);
    }
}
