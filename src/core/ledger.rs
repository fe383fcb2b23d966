//! Balance ledger derived from the chain
//!
//! The ledger is never edited directly: it is rebuilt by replaying every
//! transaction from genesis, or advanced one block at a time after a block
//! has been accepted.

use crate::core::amount::Amount;
use crate::core::transaction::{Transaction, SYSTEM_WALLET};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Ledger replay errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Wallet {wallet} would go negative: balance {balance}, debit {debit}")]
    Overdraft {
        wallet: String,
        balance: Amount,
        debit: Amount,
    },
    #[error("Balance overflow for wallet {0}")]
    Overflow(String),
}

/// Mapping of wallet id to balance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ledger {
    balances: BTreeMap<String, Amount>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a wallet; unknown wallets hold zero
    pub fn balance_of(&self, wallet: &str) -> Amount {
        self.balances.get(wallet).copied().unwrap_or(Amount::ZERO)
    }

    /// Apply one transaction
    ///
    /// Either both sides are updated or neither is. Only the system wallet
    /// may be driven negative.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let sender = tx.sender();
        let receiver = tx.receiver();
        let amount = tx.amount();

        let sender_before = self.balance_of(sender);
        let sender_after = sender_before
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Overflow(sender.to_string()))?;

        if sender_after.is_negative() && sender != SYSTEM_WALLET {
            return Err(LedgerError::Overdraft {
                wallet: sender.to_string(),
                balance: sender_before,
                debit: amount,
            });
        }

        // A self-payment nets to zero once funds are proven
        let receiver_before = if sender == receiver {
            sender_after
        } else {
            self.balance_of(receiver)
        };
        let receiver_after = receiver_before
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(receiver.to_string()))?;

        self.balances.insert(sender.to_string(), sender_after);
        self.balances.insert(receiver.to_string(), receiver_after);
        Ok(())
    }

    /// Apply a sequence of transactions atomically
    pub fn apply_all<'a, I>(&mut self, transactions: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut scratch = self.clone();
        for tx in transactions {
            scratch.apply(tx)?;
        }
        *self = scratch;
        Ok(())
    }

    /// Balances of every ordinary wallet (the system wallet is omitted)
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        self.balances
            .iter()
            .filter(|(wallet, _)| wallet.as_str() != SYSTEM_WALLET)
            .map(|(wallet, amount)| (wallet.clone(), *amount))
            .collect()
    }

    /// Number of wallets ever touched, including the system wallet
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}
