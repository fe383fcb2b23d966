//! Transaction pool (mempool) for pending transactions
//!
//! Holds submitted, not-yet-mined transactions keyed by ID and remembers
//! their arrival order. Admission checks the sender's confirmed balance
//! minus what the sender already has pending, so the same funds cannot be
//! queued twice against one chain tip.

use crate::core::{Amount, Ledger, Transaction, TransactionError, SYSTEM_WALLET};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Default maximum mempool transaction count
pub const DEFAULT_MEMPOOL_SIZE: usize = 10_000;

/// Why a transaction was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("Malformed transaction: {0}")]
    Malformed(#[from] TransactionError),
    #[error("The {SYSTEM_WALLET} wallet cannot submit transactions")]
    ReservedSender,
    #[error("Insufficient balance for {sender}: available {available}, requested {requested}")]
    InsufficientBalance {
        sender: String,
        available: Amount,
        requested: Amount,
    },
    #[error("Transaction {0} is already confirmed")]
    AlreadyConfirmed(String),
    #[error("Mempool full ({0} transactions)")]
    MempoolFull(usize),
}

/// Result of a successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The transaction was appended to the pool
    Added,
    /// An identical transaction was already pending
    AlreadyPending,
}

/// Memory pool for pending transactions
#[derive(Debug, Clone)]
pub struct Mempool {
    /// Transactions indexed by ID
    entries: HashMap<String, Transaction>,
    /// Transaction IDs in order of arrival
    by_time: VecDeque<String>,
    /// Maximum pool size
    max_size: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_SIZE)
    }

    /// Create a mempool holding at most `max_size` transactions
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_time: VecDeque::new(),
            max_size,
        }
    }

    /// Admit a transaction against the ledger of the current chain tip
    ///
    /// Re-submitting a transaction that is already pending is a no-op.
    pub fn submit(&mut self, tx: Transaction, ledger: &Ledger) -> Result<Admission, RejectionReason> {
        tx.check_well_formed()?;

        if tx.is_reward() {
            return Err(RejectionReason::ReservedSender);
        }

        if self.entries.contains_key(tx.id()) {
            return Ok(Admission::AlreadyPending);
        }

        if self.entries.len() >= self.max_size {
            return Err(RejectionReason::MempoolFull(self.max_size));
        }

        let available = ledger
            .balance_of(tx.sender())
            .checked_sub(self.pending_debits(tx.sender()))
            .unwrap_or(Amount::ZERO);

        if tx.amount() > available {
            return Err(RejectionReason::InsufficientBalance {
                sender: tx.sender().to_string(),
                available,
                requested: tx.amount(),
            });
        }

        self.insert(tx);
        Ok(Admission::Added)
    }

    fn insert(&mut self, tx: Transaction) {
        let tx_id = tx.id().to_string();
        self.by_time.push_back(tx_id.clone());
        self.entries.insert(tx_id, tx);
    }

    /// Total amount a sender already has pending
    pub fn pending_debits(&self, sender: &str) -> Amount {
        self.entries
            .values()
            .filter(|tx| tx.sender() == sender)
            .fold(Amount::ZERO, |total, tx| total.saturating_add(tx.amount()))
    }

    /// Remove and return up to `capacity` transactions in arrival order
    ///
    /// No validation happens here; block assembly replays the drained
    /// transactions against the chain it is extending.
    pub fn drain_for_block(&mut self, capacity: usize) -> Vec<Transaction> {
        let mut drained = Vec::with_capacity(capacity.min(self.by_time.len()));

        while drained.len() < capacity {
            let Some(tx_id) = self.by_time.pop_front() else {
                break;
            };
            if let Some(tx) = self.entries.remove(&tx_id) {
                drained.push(tx);
            }
        }

        drained
    }

    /// Put drained transactions back at the front, keeping their order
    pub fn restore(&mut self, transactions: Vec<Transaction>) {
        for tx in transactions.into_iter().rev() {
            if self.entries.contains_key(tx.id()) {
                continue;
            }
            let tx_id = tx.id().to_string();
            self.by_time.push_front(tx_id.clone());
            self.entries.insert(tx_id, tx);
        }
    }

    /// Re-admit every pending transaction against a new ledger
    ///
    /// Used after the chain under the pool has been replaced. Returns the
    /// transactions that no longer qualify, with the reason.
    pub fn revalidate<F>(&mut self, ledger: &Ledger, is_confirmed: F) -> Vec<(Transaction, RejectionReason)>
    where
        F: Fn(&str) -> bool,
    {
        let pending = self.drain_for_block(usize::MAX);
        let mut dropped = Vec::new();

        for tx in pending {
            if is_confirmed(tx.id()) {
                let reason = RejectionReason::AlreadyConfirmed(tx.id().to_string());
                dropped.push((tx, reason));
                continue;
            }
            if let Err(reason) = self.submit(tx.clone(), ledger) {
                dropped.push((tx, reason));
            }
        }

        dropped
    }

    /// Get a transaction by ID
    pub fn get(&self, tx_id: &str) -> Option<&Transaction> {
        self.entries.get(tx_id)
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.entries.contains_key(tx_id)
    }

    /// Pending transactions in arrival order
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.by_time
            .iter()
            .filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
