//! Block implementation for the ledger
//!
//! A block's hash covers its index, timestamp, transactions, previous hash
//! and nonce. Changing any of them invalidates the stored hash.

use crate::core::codec::encode_block;
use crate::core::transaction::Transaction;
use crate::crypto::{decode_digest, meets_difficulty, sha256, CodecError, DIGEST_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block index/height (0 = genesis)
    pub index: u64,
    /// Block creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Transactions in inclusion order; the reward comes first
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block
    pub previous_hash: String,
    /// Nonce used for proof of work
    pub nonce: u64,
    /// Stored proof-of-work hash
    pub hash: String,
    /// Wallet credited by the block reward
    pub miner: String,
}

impl Block {
    /// Create a new, unmined block
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        miner: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
            miner: miner.to_string(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical encoding of the hashed fields
    pub fn encode(&self) -> Vec<u8> {
        encode_block(
            self.index,
            &self.timestamp,
            &self.transactions,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Digest of the block's current contents
    pub fn compute_digest(&self) -> [u8; DIGEST_LEN] {
        sha256(&self.encode())
    }

    /// Hex hash of the block's current contents
    pub fn compute_hash(&self) -> String {
        hex::encode(self.compute_digest())
    }

    /// Verify the stored hash against the contents
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Decode the stored hash
    pub fn stored_digest(&self) -> Result<[u8; DIGEST_LEN], CodecError> {
        decode_digest(&self.hash)
    }

    /// Check the stored hash against a difficulty target
    pub fn meets_difficulty(&self, difficulty: u32) -> Result<bool, CodecError> {
        Ok(meets_difficulty(&self.stored_digest()?, difficulty))
    }

    /// The reward transaction, if the block starts with one
    pub fn reward_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_reward())
    }

    /// Transactions submitted by users (everything except system payments)
    pub fn user_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| !tx.is_reward())
    }

    /// Whether the block includes the given transaction
    pub fn contains(&self, tx_id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id() == tx_id)
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Short form of the hash for logs
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(16)]
    }
}
