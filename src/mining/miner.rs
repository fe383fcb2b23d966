//! Proof-of-work search and the miner front end
//!
//! The nonce search is a pure function of the candidate block: it starts at
//! nonce 0 and counts upward, so the winning nonce for a given candidate is
//! always the same. Only the search cost varies between candidates.

use crate::core::codec::{encode_block_prefix, hash_with_nonce, NONCE_LEN};
use crate::core::{Block, Chain, LedgerError, ValidationError};
use crate::crypto::meets_difficulty;
use log::info;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

/// Mining errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Invalid miner id: {0:?}")]
    InvalidMiner(String),
    #[error("No valid nonce for block {index} after {attempts} attempts")]
    NonceSpaceExhausted { index: u64, attempts: u64 },
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Mined branch rejected: {0}")]
    Rejected(#[from] ValidationError),
    #[error("Block {index} was overtaken by a longer chain while mining")]
    Superseded { index: u64 },
    #[error("Mining task stopped: {0}")]
    Interrupted(String),
}

/// Mining statistics
#[derive(Debug, Clone, Serialize)]
pub struct MiningStats {
    /// Number of hash attempts
    pub attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
}

impl MiningStats {
    fn new(attempts: u64, start: Instant) -> Self {
        let time_ms = start.elapsed().as_millis();
        let hash_rate = if time_ms > 0 {
            (attempts as f64) / (time_ms as f64 / 1000.0)
        } else {
            attempts as f64
        };
        Self {
            attempts,
            time_ms,
            hash_rate,
        }
    }
}

/// Nonce search parameters
#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    /// Required leading zero bits
    pub difficulty: u32,
    /// Highest nonce tried before giving up
    pub max_nonce: u64,
}

impl ProofOfWork {
    pub fn new(difficulty: u32, max_nonce: u64) -> Self {
        Self {
            difficulty,
            max_nonce,
        }
    }

    /// Search for a nonce that satisfies the difficulty
    ///
    /// The block is only modified when a nonce is found.
    pub fn solve(&self, block: &mut Block) -> Result<MiningStats, MiningError> {
        let start = Instant::now();

        let mut scratch = encode_block_prefix(
            block.index,
            &block.timestamp,
            &block.transactions,
            &block.previous_hash,
        );
        scratch.extend_from_slice(&[0u8; NONCE_LEN]);

        for nonce in 0..=self.max_nonce {
            let digest = hash_with_nonce(&mut scratch, nonce);
            if meets_difficulty(&digest, self.difficulty) {
                block.nonce = nonce;
                block.hash = hex::encode(digest);
                return Ok(MiningStats::new(nonce.saturating_add(1), start));
            }
        }

        Err(MiningError::NonceSpaceExhausted {
            index: block.index,
            attempts: self.max_nonce.saturating_add(1),
        })
    }
}

/// Miner for creating new blocks
#[derive(Debug, Clone)]
pub struct Miner {
    /// Wallet receiving the block rewards
    pub address: String,
}

impl Miner {
    /// Create a new miner
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }

    /// Mine one block on top of the chain from its mempool
    pub fn mine(&self, chain: &mut Chain) -> Result<(Block, MiningStats), MiningError> {
        chain.mine_block(&self.address)
    }

    /// Mine several blocks in a row, stopping at the first failure
    pub fn mine_continuously(
        &self,
        chain: &mut Chain,
        num_blocks: u64,
    ) -> Result<Vec<(Block, MiningStats)>, MiningError> {
        let mut results = Vec::new();

        for _ in 0..num_blocks {
            results.push(self.mine(chain)?);
        }

        info!(
            "{} mined {} block(s), chain length now {}",
            self.address,
            results.len(),
            chain.len()
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, ChainParams, Transaction};
    use crate::crypto::ZERO_HASH;
    use chrono::Utc;

    fn candidate() -> Block {
        let now = Utc::now();
        Block::new(
            1,
            ZERO_HASH.to_string(),
            vec![Transaction::reward("miner", Amount::from_coins(1), now)],
            "miner",
            now,
        )
    }

    #[test]
    fn test_solve_finds_valid_nonce() {
        let mut block = candidate();
        let stats = ProofOfWork::new(8, u64::MAX).solve(&mut block).unwrap();

        assert!(block.verify_hash());
        assert!(block.meets_difficulty(8).unwrap());
        assert_eq!(stats.attempts, block.nonce + 1);
    }

    #[test]
    fn test_solve_is_deterministic() {
        let mut a = candidate();
        let mut b = a.clone();
        let pow = ProofOfWork::new(6, u64::MAX);
        pow.solve(&mut a).unwrap();
        pow.solve(&mut b).unwrap();
        assert_eq!(a.nonce, b.nonce);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_capped_search_reports_failure() {
        let mut block = candidate();
        let before = block.clone();

        // 256 zero bits is unreachable within two attempts
        let err = ProofOfWork::new(256, 1).solve(&mut block).unwrap_err();
        assert_eq!(
            err,
            MiningError::NonceSpaceExhausted {
                index: 1,
                attempts: 2
            }
        );
        assert_eq!(block, before);
    }

    #[test]
    fn test_miner_mines_multiple_blocks() {
        let mut chain = Chain::new(ChainParams::with_difficulty(4)).unwrap();
        let miner = Miner::new("miner_address");

        let results = miner.mine_continuously(&mut chain, 3).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.balance_of("miner_address"), Amount::from_coins(3));
        assert!(results.iter().all(|(_, stats)| stats.attempts > 0));
    }
}
