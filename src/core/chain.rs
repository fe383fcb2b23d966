//! Chain implementation
//!
//! A `Chain` owns its blocks, its mempool and the balance ledger derived
//! from them. It is the single owner of a node's ledger state; branches are
//! separate `Chain` values and only ever merge through the fork-choice gate
//! in [`Chain::replace_chain`].

use crate::core::amount::Amount;
use crate::core::block::Block;
use crate::core::ledger::{Ledger, LedgerError};
use crate::core::transaction::{Transaction, TransactionError, SYSTEM_WALLET};
use crate::crypto::{CodecError, ZERO_HASH};
use crate::mining::{
    Admission, Mempool, MiningError, MiningStats, ProofOfWork, RejectionReason,
};
use crate::report::ChainSnapshot;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Default mining difficulty (number of leading zero bits)
pub const DEFAULT_DIFFICULTY: u32 = 16;

/// Default number of mempool transactions per block (reward excluded)
pub const DEFAULT_MAX_TXS_PER_BLOCK: usize = 5;

/// Unix time of the default genesis block (2024-01-01T00:00:00Z)
pub const DEFAULT_GENESIS_UNIX: i64 = 1_704_067_200;

/// Chain validation errors
///
/// Any of these is fatal to the candidate chain, never to the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Chain is empty")]
    Empty,
    #[error("Invalid index: expected {expected}, got {found}")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("Malformed hash in block {index}: {source}")]
    MalformedHash { index: u64, source: CodecError },
    #[error("Hash mismatch in block {index}")]
    HashMismatch { index: u64 },
    #[error("Block {index} does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
    #[error("Block {index} does not link to its predecessor")]
    BrokenLink { index: u64 },
    #[error("Invalid genesis block: {0}")]
    BadGenesis(String),
    #[error("Candidate chain starts from a different genesis block")]
    GenesisMismatch,
    #[error("Invalid reward in block {index}: {reason}")]
    BadReward { index: u64, reason: String },
    #[error("Invalid transaction in block {index}: {source}")]
    BadTransaction { index: u64, source: TransactionError },
    #[error("Transaction {tx_id} appears twice (again in block {index})")]
    DuplicateTransaction { index: u64, tx_id: String },
    #[error("Balance check failed in block {index}: {source}")]
    Overdraft { index: u64, source: LedgerError },
    #[error("Block {0} is not part of this chain")]
    UnknownBlock(u64),
}

/// Outcome of the longest-valid-chain rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkChoice {
    /// The local chain stays
    Keep,
    /// The candidate is valid and strictly longer
    Replace,
}

fn default_genesis_timestamp() -> DateTime<Utc> {
    Utc.timestamp_opt(DEFAULT_GENESIS_UNIX, 0)
        .single()
        .unwrap_or_default()
}

/// Consensus parameters shared by every node of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    /// Leading zero bits required of every block hash
    pub difficulty: u32,
    /// Amount paid to the miner of each block
    pub block_reward: Amount,
    /// Mempool transactions per block, reward excluded
    pub max_txs_per_block: usize,
    /// Highest nonce tried before mining gives up (unbounded when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nonce: Option<u64>,
    /// Fixed timestamp of the genesis block
    pub genesis_timestamp: DateTime<Utc>,
    /// Initial balances credited by the genesis block
    pub genesis_allocations: BTreeMap<String, Amount>,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: Amount::from_coins(1),
            max_txs_per_block: DEFAULT_MAX_TXS_PER_BLOCK,
            max_nonce: None,
            genesis_timestamp: default_genesis_timestamp(),
            genesis_allocations: BTreeMap::new(),
        }
    }
}

impl ChainParams {
    /// Default parameters with a custom difficulty
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Credit a wallet in the genesis block
    pub fn with_allocation(mut self, wallet: &str, amount: Amount) -> Self {
        self.genesis_allocations.insert(wallet.to_string(), amount);
        self
    }

    /// Cap the nonce search
    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = Some(max_nonce);
        self
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty, self.max_nonce.unwrap_or(u64::MAX))
    }
}

/// How a double spend was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleSpendKind {
    /// Confirmed on a branch that a longer chain replaced, where the
    /// winning chain spent the same funds
    Reversed,
    /// Pending or being mined when its funds were spent elsewhere
    Unfundable,
}

/// A transaction discarded because its funds went to another payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleSpendRecord {
    pub tx: Transaction,
    pub kind: DoubleSpendKind,
    /// Tip index when the conflict was found
    pub detected_at: u64,
}

/// Ledger state derived from a validated block sequence
#[derive(Debug, Clone, Default)]
pub struct ValidatedChain {
    pub ledger: Ledger,
    pub confirmed: HashSet<String>,
}

/// Receipt for an accepted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub tx_id: String,
    pub mempool_size: usize,
    /// True when the transaction was already pending
    pub already_pending: bool,
}

fn check_reward(block: &Block, params: &ChainParams) -> Result<(), ValidationError> {
    let index = block.index;
    let bad = |reason: &str| ValidationError::BadReward {
        index,
        reason: reason.to_string(),
    };

    let reward = block.reward_tx().ok_or_else(|| bad("first transaction is not a reward"))?;
    if block.transactions.iter().filter(|tx| tx.is_reward()).count() != 1 {
        return Err(bad("block must carry exactly one reward"));
    }
    if block.miner == SYSTEM_WALLET {
        return Err(bad("the system wallet cannot mine"));
    }
    if reward.receiver() != block.miner {
        return Err(bad("reward is not paid to the block's miner"));
    }
    if reward.amount() != params.block_reward {
        return Err(bad(&format!(
            "reward is {}, expected {}",
            reward.amount(),
            params.block_reward
        )));
    }
    Ok(())
}

fn check_genesis(block: &Block) -> Result<(), ValidationError> {
    if block.previous_hash != ZERO_HASH {
        return Err(ValidationError::BadGenesis("previous hash must be zero".to_string()));
    }
    if block.miner != SYSTEM_WALLET {
        return Err(ValidationError::BadGenesis(format!(
            "genesis miner must be {}",
            SYSTEM_WALLET
        )));
    }
    if block.transactions.iter().any(|tx| !tx.is_reward()) {
        return Err(ValidationError::BadGenesis(
            "genesis may only carry allocations".to_string(),
        ));
    }
    Ok(())
}

/// Validate a full block sequence and derive its ledger
///
/// Recomputes every hash, checks proof of work and linkage, and replays
/// every transaction from genesis. This is the only gate for accepting a
/// chain, whatever its origin.
pub fn validate_chain(
    blocks: &[Block],
    params: &ChainParams,
) -> Result<ValidatedChain, ValidationError> {
    if blocks.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut state = ValidatedChain::default();

    for (position, block) in blocks.iter().enumerate() {
        let expected = position as u64;
        if block.index != expected {
            return Err(ValidationError::IndexMismatch {
                expected,
                found: block.index,
            });
        }
        let index = block.index;

        let stored = block
            .stored_digest()
            .map_err(|source| ValidationError::MalformedHash { index, source })?;
        // The stored hash must be the canonical lowercase hex, since links compare strings
        if stored != block.compute_digest() || !block.verify_hash() {
            return Err(ValidationError::HashMismatch { index });
        }
        if !crate::crypto::meets_difficulty(&stored, params.difficulty) {
            return Err(ValidationError::InsufficientWork {
                index,
                difficulty: params.difficulty,
            });
        }

        match position.checked_sub(1).and_then(|prev| blocks.get(prev)) {
            None => check_genesis(block)?,
            Some(previous) => {
                if block.previous_hash != previous.hash {
                    return Err(ValidationError::BrokenLink { index });
                }
                check_reward(block, params)?;
            }
        }

        for tx in &block.transactions {
            tx.check_well_formed()
                .map_err(|source| ValidationError::BadTransaction { index, source })?;
            if !state.confirmed.insert(tx.id().to_string()) {
                return Err(ValidationError::DuplicateTransaction {
                    index,
                    tx_id: tx.id().to_string(),
                });
            }
            state
                .ledger
                .apply(tx)
                .map_err(|source| ValidationError::Overdraft { index, source })?;
        }
    }

    Ok(state)
}

/// Apply the longest-valid-chain rule
///
/// Replace only when the candidate validates and is strictly longer; equal
/// length keeps the incumbent.
pub fn fork_choice(local: &Chain, candidate: &[Block]) -> ForkChoice {
    match local.evaluate_candidate(candidate) {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Rejected candidate chain of length {}: {}", candidate.len(), e);
            ForkChoice::Keep
        }
    }
}

/// An ordered sequence of blocks with its mempool and derived ledger
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    params: ChainParams,
    ledger: Ledger,
    mempool: Mempool,
    confirmed: HashSet<String>,
    double_spends: Vec<DoubleSpendRecord>,
}

impl Chain {
    /// Create a chain holding only the genesis block
    pub fn new(params: ChainParams) -> Result<Self, MiningError> {
        let genesis = Self::genesis_block(&params)?;
        let mut ledger = Ledger::new();
        ledger.apply_all(&genesis.transactions)?;
        let confirmed = genesis
            .transactions
            .iter()
            .map(|tx| tx.id().to_string())
            .collect();

        Ok(Self {
            blocks: vec![genesis],
            params,
            ledger,
            mempool: Mempool::new(),
            confirmed,
            double_spends: Vec::new(),
        })
    }

    /// Build the deterministic genesis block for a parameter set
    pub fn genesis_block(params: &ChainParams) -> Result<Block, MiningError> {
        let allocations = params
            .genesis_allocations
            .iter()
            .map(|(wallet, amount)| Transaction::reward(wallet, *amount, params.genesis_timestamp))
            .collect();

        let mut genesis = Block::new(
            0,
            ZERO_HASH.to_string(),
            allocations,
            SYSTEM_WALLET,
            params.genesis_timestamp,
        );
        params.proof_of_work().solve(&mut genesis)?;
        debug!("Genesis block {}", genesis.short_hash());
        Ok(genesis)
    }

    /// Rebuild a chain from blocks received elsewhere
    pub fn from_blocks(params: ChainParams, blocks: Vec<Block>) -> Result<Self, ValidationError> {
        let state = validate_chain(&blocks, &params)?;
        Ok(Self {
            blocks,
            params,
            ledger: state.ledger,
            mempool: Mempool::new(),
            confirmed: state.confirmed,
            double_spends: Vec::new(),
        })
    }

    /// Replace the mempool with an empty one of the given capacity
    pub fn with_mempool_capacity(mut self, max_size: usize) -> Self {
        self.mempool = Mempool::with_capacity(max_size);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Get the latest block
    pub fn tip(&self) -> &Block {
        // A chain is never built without its genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true for a constructed chain
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index of the tip block
    pub fn height(&self) -> u64 {
        self.tip().index
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Balance of a wallet as of the tip
    pub fn balance_of(&self, wallet: &str) -> Amount {
        self.ledger.balance_of(wallet)
    }

    /// Balances of every ordinary wallet as of the tip
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        self.ledger.balances()
    }

    /// Whether a transaction is included in a block of this chain
    pub fn is_confirmed(&self, tx_id: &str) -> bool {
        self.confirmed.contains(tx_id)
    }

    /// Transactions discarded because their funds were spent elsewhere,
    /// oldest first
    pub fn double_spends(&self) -> &[DoubleSpendRecord] {
        &self.double_spends
    }

    fn record_double_spend(&mut self, tx: Transaction, kind: DoubleSpendKind) {
        warn!(
            "Double spend detected ({:?}): {} {} -> {} for {}",
            kind,
            tx.short_id(),
            tx.sender(),
            tx.receiver(),
            tx.amount()
        );
        self.double_spends.push(DoubleSpendRecord {
            tx,
            kind,
            detected_at: self.height(),
        });
    }

    /// Validate this chain's own blocks
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_chain(&self.blocks, &self.params).map(|_| ())
    }

    /// Submit a transaction to the mempool
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<SubmitReceipt, RejectionReason> {
        if self.is_confirmed(tx.id()) {
            return Err(RejectionReason::AlreadyConfirmed(tx.id().to_string()));
        }

        let tx_id = tx.id().to_string();
        let admission = self.mempool.submit(tx, &self.ledger)?;
        debug!("Transaction {} admitted ({:?})", tx_id, admission);

        Ok(SubmitReceipt {
            tx_id,
            mempool_size: self.mempool.len(),
            already_pending: admission == Admission::AlreadyPending,
        })
    }

    /// Assemble a block from the mempool, search its nonce and append it
    ///
    /// Drained transactions are replayed against a scratch ledger; any that
    /// no longer fit (already confirmed, or no longer fundable) are dropped.
    /// Nothing is committed unless the nonce search succeeds.
    pub fn mine_block(&mut self, miner: &str) -> Result<(Block, MiningStats), MiningError> {
        if miner.trim().is_empty() || miner == SYSTEM_WALLET {
            return Err(MiningError::InvalidMiner(miner.to_string()));
        }

        let timestamp = Utc::now();
        let drained = self.mempool.drain_for_block(self.params.max_txs_per_block);
        let reward = Transaction::reward(miner, self.params.block_reward, timestamp);

        let mut scratch = self.ledger.clone();
        if let Err(e) = scratch.apply(&reward) {
            self.mempool.restore(drained);
            return Err(e.into());
        }

        let mut transactions = vec![reward];
        let mut unfundable = Vec::new();
        for tx in &drained {
            if self.confirmed.contains(tx.id()) {
                warn!("Dropping {}: already confirmed", tx.short_id());
                continue;
            }
            match scratch.apply(tx) {
                Ok(()) => transactions.push(tx.clone()),
                Err(e @ LedgerError::Overdraft { .. }) => {
                    warn!("Dropping {} from block {}: {}", tx.short_id(), self.len(), e);
                    unfundable.push(tx.clone());
                }
                Err(e) => warn!("Dropping {} from block {}: {}", tx.short_id(), self.len(), e),
            }
        }

        let mut block = Block::new(
            self.len() as u64,
            self.tip().hash.clone(),
            transactions,
            miner,
            timestamp,
        );

        info!(
            "Mining block {} with difficulty {}...",
            block.index, self.params.difficulty
        );

        let stats = match self.params.proof_of_work().solve(&mut block) {
            Ok(stats) => stats,
            Err(e) => {
                self.mempool.restore(drained);
                return Err(e);
            }
        };

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            block.index, stats.time_ms, stats.attempts, stats.hash_rate
        );

        for tx in unfundable {
            self.record_double_spend(tx, DoubleSpendKind::Unfundable);
        }
        self.confirmed
            .extend(block.transactions.iter().map(|tx| tx.id().to_string()));
        self.ledger = scratch;
        self.blocks.push(block.clone());

        Ok((block, stats))
    }

    fn assess(&self, candidate: &[Block]) -> Result<(ForkChoice, ValidatedChain), ValidationError> {
        let state = validate_chain(candidate, &self.params)?;
        if candidate[0].hash != self.genesis().hash {
            return Err(ValidationError::GenesisMismatch);
        }

        let decision = if candidate.len() > self.blocks.len() {
            ForkChoice::Replace
        } else {
            ForkChoice::Keep
        };
        Ok((decision, state))
    }

    /// Decide whether a candidate chain would replace this one
    pub fn evaluate_candidate(&self, candidate: &[Block]) -> Result<ForkChoice, ValidationError> {
        self.assess(candidate).map(|(decision, _)| decision)
    }

    /// Adopt the candidate if it wins fork choice
    ///
    /// On replacement the ledger is swapped for the candidate's and the
    /// mempool is re-checked against it. Transactions from discarded blocks
    /// are not resurrected.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<ForkChoice, ValidationError> {
        let (decision, state) = self.assess(&candidate)?;
        if decision == ForkChoice::Keep {
            debug!(
                "Keeping local chain (length {}) over candidate (length {})",
                self.len(),
                candidate.len()
            );
            return Ok(ForkChoice::Keep);
        }

        let common = self
            .blocks
            .iter()
            .zip(candidate.iter())
            .take_while(|(ours, theirs)| ours.hash == theirs.hash)
            .count();
        let discarded = self.len() - common;
        if discarded == 0 {
            debug!("Extending chain: length {} -> {}", self.len(), candidate.len());
        } else {
            info!(
                "Replacing chain: length {} -> {}, {} block(s) discarded after fork at {}",
                self.len(),
                candidate.len(),
                discarded,
                common.saturating_sub(1)
            );
        }

        let orphaned: Vec<Transaction> = self.blocks[common..]
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| !tx.is_reward() && !state.confirmed.contains(tx.id()))
            .cloned()
            .collect();

        self.blocks = candidate;
        self.ledger = state.ledger;
        self.confirmed = state.confirmed;

        // Reversed when the funds are gone or the winning branch re-spent the same value
        let (reversed, dropped): (Vec<Transaction>, Vec<Transaction>) =
            orphaned.into_iter().partition(|tx| {
                self.ledger.balance_of(tx.sender()) < tx.amount()
                    || self.blocks[common..]
                        .iter()
                        .flat_map(|block| block.transactions.iter())
                        .any(|other| {
                            other.id() != tx.id()
                                && other.sender() == tx.sender()
                                && other.amount() == tx.amount()
                        })
            });
        for tx in dropped {
            debug!("Orphaned {} is not re-queued", tx.short_id());
        }
        for tx in reversed {
            self.record_double_spend(tx, DoubleSpendKind::Reversed);
        }

        let confirmed = &self.confirmed;
        let dropped = self
            .mempool
            .revalidate(&self.ledger, |id| confirmed.contains(id));
        for (tx, reason) in dropped {
            match reason {
                RejectionReason::AlreadyConfirmed(_) => {
                    debug!("Pending {} is now confirmed", tx.short_id())
                }
                RejectionReason::InsufficientBalance { .. } => {
                    self.record_double_spend(tx, DoubleSpendKind::Unfundable)
                }
                other => {
                    warn!("Dropped pending {} after reorganisation: {}", tx.short_id(), other)
                }
            }
        }

        Ok(ForkChoice::Replace)
    }

    /// Copy this chain up to and including block `index` as an independent
    /// branch with an empty mempool
    pub fn fork_at(&self, index: u64) -> Result<Chain, ValidationError> {
        let end = usize::try_from(index)
            .ok()
            .filter(|i| *i < self.blocks.len())
            .ok_or(ValidationError::UnknownBlock(index))?;

        let branch = Chain::from_blocks(self.params.clone(), self.blocks[..=end].to_vec())?;
        Ok(branch.with_mempool_capacity(self.mempool.max_size()))
    }

    /// Read-only view for reporting
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
            length: self.blocks.len(),
            mempool_size: self.mempool.len(),
            difficulty: self.params.difficulty,
            tip_hash: self.tip().hash.clone(),
            double_spends: self.double_spends.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChainParams {
        ChainParams::with_difficulty(4).with_allocation("A", Amount::from_coins(10))
    }

    fn coins(n: i64) -> Amount {
        Amount::from_coins(n)
    }

    #[test]
    fn test_new_chain() {
        let chain = Chain::new(params()).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.height(), 0);
        assert!(chain.validate().is_ok());
        assert_eq!(chain.balance_of("A"), coins(10));
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Chain::new(params()).unwrap();
        let b = Chain::new(params()).unwrap();
        assert_eq!(a.genesis(), b.genesis());

        let other = Chain::new(ChainParams::with_difficulty(4)).unwrap();
        assert_ne!(a.genesis().hash, other.genesis().hash);
    }

    #[test]
    fn test_mine_moves_funds_and_empties_mempool() {
        let mut chain = Chain::new(params()).unwrap();
        let receipt = chain
            .submit_transaction(Transaction::new("A", "B", coins(10)))
            .unwrap();
        assert_eq!(receipt.mempool_size, 1);

        let (block, _) = chain.mine_block("M1").unwrap();

        assert_eq!(block.index, 1);
        assert_eq!(block.tx_count(), 2);
        assert_eq!(chain.balance_of("B"), coins(10));
        assert_eq!(chain.balance_of("A"), Amount::ZERO);
        assert_eq!(chain.balance_of("M1"), coins(1));
        assert!(chain.mempool().is_empty());
        assert!(chain.is_confirmed(&receipt.tx_id));
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_insufficient_balance_rejected() {
        let mut chain = Chain::new(params()).unwrap();
        let err = chain
            .submit_transaction(Transaction::new("A", "B", coins(1000)))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::InsufficientBalance { .. }));
        assert_eq!(chain.mempool().len(), 0);
    }

    #[test]
    fn test_confirmed_transaction_cannot_be_resubmitted() {
        let mut chain = Chain::new(params()).unwrap();
        let tx = Transaction::new("A", "B", coins(1));
        chain.submit_transaction(tx.clone()).unwrap();
        chain.mine_block("M1").unwrap();

        assert_eq!(
            chain.submit_transaction(tx.clone()),
            Err(RejectionReason::AlreadyConfirmed(tx.id().to_string()))
        );
    }

    #[test]
    fn test_mining_twice_gives_distinct_blocks_same_deltas() {
        let mut chain = Chain::new(params()).unwrap();
        let (first, _) = chain.mine_block("M1").unwrap();
        let after_first = chain.balances();
        let (second, _) = chain.mine_block("M1").unwrap();

        assert_ne!(first.hash, second.hash);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(after_first["M1"], coins(1));
        assert_eq!(chain.balance_of("M1"), coins(2));
        assert_eq!(chain.balance_of("A"), after_first["A"]);
    }

    #[test]
    fn test_invalid_miner_rejected() {
        let mut chain = Chain::new(params()).unwrap();
        assert!(matches!(chain.mine_block(""), Err(MiningError::InvalidMiner(_))));
        assert!(matches!(
            chain.mine_block(SYSTEM_WALLET),
            Err(MiningError::InvalidMiner(_))
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_failed_mining_leaves_state_untouched() {
        let mut chain = Chain::new(params()).unwrap();
        chain.submit_transaction(Transaction::new("A", "B", coins(5))).unwrap();
        chain.params.difficulty = 256;
        chain.params.max_nonce = Some(3);

        let err = chain.mine_block("M1").unwrap_err();
        assert!(matches!(err, MiningError::NonceSpaceExhausted { index: 1, .. }));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.mempool().len(), 1);
        assert_eq!(chain.balance_of("A"), coins(10));
        assert_eq!(chain.balance_of("B"), Amount::ZERO);
    }

    #[test]
    fn test_assembly_drops_transactions_spent_elsewhere() {
        let mut chain = Chain::new(params()).unwrap();
        let tx = Transaction::new("A", "B", coins(10));
        chain.submit_transaction(tx.clone()).unwrap();

        // Another miner already spent A's funds on a replacement chain
        let mut rival = chain.fork_at(0).unwrap();
        rival
            .submit_transaction(Transaction::new("A", "C", coins(10)))
            .unwrap();
        rival.mine_block("M2").unwrap();
        rival.mine_block("M2").unwrap();
        assert_eq!(chain.replace_chain(rival.blocks().to_vec()).unwrap(), ForkChoice::Replace);

        // The pending spend no longer fits and was dropped on revalidation
        assert!(!chain.mempool().contains(tx.id()));
        assert_eq!(chain.double_spends().len(), 1);
        assert_eq!(chain.double_spends()[0].tx, tx);
        assert_eq!(chain.double_spends()[0].kind, DoubleSpendKind::Unfundable);
        let (block, _) = chain.mine_block("M1").unwrap();
        assert!(!block.contains(tx.id()));
        assert_eq!(chain.balance_of("C"), coins(10));
    }

    #[test]
    fn test_reorg_records_reversed_payment() {
        let mut chain = Chain::new(params()).unwrap();
        let paid = Transaction::new("A", "B", coins(10));
        chain.submit_transaction(paid.clone()).unwrap();
        chain.mine_block("M1").unwrap();
        assert!(chain.double_spends().is_empty());

        let mut rival = chain.fork_at(0).unwrap();
        let diverted = Transaction::new("A", "C", coins(10));
        rival.submit_transaction(diverted.clone()).unwrap();
        rival.mine_block("M2").unwrap();
        rival.mine_block("M2").unwrap();

        assert_eq!(chain.replace_chain(rival.into_blocks()).unwrap(), ForkChoice::Replace);
        assert!(!chain.is_confirmed(paid.id()));
        assert!(chain.is_confirmed(diverted.id()));

        let record = &chain.double_spends()[0];
        assert_eq!(chain.double_spends().len(), 1);
        assert_eq!(record.tx, paid);
        assert_eq!(record.kind, DoubleSpendKind::Reversed);
        assert_eq!(record.detected_at, 2);
        assert_eq!(chain.snapshot().double_spends, chain.double_spends());
    }

    #[test]
    fn test_reorg_without_conflict_records_nothing() {
        let mut chain = Chain::new(params()).unwrap();
        chain.mine_block("M1").unwrap();

        let mut longer = chain.clone();
        longer.mine_block("M1").unwrap();
        assert_eq!(chain.replace_chain(longer.into_blocks()).unwrap(), ForkChoice::Replace);
        assert!(chain.double_spends().is_empty());
    }

    #[test]
    fn test_validation_catches_tampering() {
        let mut chain = Chain::new(params()).unwrap();
        chain.submit_transaction(Transaction::new("A", "B", coins(4))).unwrap();
        chain.mine_block("M1").unwrap();
        chain.mine_block("M1").unwrap();
        let blocks = chain.blocks().to_vec();
        let p = chain.params().clone();

        let mut bad_hash = blocks.clone();
        bad_hash[1].nonce += 1;
        assert_eq!(
            validate_chain(&bad_hash, &p).unwrap_err(),
            ValidationError::HashMismatch { index: 1 }
        );

        let mut bad_link = blocks.clone();
        bad_link[2].previous_hash = ZERO_HASH.to_string();
        bad_link[2].hash = bad_link[2].compute_hash();
        let err = validate_chain(&bad_link, &p).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InsufficientWork { index: 2, .. } | ValidationError::BrokenLink { index: 2 }
        ));

        let mut bad_index = blocks.clone();
        bad_index.remove(1);
        assert!(matches!(
            validate_chain(&bad_index, &p).unwrap_err(),
            ValidationError::IndexMismatch { expected: 1, found: 2 }
        ));

        let mut malformed = blocks;
        malformed[1].hash = "xyz".to_string();
        assert!(matches!(
            validate_chain(&malformed, &p).unwrap_err(),
            ValidationError::MalformedHash { index: 1, .. }
        ));

        assert_eq!(validate_chain(&[], &p).unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn test_validation_rejects_uppercase_hash() {
        let mut chain = Chain::new(params()).unwrap();
        chain.mine_block("M1").unwrap();
        chain.mine_block("M1").unwrap();
        let p = chain.params().clone();

        // Same digest in upper case, with the next block relinked and re-mined
        let mut blocks = chain.blocks().to_vec();
        blocks[1].hash = blocks[1].hash.to_uppercase();
        blocks[2].previous_hash = blocks[1].hash.clone();
        p.proof_of_work().solve(&mut blocks[2]).unwrap();
        assert!(!blocks[1].verify_hash());

        assert_eq!(
            validate_chain(&blocks, &p).unwrap_err(),
            ValidationError::HashMismatch { index: 1 }
        );

        let mut longer = blocks;
        let mut next = Block::new(
            3,
            longer[2].hash.clone(),
            vec![Transaction::reward("M2", p.block_reward, Utc::now())],
            "M2",
            Utc::now(),
        );
        p.proof_of_work().solve(&mut next).unwrap();
        longer.push(next);
        assert!(chain.evaluate_candidate(&longer).is_err());
        assert_eq!(fork_choice(&chain, &longer), ForkChoice::Keep);
    }

    #[test]
    fn test_validation_replays_balances() {
        let params = params();
        let genesis = Chain::genesis_block(&params).unwrap();
        let now = Utc::now();

        // A block spending more than A holds, with otherwise valid work
        let mut block = Block::new(
            1,
            genesis.hash.clone(),
            vec![
                Transaction::reward("M1", params.block_reward, now),
                Transaction::new("A", "B", coins(11)),
            ],
            "M1",
            now,
        );
        params.proof_of_work().solve(&mut block).unwrap();

        let err = validate_chain(&[genesis, block], &params).unwrap_err();
        assert!(matches!(err, ValidationError::Overdraft { index: 1, .. }));
    }

    #[test]
    fn test_validation_checks_reward() {
        let params = params();
        let genesis = Chain::genesis_block(&params).unwrap();
        let now = Utc::now();

        let mut inflated = Block::new(
            1,
            genesis.hash.clone(),
            vec![Transaction::reward("M1", coins(50), now)],
            "M1",
            now,
        );
        params.proof_of_work().solve(&mut inflated).unwrap();
        assert!(matches!(
            validate_chain(&[genesis.clone(), inflated], &params).unwrap_err(),
            ValidationError::BadReward { index: 1, .. }
        ));

        let mut missing = Block::new(1, genesis.hash.clone(), vec![], "M1", now);
        params.proof_of_work().solve(&mut missing).unwrap();
        assert!(matches!(
            validate_chain(&[genesis, missing], &params).unwrap_err(),
            ValidationError::BadReward { index: 1, .. }
        ));
    }

    #[test]
    fn test_fork_choice_requires_strictly_longer_valid_chain() {
        let mut local = Chain::new(params()).unwrap();
        let mut rival = local.fork_at(0).unwrap();

        local.mine_block("M1").unwrap();
        rival.mine_block("M2").unwrap();

        // Equal length: the incumbent stays
        assert_eq!(fork_choice(&local, rival.blocks()), ForkChoice::Keep);

        rival.mine_block("M2").unwrap();
        assert_eq!(fork_choice(&local, rival.blocks()), ForkChoice::Replace);

        // Longer but invalid never replaces
        let mut forged = rival.blocks().to_vec();
        forged[2].transactions.pop();
        assert_eq!(fork_choice(&local, &forged), ForkChoice::Keep);
    }

    #[test]
    fn test_replace_chain_swaps_ledger() {
        let mut local = Chain::new(params()).unwrap();
        let mut rival = local.fork_at(0).unwrap();

        local.mine_block("M1").unwrap();
        rival.mine_block("M2").unwrap();
        rival.mine_block("M2").unwrap();

        assert_eq!(
            local.replace_chain(rival.blocks().to_vec()).unwrap(),
            ForkChoice::Replace
        );
        assert_eq!(local.len(), 3);
        assert_eq!(local.balance_of("M1"), Amount::ZERO);
        assert_eq!(local.balance_of("M2"), coins(2));
        assert!(local.validate().is_ok());
    }

    #[test]
    fn test_foreign_genesis_rejected() {
        let local = Chain::new(params()).unwrap();
        let mut foreign = Chain::new(ChainParams::with_difficulty(4)).unwrap();
        foreign.mine_block("M").unwrap();
        foreign.mine_block("M").unwrap();

        assert_eq!(
            local.evaluate_candidate(foreign.blocks()),
            Err(ValidationError::GenesisMismatch)
        );
    }

    #[test]
    fn test_fork_at_is_independent() {
        let mut chain = Chain::new(params()).unwrap();
        chain.mine_block("M1").unwrap();

        let mut branch = chain.fork_at(0).unwrap();
        assert_eq!(branch.len(), 1);
        branch.mine_block("M2").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.balance_of("M2"), Amount::ZERO);

        assert_eq!(
            chain.fork_at(5).unwrap_err(),
            ValidationError::UnknownBlock(5)
        );
    }

    #[test]
    fn test_chain_integrity_holds_for_mined_chain() {
        let mut chain = Chain::new(params()).unwrap();
        for i in 0..4 {
            chain.mine_block(&format!("M{}", i)).unwrap();
        }
        for pair in chain.blocks().windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].compute_hash());
        }
    }
}
