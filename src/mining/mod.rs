//! Mining module for block creation and transaction pooling

pub mod mempool;
pub mod miner;

pub use mempool::{Admission, Mempool, RejectionReason, DEFAULT_MEMPOOL_SIZE};
pub use miner::{Miner, MiningError, MiningStats, ProofOfWork};
