//! Double-spend lab: an in-memory proof-of-work ledger for studying
//! double-spending attacks
//!
//! This crate provides:
//! - Account-based transactions with fixed-point amounts
//! - Proof of Work mining with a deterministic nonce search
//! - Full-chain validation and longest-valid-chain fork choice
//! - A mempool that refuses to queue the same funds twice
//! - Peer reconciliation over TCP
//! - A private-fork double-spend simulator with seeded, configurable odds
//!
//! # Example
//!
//! ```rust
//! use double_spend_lab::attack::{AttackRequest, AttackSimulator, SuccessModel};
//! use double_spend_lab::core::{Amount, Chain, ChainParams};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let params = ChainParams::with_difficulty(4).with_allocation("mallory", Amount::from_coins(10));
//! let mut chain = Chain::new(params).unwrap();
//!
//! let request = AttackRequest::new("mallory", "merchant", Amount::from_coins(10), 3)
//!     .with_success_model(SuccessModel::ForcedSuccess);
//! let mut rng = StdRng::seed_from_u64(42);
//! let outcome = AttackSimulator::default().run(&mut chain, &request, &mut rng).unwrap();
//!
//! assert!(outcome.successful);
//! assert_eq!(chain.balance_of("merchant"), Amount::ZERO);
//! ```

pub mod attack;
pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod node;
pub mod report;

// Re-export commonly used types
pub use crate::attack::{AttackError, AttackOutcome, AttackRequest, AttackSimulator, SuccessModel};
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::core::{
    fork_choice, validate_chain, Amount, Block, Chain, ChainParams, ForkChoice, Transaction,
    ValidationError, SYSTEM_WALLET,
};
pub use crate::mining::{Mempool, Miner, MiningError, RejectionReason};
pub use crate::network::{PeerCoordinator, PeerError, PeerSet, ReconcileReport, TcpChainFetcher};
pub use crate::node::Node;
pub use crate::report::{AttackHistory, AttackStats, ChainSnapshot};
