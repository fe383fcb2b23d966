//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Amounts (fixed-point coin values)
//! - Transactions (account-to-account transfers with derived ids)
//! - Blocks (with proof of work)
//! - The balance ledger replayed from blocks
//! - Chains (validation, mining, fork choice)

pub mod amount;
pub mod block;
pub mod chain;
pub mod codec;
pub mod ledger;
pub mod transaction;

pub use amount::{Amount, AmountError, AMOUNT_DECIMALS};
pub use block::Block;
pub use chain::{
    fork_choice, validate_chain, Chain, ChainParams, DoubleSpendKind, DoubleSpendRecord,
    ForkChoice, SubmitReceipt, ValidatedChain, ValidationError, DEFAULT_DIFFICULTY,
    DEFAULT_GENESIS_UNIX, DEFAULT_MAX_TXS_PER_BLOCK,
};
pub use ledger::{Ledger, LedgerError};
pub use transaction::{Transaction, TransactionError, SYSTEM_WALLET};
