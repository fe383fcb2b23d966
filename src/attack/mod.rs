//! Double-spend attack simulation
//!
//! An attacker pays a victim on the public chain, then mines a private
//! branch paying the same funds to a wallet of its own and races it against
//! the honest chain. The branch only takes effect if it wins ordinary fork
//! choice.

pub mod model;
pub mod partition;
pub mod session;

pub use model::{latency_factor, natural_probability, ModelError, SuccessModel};
pub use partition::{simulate_partition, PartitionOutcome, DEFAULT_PARTITION_RATIO};
pub use session::{
    AttackError, AttackOutcome, AttackPhase, AttackRequest, AttackSimulator, AttackStep,
    DEFAULT_HONEST_CONFIRMATIONS, DEFAULT_HONEST_MINER,
};
