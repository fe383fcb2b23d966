//! Read-only reporting surface
//!
//! Snapshots and attack statistics handed to external consumers such as
//! dashboards or exporters. Nothing here feeds back into consensus.

use crate::attack::AttackOutcome;
use crate::core::{Block, DoubleSpendRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Success rate below which the attacker is advised to change tactics
pub const LOW_SUCCESS_RATE: f64 = 0.3;

/// Success rate above which the current tactics are considered effective
pub const HIGH_SUCCESS_RATE: f64 = 0.7;

/// Point-in-time view of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    pub length: usize,
    pub mempool_size: usize,
    pub difficulty: u32,
    pub tip_hash: String,
    /// Transactions discarded because their funds were spent elsewhere
    pub double_spends: Vec<DoubleSpendRecord>,
}

/// Advice derived from a run of attacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    IncreaseHashPower,
    WaitForHigherLatency,
    PartitionNetworkFirst,
    KeepStrategy,
    ReduceHashPower,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Recommendation::IncreaseHashPower => "Raise the hash-power share above 40%",
            Recommendation::WaitForHigherLatency => "Wait until honest propagation is slower",
            Recommendation::PartitionNetworkFirst => "Isolate part of the network before attacking",
            Recommendation::KeepStrategy => "The current parameters are effective",
            Recommendation::ReduceHashPower => "The same results need less hash power",
        };
        f.write_str(text)
    }
}

/// Parameter ranges under which the attacker tends to win
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalConditions {
    pub min_hash_power_share: f64,
    pub max_hash_power_share: f64,
    pub min_latency_ms: f64,
    pub min_base_probability: f64,
}

impl Default for OptimalConditions {
    fn default() -> Self {
        Self {
            min_hash_power_share: 0.4,
            max_hash_power_share: 0.6,
            min_latency_ms: 200.0,
            min_base_probability: 0.7,
        }
    }
}

/// Recommendations for an observed success rate
pub fn recommendations_for(success_rate: f64) -> Vec<Recommendation> {
    if success_rate < LOW_SUCCESS_RATE {
        vec![
            Recommendation::IncreaseHashPower,
            Recommendation::WaitForHigherLatency,
            Recommendation::PartitionNetworkFirst,
        ]
    } else if success_rate > HIGH_SUCCESS_RATE {
        vec![Recommendation::KeepStrategy, Recommendation::ReduceHashPower]
    } else {
        Vec::new()
    }
}

/// Aggregate figures over a set of attacks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttackStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub average_probability: f64,
    /// Mean hash-power share over natural runs only
    pub average_hash_power: Option<f64>,
    pub recommendations: Vec<Recommendation>,
    pub optimal_conditions: OptimalConditions,
}

/// Outcomes of every attack run on one node, oldest first
#[derive(Debug, Clone, Default)]
pub struct AttackHistory {
    outcomes: Vec<AttackOutcome>,
}

impl AttackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: AttackOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[AttackOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn stats(&self) -> AttackStats {
        let total = self.outcomes.len();
        if total == 0 {
            return AttackStats::default();
        }

        let successful = self.outcomes.iter().filter(|o| o.successful).count();
        let probability_sum: f64 = self.outcomes.iter().map(|o| o.probability_used).sum();

        let shares: Vec<f64> = self
            .outcomes
            .iter()
            .filter_map(|o| o.hash_power_share)
            .collect();
        let average_hash_power = if shares.is_empty() {
            None
        } else {
            Some(shares.iter().sum::<f64>() / shares.len() as f64)
        };

        let success_rate = successful as f64 / total as f64;
        AttackStats {
            total,
            successful,
            failed: total - successful,
            success_rate,
            average_probability: probability_sum / total as f64,
            average_hash_power,
            recommendations: recommendations_for(success_rate),
            optimal_conditions: OptimalConditions::default(),
        }
    }
}
