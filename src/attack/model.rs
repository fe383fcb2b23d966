//! Success models for the attack race
//!
//! A model turns the attacker's parameters into a probability and draws a
//! single decision from an injected random source.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Nominal one-way latency between attacker and network, in milliseconds
pub const NOMINAL_LATENCY_MS: f64 = 100.0;

/// Exponent applied to the hash-power share
pub const HASH_POWER_EXPONENT: f64 = 0.8;

/// Multiplier for the attacker's head start when releasing a whole branch
pub const PROPAGATION_BOOST: f64 = 1.05;

/// Lowest probability a natural race is given
pub const MIN_PROBABILITY: f64 = 0.05;

/// Highest probability a natural race is given
pub const MAX_PROBABILITY: f64 = 0.95;

/// Out-of-range model parameters
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ModelError {
    #[error("base_probability must be within [0, 1], got {0}")]
    BaseProbability(f64),
    #[error("hash_power_share must be within [0, 1], got {0}")]
    HashPowerShare(f64),
}

/// How the race outcome is decided
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SuccessModel {
    /// Weighted random draw
    Natural {
        base_probability: f64,
        hash_power_share: f64,
    },
    /// The attack always wins
    ForcedSuccess,
    /// The attack always loses
    ForcedFailure,
}

impl Default for SuccessModel {
    fn default() -> Self {
        SuccessModel::Natural {
            base_probability: 0.5,
            hash_power_share: 0.3,
        }
    }
}

impl fmt::Display for SuccessModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessModel::Natural {
                base_probability,
                hash_power_share,
            } => write!(
                f,
                "natural (base {:.2}, hash power {:.0}%)",
                base_probability,
                hash_power_share * 100.0
            ),
            SuccessModel::ForcedSuccess => write!(f, "forced success"),
            SuccessModel::ForcedFailure => write!(f, "forced failure"),
        }
    }
}

/// Latency penalty: 1.0 at zero latency, never below 0.5
pub fn latency_factor(latency_ms: f64) -> f64 {
    (1.0 - latency_ms / 1000.0).max(0.5)
}

/// Probability of a natural race being won by the attacker
///
/// Monotonically non-decreasing in `hash_power_share` and clamped to
/// `[MIN_PROBABILITY, MAX_PROBABILITY]`.
pub fn natural_probability(base_probability: f64, hash_power_share: f64) -> f64 {
    let raw = base_probability
        * hash_power_share.powf(HASH_POWER_EXPONENT)
        * latency_factor(NOMINAL_LATENCY_MS)
        * PROPAGATION_BOOST;
    raw.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
}

fn in_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl SuccessModel {
    /// Build a natural model, checking both parameters
    pub fn natural(base_probability: f64, hash_power_share: f64) -> Result<Self, ModelError> {
        let model = SuccessModel::Natural {
            base_probability,
            hash_power_share,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check the parameters of a natural model (NaN is rejected too)
    pub fn validate(&self) -> Result<(), ModelError> {
        match *self {
            SuccessModel::Natural {
                base_probability,
                hash_power_share,
            } => {
                if !in_unit_interval(base_probability) {
                    return Err(ModelError::BaseProbability(base_probability));
                }
                if !in_unit_interval(hash_power_share) {
                    return Err(ModelError::HashPowerShare(hash_power_share));
                }
                Ok(())
            }
            SuccessModel::ForcedSuccess | SuccessModel::ForcedFailure => Ok(()),
        }
    }

    pub fn probability(&self) -> f64 {
        match self {
            SuccessModel::Natural {
                base_probability,
                hash_power_share,
            } => natural_probability(*base_probability, *hash_power_share),
            SuccessModel::ForcedSuccess => 1.0,
            SuccessModel::ForcedFailure => 0.0,
        }
    }

    /// Hash-power share of a natural model
    pub fn hash_power_share(&self) -> Option<f64> {
        match self {
            SuccessModel::Natural {
                hash_power_share, ..
            } => Some(*hash_power_share),
            _ => None,
        }
    }

    /// Decide the race; returns the decision and the probability used
    ///
    /// Forced models never touch the random source.
    pub fn decide<R: Rng + ?Sized>(&self, rng: &mut R) -> (bool, f64) {
        let probability = self.probability();
        let successful = match self {
            SuccessModel::ForcedSuccess => true,
            SuccessModel::ForcedFailure => false,
            SuccessModel::Natural { .. } => rng.gen_bool(probability),
        };
        (successful, probability)
    }
}
