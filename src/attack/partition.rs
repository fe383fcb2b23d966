//! Network partition attempts
//!
//! Before racing, an attacker may try to cut part of the honest network off
//! so that fewer peers see the public chain. Whether the attempt works is
//! decided by a success model; on success a seeded sample of peers is
//! isolated.

use crate::attack::model::SuccessModel;
use crate::attack::session::AttackError;
use crate::network::PeerSet;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Share of peers isolated when no ratio is given
pub const DEFAULT_PARTITION_RATIO: f64 = 0.5;

/// Result of one partition attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionOutcome {
    pub successful: bool,
    pub probability_used: f64,
    pub partition_ratio: f64,
    /// Peers cut off from the rest, sorted
    pub isolated: Vec<String>,
    /// Peers still reachable, sorted
    pub reachable: Vec<String>,
}

/// Try to isolate `ratio` of `peers`
///
/// At least one peer is isolated on success. A failed attempt leaves every
/// peer reachable.
pub fn simulate_partition<R: Rng + ?Sized>(
    peers: &PeerSet,
    ratio: f64,
    model: &SuccessModel,
    rng: &mut R,
) -> Result<PartitionOutcome, AttackError> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(AttackError::InvalidParameters(format!(
            "partition_ratio must be within [0, 1], got {}",
            ratio
        )));
    }
    if peers.is_empty() {
        return Err(AttackError::InvalidParameters(
            "no peers to partition".to_string(),
        ));
    }
    model.validate()?;

    let addresses: Vec<String> = peers.iter().map(str::to_string).collect();
    let (successful, probability_used) = model.decide(rng);
    if !successful {
        log::info!("Partition attempt failed (p={:.3})", probability_used);
        return Ok(PartitionOutcome {
            successful,
            probability_used,
            partition_ratio: ratio,
            isolated: Vec::new(),
            reachable: addresses,
        });
    }

    let count = ((addresses.len() as f64 * ratio) as usize).max(1);
    let mut isolated: Vec<String> = addresses.choose_multiple(rng, count).cloned().collect();
    isolated.sort();
    let reachable: Vec<String> = addresses
        .into_iter()
        .filter(|addr| isolated.binary_search(addr).is_err())
        .collect();

    log::info!(
        "Partition isolated {} peer(s), {} still reachable",
        isolated.len(),
        reachable.len()
    );

    Ok(PartitionOutcome {
        successful,
        probability_used,
        partition_ratio: ratio,
        isolated,
        reachable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn peers(n: u16) -> PeerSet {
        PeerSet::from_addresses((1..=n).map(|port| format!("10.0.0.1:{}", port)))
    }

    #[test]
    fn test_forced_partition_isolates_share() {
        let mut rng = StdRng::seed_from_u64(5);
        let outcome =
            simulate_partition(&peers(6), 0.5, &SuccessModel::ForcedSuccess, &mut rng).unwrap();

        assert!(outcome.successful);
        assert_eq!(outcome.isolated.len(), 3);
        assert_eq!(outcome.reachable.len(), 3);
        assert!(outcome.isolated.iter().all(|p| !outcome.reachable.contains(p)));
    }

    #[test]
    fn test_small_ratio_still_isolates_one_peer() {
        let mut rng = StdRng::seed_from_u64(5);
        let outcome =
            simulate_partition(&peers(3), 0.1, &SuccessModel::ForcedSuccess, &mut rng).unwrap();
        assert_eq!(outcome.isolated.len(), 1);
        assert_eq!(outcome.reachable.len(), 2);
    }

    #[test]
    fn test_failed_partition_keeps_everyone() {
        let mut rng = StdRng::seed_from_u64(5);
        let outcome =
            simulate_partition(&peers(4), 0.5, &SuccessModel::ForcedFailure, &mut rng).unwrap();
        assert!(!outcome.successful);
        assert!(outcome.isolated.is_empty());
        assert_eq!(outcome.reachable.len(), 4);
    }

    #[test]
    fn test_same_seed_same_partition() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            simulate_partition(&peers(10), 0.4, &SuccessModel::ForcedSuccess, &mut rng)
                .unwrap()
                .isolated
        };
        assert_eq!(draw(17), draw(17));
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = SuccessModel::ForcedSuccess;
        assert!(matches!(
            simulate_partition(&peers(2), 1.5, &model, &mut rng),
            Err(AttackError::InvalidParameters(_))
        ));
        assert!(matches!(
            simulate_partition(&PeerSet::new(), 0.5, &model, &mut rng),
            Err(AttackError::InvalidParameters(_))
        ));
    }
}
