//! Peer consensus: pull remote chains and apply the longest-valid-chain rule
//!
//! The coordinator never pushes anything to peers. It fetches each peer's
//! full chain, validates it against the local chain, and hands the longest
//! valid candidate to [`Chain::replace_chain`]. Peers that cannot be reached
//! or that serve an invalid chain are skipped and logged.

use crate::core::{Block, Chain, ForkChoice, ValidationError};
use crate::network::peer::{PeerError, PeerSet};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use tokio::sync::RwLock;

/// Transport used to pull a chain from a peer
pub trait ChainFetcher: Send + Sync {
    /// Fetch every block the peer holds, genesis first
    fn fetch_chain(&self, peer: &str)
        -> impl Future<Output = Result<Vec<Block>, PeerError>> + Send;
}

/// A chain offered by some source, not yet validated
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: String,
    pub blocks: Vec<Block>,
}

/// A peer left out of a reconciliation round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPeer {
    pub peer: String,
    pub reason: String,
}

/// Summary of one reconciliation round
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub decision: ForkChoice,
    /// Peer whose chain replaced the local one
    pub adopted_from: Option<String>,
    /// Number of candidates that passed validation
    pub candidates_validated: usize,
    pub skipped: Vec<SkippedPeer>,
    /// Local chain length after the round
    pub local_length: usize,
}

/// Submit a candidate chain to the fork-choice gate
///
/// Every chain, including a privately mined attack branch, enters the local
/// chain through here.
pub fn adopt_candidate(chain: &mut Chain, candidate: Candidate) -> Result<ForkChoice, ValidationError> {
    let length = candidate.blocks.len();
    let decision = chain.replace_chain(candidate.blocks)?;
    match decision {
        ForkChoice::Replace => log::info!(
            "Adopted chain of length {} from {}",
            length,
            candidate.source
        ),
        ForkChoice::Keep => log::debug!(
            "Kept local chain over {} (length {})",
            candidate.source,
            length
        ),
    }
    Ok(decision)
}

/// Validate candidates and adopt the longest one if it beats the local chain
pub fn apply_candidates(
    chain: &mut Chain,
    candidates: Vec<Candidate>,
    mut skipped: Vec<SkippedPeer>,
) -> ReconcileReport {
    let mut best: Option<Candidate> = None;
    let mut candidates_validated = 0;

    for candidate in candidates {
        if let Err(e) = chain.evaluate_candidate(&candidate.blocks) {
            log::warn!("Rejected chain from {}: {}", candidate.source, e);
            skipped.push(SkippedPeer {
                peer: candidate.source,
                reason: e.to_string(),
            });
            continue;
        }
        candidates_validated += 1;

        let longer = best
            .as_ref()
            .map_or(true, |b| candidate.blocks.len() > b.blocks.len());
        if longer {
            best = Some(candidate);
        }
    }

    let mut report = ReconcileReport {
        decision: ForkChoice::Keep,
        adopted_from: None,
        candidates_validated,
        skipped,
        local_length: chain.len(),
    };

    if let Some(candidate) = best {
        let source = candidate.source.clone();
        match adopt_candidate(chain, candidate) {
            Ok(ForkChoice::Replace) => {
                report.decision = ForkChoice::Replace;
                report.adopted_from = Some(source);
            }
            Ok(ForkChoice::Keep) => {}
            Err(e) => {
                log::warn!("Rejected chain from {}: {}", source, e);
                report.skipped.push(SkippedPeer {
                    peer: source,
                    reason: e.to_string(),
                });
            }
        }
    }

    report.local_length = chain.len();
    report
}

/// Pulls chains from peers and reconciles the local chain with them
pub struct PeerCoordinator<F> {
    fetcher: F,
}

impl<F: ChainFetcher> PeerCoordinator<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Fetch every peer's chain concurrently
    ///
    /// Unreachable peers are returned as skipped, never as an error.
    pub async fn collect(&self, peers: &PeerSet) -> (Vec<Candidate>, Vec<SkippedPeer>) {
        let fetches = peers.iter().map(|peer| async move {
            (peer.to_string(), self.fetcher.fetch_chain(peer).await)
        });

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for (peer, result) in join_all(fetches).await {
            match result {
                Ok(blocks) => {
                    log::debug!("Fetched {} block(s) from {}", blocks.len(), peer);
                    candidates.push(Candidate {
                        source: peer,
                        blocks,
                    });
                }
                Err(e) => {
                    log::warn!("Skipping peer {}: {}", peer, e);
                    skipped.push(SkippedPeer {
                        peer,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (candidates, skipped)
    }

    /// Reconcile a chain owned by the caller
    pub async fn reconcile_chain(&self, chain: &mut Chain, peers: &PeerSet) -> ReconcileReport {
        let (candidates, skipped) = self.collect(peers).await;
        apply_candidates(chain, candidates, skipped)
    }

    /// Reconcile a shared chain
    ///
    /// The lock is held only while candidates are applied, not while peers
    /// are being contacted.
    pub async fn reconcile(&self, chain: &RwLock<Chain>, peers: &PeerSet) -> ReconcileReport {
        let (candidates, skipped) = self.collect(peers).await;
        let mut chain = chain.write().await;
        apply_candidates(&mut chain, candidates, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, ChainParams, Transaction};
    use std::collections::HashMap;

    /// Serves fixed chains from memory
    struct StaticFetcher {
        chains: HashMap<String, Vec<Block>>,
    }

    impl ChainFetcher for StaticFetcher {
        async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
            self.chains
                .get(peer)
                .cloned()
                .ok_or_else(|| PeerError::Unreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    fn params() -> ChainParams {
        ChainParams::with_difficulty(4).with_allocation("alice", Amount::from_coins(10))
    }

    fn extended(base: &Chain, miner: &str, blocks: usize) -> Chain {
        let mut branch = base.fork_at(base.height()).unwrap();
        for _ in 0..blocks {
            branch.mine_block(miner).unwrap();
        }
        branch
    }

    #[tokio::test]
    async fn test_reconcile_adopts_longest_valid_chain() {
        let mut local = Chain::new(params()).unwrap();
        let short = extended(&local, "m1", 1);
        let long = extended(&local, "m2", 3);

        let coordinator = PeerCoordinator::new(StaticFetcher {
            chains: HashMap::from([
                ("a:1".to_string(), short.blocks().to_vec()),
                ("b:2".to_string(), long.blocks().to_vec()),
            ]),
        });
        let peers = PeerSet::from_addresses(["a:1", "b:2", "c:3"]);

        let report = coordinator.reconcile_chain(&mut local, &peers).await;

        assert_eq!(report.decision, ForkChoice::Replace);
        assert_eq!(report.adopted_from.as_deref(), Some("b:2"));
        assert_eq!(report.candidates_validated, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].peer, "c:3");
        assert_eq!(local.len(), 4);
        assert_eq!(local.balance_of("m2"), Amount::from_coins(3));
    }

    #[tokio::test]
    async fn test_reconcile_keeps_on_equal_length() {
        let base = Chain::new(params()).unwrap();
        let mut local = extended(&base, "m1", 2);
        let rival = extended(&base, "m2", 2);

        let coordinator = PeerCoordinator::new(StaticFetcher {
            chains: HashMap::from([("a:1".to_string(), rival.blocks().to_vec())]),
        });
        let report = coordinator
            .reconcile_chain(&mut local, &PeerSet::from_addresses(["a:1"]))
            .await;

        assert_eq!(report.decision, ForkChoice::Keep);
        assert_eq!(report.candidates_validated, 1);
        assert_eq!(local.balance_of("m1"), Amount::from_coins(2));
    }

    #[tokio::test]
    async fn test_reconcile_skips_invalid_chain() {
        let mut local = Chain::new(params()).unwrap();
        let mut forged = extended(&local, "m2", 3).into_blocks();
        forged[2].transactions.push(Transaction::new("alice", "mallory", Amount::from_coins(5)));

        let coordinator = PeerCoordinator::new(StaticFetcher {
            chains: HashMap::from([("a:1".to_string(), forged)]),
        });
        let lock = RwLock::new(local.clone());
        let report = coordinator
            .reconcile(&lock, &PeerSet::from_addresses(["a:1"]))
            .await;

        assert_eq!(report.decision, ForkChoice::Keep);
        assert_eq!(report.candidates_validated, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(lock.read().await.len(), 1);

        let report = apply_candidates(&mut local, vec![], vec![]);
        assert_eq!(report.local_length, 1);
    }
}
