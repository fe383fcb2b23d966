//! Node facade
//!
//! Ties one chain to its peers, the reconciliation coordinator, the attack
//! simulator and a seeded random source, and exposes the operations callers
//! use. The chain is shared as `Arc<RwLock<Chain>>` so the chain server can
//! answer peers while the node keeps working.

use crate::attack::{
    simulate_partition, AttackError, AttackOutcome, AttackRequest, AttackSimulator,
    PartitionOutcome,
};
use crate::config::EngineConfig;
use crate::core::{Amount, Block, Chain, DoubleSpendRecord, ForkChoice, SubmitReceipt, Transaction};
use crate::mining::{Miner, MiningError, MiningStats, RejectionReason};
use crate::network::{
    ChainFetcher, ChainServer, PeerCoordinator, PeerError, PeerSet, ReconcileReport,
    TcpChainFetcher,
};
use crate::report::{AttackHistory, AttackStats, ChainSnapshot};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// A single ledger node
pub struct Node<F = TcpChainFetcher> {
    chain: Arc<RwLock<Chain>>,
    peers: RwLock<PeerSet>,
    /// Peers cut off by a successful partition attempt
    isolated: RwLock<PeerSet>,
    coordinator: PeerCoordinator<F>,
    simulator: AttackSimulator,
    rng: Mutex<StdRng>,
    history: RwLock<AttackHistory>,
    config: EngineConfig,
}

impl Node<TcpChainFetcher> {
    /// Create a node that talks to peers over TCP
    pub fn new(config: EngineConfig) -> Result<Self, MiningError> {
        let fetcher = TcpChainFetcher::new(config.network.fetch_timeout());
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: ChainFetcher> Node<F> {
    /// Create a node with a custom chain transport
    pub fn with_fetcher(config: EngineConfig, fetcher: F) -> Result<Self, MiningError> {
        let chain = Chain::new(config.chain.clone())?.with_mempool_capacity(config.mempool.max_size);
        log::info!(
            "Node ready: genesis {}, difficulty {}",
            chain.genesis().short_hash(),
            config.chain.difficulty
        );

        let rng = match config.attack.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let simulator = AttackSimulator::new(
            &config.attack.honest_miner,
            config.attack.honest_confirmations,
            config.attack.success_model(),
        );

        Ok(Self {
            chain: Arc::new(RwLock::new(chain)),
            peers: RwLock::new(PeerSet::from_addresses(&config.network.peers)),
            isolated: RwLock::new(PeerSet::new()),
            coordinator: PeerCoordinator::new(fetcher),
            simulator,
            rng: Mutex::new(rng),
            history: RwLock::new(AttackHistory::new()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the node's chain
    pub fn chain_handle(&self) -> Arc<RwLock<Chain>> {
        Arc::clone(&self.chain)
    }

    /// Submit a payment to the mempool
    pub async fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: Amount,
    ) -> Result<SubmitReceipt, RejectionReason> {
        let tx = Transaction::new(sender, receiver, amount);
        self.chain.write().await.submit_transaction(tx)
    }

    /// Run mining work on a copy of the chain, then adopt the result
    ///
    /// The nonce search runs on the blocking pool without holding the chain
    /// lock, so peers keep being served. The mined branch goes through the
    /// same fork-choice gate as a peer's chain.
    async fn mine_detached<T, W>(&self, work: W) -> Result<T, MiningError>
    where
        T: Send + 'static,
        W: FnOnce(&mut Chain) -> Result<T, MiningError> + Send + 'static,
    {
        let mut branch = self.chain.read().await.clone();
        let start_length = branch.len();

        let (branch, mined) = tokio::task::spawn_blocking(move || {
            let mined = work(&mut branch);
            (branch, mined)
        })
        .await
        .map_err(|e| MiningError::Interrupted(e.to_string()))?;
        let mined = mined?;

        if branch.len() == start_length {
            return Ok(mined);
        }
        let tip = branch.height();
        match self.chain.write().await.replace_chain(branch.into_blocks())? {
            ForkChoice::Replace => Ok(mined),
            ForkChoice::Keep => Err(MiningError::Superseded { index: tip }),
        }
    }

    /// Mine one block
    pub async fn mine(&self, miner: &str) -> Result<(Block, MiningStats), MiningError> {
        let worker = Miner::new(miner);
        self.mine_detached(move |chain| worker.mine(chain)).await
    }

    /// Mine `count` blocks in a row
    pub async fn mine_blocks(
        &self,
        miner: &str,
        count: u64,
    ) -> Result<Vec<(Block, MiningStats)>, MiningError> {
        let worker = Miner::new(miner);
        self.mine_detached(move |chain| worker.mine_continuously(chain, count))
            .await
    }

    pub async fn get_chain_snapshot(&self) -> ChainSnapshot {
        self.chain.read().await.snapshot()
    }

    pub async fn get_balances(&self) -> BTreeMap<String, Amount> {
        self.chain.read().await.balances()
    }

    pub async fn balance_of(&self, wallet: &str) -> Amount {
        self.chain.read().await.balance_of(wallet)
    }

    /// Transactions this node saw discarded in favour of a conflicting spend
    pub async fn detected_double_spends(&self) -> Vec<DoubleSpendRecord> {
        self.chain.read().await.double_spends().to_vec()
    }

    /// Run one attack session against this node's chain
    pub async fn run_attack(&self, request: &AttackRequest) -> Result<AttackOutcome, AttackError> {
        let outcome = {
            let mut chain = self.chain.write().await;
            let mut rng = self.rng.lock().await;
            self.simulator.run(&mut chain, request, &mut *rng)?
        };
        self.history.write().await.record(outcome.clone());
        Ok(outcome)
    }

    pub async fn attack_stats(&self) -> AttackStats {
        self.history.read().await.stats()
    }

    pub async fn attack_history(&self) -> Vec<AttackOutcome> {
        self.history.read().await.outcomes().to_vec()
    }

    pub async fn add_peer(&self, addr: &str) -> Result<bool, PeerError> {
        self.peers.write().await.add(addr)
    }

    pub async fn peers(&self) -> PeerSet {
        self.peers.read().await.clone()
    }

    /// Try to cut `ratio` of the known peers off from this node
    ///
    /// On success the isolated peers are left out of reconciliation with
    /// known peers until [`Node::heal_partition`] is called.
    pub async fn simulate_partition(&self, ratio: f64) -> Result<PartitionOutcome, AttackError> {
        let peers = self.peers().await;
        let outcome = {
            let mut rng = self.rng.lock().await;
            simulate_partition(&peers, ratio, &self.simulator.default_model, &mut *rng)?
        };
        *self.isolated.write().await = PeerSet::from_addresses(&outcome.isolated);
        Ok(outcome)
    }

    /// Make every known peer reachable again
    pub async fn heal_partition(&self) {
        *self.isolated.write().await = PeerSet::new();
    }

    /// Known peers not cut off by a partition
    pub async fn reachable_peers(&self) -> PeerSet {
        let isolated = self.isolated.read().await;
        PeerSet::from_addresses(
            self.peers
                .read()
                .await
                .iter()
                .filter(|addr| !isolated.contains(addr)),
        )
    }

    /// Reconcile with the given peers, or with the reachable known peers if
    /// none given
    pub async fn reconcile_with_peers(&self, addresses: &[String]) -> ReconcileReport {
        let peers = if addresses.is_empty() {
            self.reachable_peers().await
        } else {
            PeerSet::from_addresses(addresses)
        };
        self.coordinator.reconcile(&self.chain, &peers).await
    }

    /// Reconcile with known peers forever
    pub async fn reconcile_forever(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let report = self.reconcile_with_peers(&[]).await;
            log::info!(
                "Reconciled: {:?}, {} valid candidate(s), {} skipped, length {}",
                report.decision,
                report.candidates_validated,
                report.skipped.len(),
                report.local_length
            );
        }
    }

    /// Serve the chain to peers on `addr` until the listener fails
    pub async fn serve(&self, addr: &str) -> Result<(), std::io::Error> {
        let server = ChainServer::bind(addr).await?;
        server.serve(self.chain_handle()).await
    }
}
