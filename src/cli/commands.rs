//! CLI commands for the ledger engine
//!
//! Every invocation builds a fresh in-memory node from the configuration;
//! nothing is persisted between runs.

use crate::attack::{AttackOutcome, AttackRequest, PartitionOutcome, SuccessModel};
use crate::config::EngineConfig;
use crate::core::{Amount, Block, DoubleSpendRecord};
use crate::mining::MiningStats;
use crate::network::ReconcileReport;
use crate::node::Node;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Options of the `attack` command
#[derive(Debug, Clone)]
pub struct AttackArgs {
    pub attacker: String,
    pub victim: String,
    pub shadow: Option<String>,
    pub amount: Amount,
    pub blocks: u64,
    pub fork_point: Option<u64>,
    pub model: Option<SuccessModel>,
    /// Public blocks mined before the attack starts
    pub warmup: u64,
    pub json: bool,
}

fn print_balances(balances: &BTreeMap<String, Amount>) {
    if balances.is_empty() {
        println!("   (no balances)");
        return;
    }
    for (wallet, balance) in balances {
        println!("   {:<20} {}", wallet, balance);
    }
}

fn print_block(block: &Block, stats: &MiningStats) {
    println!("\n   Block {} mined!", block.index);
    println!("   ├─ Hash: {}", block.short_hash());
    println!("   ├─ Transactions: {}", block.tx_count());
    println!("   ├─ Time: {}ms", stats.time_ms);
    println!("   ├─ Attempts: {}", stats.attempts);
    println!("   └─ Hash rate: {:.2} H/s", stats.hash_rate);
}

fn print_outcome(outcome: &AttackOutcome) {
    println!("\n🗡️  Double-spend attack: {} -> {}", outcome.attacker, outcome.victim);
    for step in &outcome.steps {
        println!("   [{}] {}", step.phase, step.message);
    }

    println!();
    if outcome.successful {
        println!("✅ Attack succeeded: {} kept {}", outcome.shadow_wallet, outcome.amount);
    } else {
        println!("❌ Attack failed: {} was paid {}", outcome.victim, outcome.amount);
    }
    println!("   ├─ Probability used: {:.3}", outcome.probability_used);
    println!(
        "   ├─ Private branch: {} block(s) ({} catch-up)",
        outcome.private_length, outcome.catch_up_blocks
    );
    println!("   ├─ Public chain at race: {} block(s)", outcome.public_length);
    println!(
        "   └─ Naturally ahead: {}",
        if outcome.natural_win { "yes" } else { "no" }
    );
}

fn print_double_spends(records: &[DoubleSpendRecord]) {
    if records.is_empty() {
        return;
    }
    println!("\n🚨 Double spends detected:");
    for record in records {
        println!(
            "   • {:?} at block {}: {} -> {} for {} ({})",
            record.kind,
            record.detected_at,
            record.tx.sender(),
            record.tx.receiver(),
            record.tx.amount(),
            record.tx.short_id()
        );
    }
}

fn print_partition(outcome: &PartitionOutcome) {
    if outcome.successful {
        println!(
            "✂️  Partition succeeded (p={:.3}): {} isolated, {} reachable",
            outcome.probability_used,
            outcome.isolated.len(),
            outcome.reachable.len()
        );
    } else {
        println!("❌ Partition failed (p={:.3})", outcome.probability_used);
    }
    for peer in &outcome.isolated {
        println!("   ├─ isolated:  {}", peer);
    }
    for peer in &outcome.reachable {
        println!("   ├─ reachable: {}", peer);
    }
}

fn print_report(report: &ReconcileReport) {
    println!("🔄 Reconciliation: {:?}", report.decision);
    if let Some(peer) = &report.adopted_from {
        println!("   ├─ Adopted chain from: {}", peer);
    }
    println!("   ├─ Valid candidates: {}", report.candidates_validated);
    println!("   ├─ Local length: {}", report.local_length);
    println!("   └─ Skipped peers: {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("      • {}: {}", skipped.peer, skipped.reason);
    }
}

/// Print the effective configuration as TOML
pub fn cmd_config(config: &EngineConfig) -> CliResult<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Mine blocks on a fresh chain
pub async fn cmd_mine(config: EngineConfig, miner: &str, count: u32) -> CliResult<()> {
    let node = Node::new(config)?;

    println!("⛏️  Mining {} block(s) for: {}", count, miner);
    println!("   Difficulty: {} bits", node.config().chain.difficulty);

    for (block, stats) in node.mine_blocks(miner, u64::from(count)).await? {
        print_block(&block, &stats);
    }

    let snapshot = node.get_chain_snapshot().await;
    println!("\n⛓️  Chain length: {} (tip {})", snapshot.length, &snapshot.tip_hash[..16]);
    println!("💰 Balances:");
    print_balances(&node.get_balances().await);
    Ok(())
}

/// Run one double-spend attack on a fresh chain
pub async fn cmd_attack(config: EngineConfig, args: AttackArgs) -> CliResult<()> {
    let node = Node::new(config)?;
    let honest_miner = node.config().attack.honest_miner.clone();

    node.mine_blocks(&honest_miner, args.warmup).await?;

    let mut request = AttackRequest::new(&args.attacker, &args.victim, args.amount, args.blocks);
    if let Some(shadow) = &args.shadow {
        request = request.with_shadow_wallet(shadow);
    }
    if let Some(index) = args.fork_point {
        request = request.with_fork_point(index);
    }
    if let Some(model) = args.model {
        request = request.with_success_model(model);
    }

    let outcome = node.run_attack(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_outcome(&outcome);
    print_double_spends(&node.detected_double_spends().await);
    println!("\n💰 Balances after the attack:");
    print_balances(&node.get_balances().await);
    Ok(())
}

/// Try to partition the configured peers and report who was cut off
pub async fn cmd_partition(config: EngineConfig, ratio: f64, json: bool) -> CliResult<()> {
    let node = Node::new(config)?;
    let outcome = node.simulate_partition(ratio).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_partition(&outcome);
    }
    Ok(())
}

/// Pull chains from peers once and report the decision
pub async fn cmd_reconcile(config: EngineConfig, peers: Vec<String>) -> CliResult<()> {
    let node = Node::new(config)?;
    let report = node.reconcile_with_peers(&peers).await;
    print_report(&report);

    let snapshot = node.get_chain_snapshot().await;
    println!("\n⛓️  Chain length: {} (tip {})", snapshot.length, &snapshot.tip_hash[..16]);
    Ok(())
}

/// Serve the chain, reconcile periodically and optionally keep mining
pub async fn cmd_node(config: EngineConfig, miner: Option<String>) -> CliResult<()> {
    let listen = format!("0.0.0.0:{}", config.network.listen_port);
    let interval = Duration::from_secs(config.network.reconcile_interval_secs.max(1));
    let node = Arc::new(Node::new(config)?);

    println!("🚀 Node listening on {}", listen);
    let peers = node.peers().await;
    if !peers.is_empty() {
        println!("   Peers: {}", peers.iter().collect::<Vec<_>>().join(", "));
    }

    let mining = {
        let node = Arc::clone(&node);
        async move {
            let Some(miner) = miner else {
                return std::future::pending::<()>().await;
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = node.mine(&miner).await {
                    log::warn!("Mining failed: {}", e);
                }
            }
        }
    };

    tokio::select! {
        result = node.serve(&listen) => result?,
        _ = node.reconcile_forever(interval) => {}
        _ = mining => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\n👋 Shutting down");
        }
    }

    Ok(())
}
