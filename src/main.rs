//! Double-spend lab CLI
//!
//! A command-line interface for mining, attacking and reconciling
//! in-memory ledgers.

use clap::{Parser, Subcommand};
use double_spend_lab::attack::{SuccessModel, DEFAULT_PARTITION_RATIO};
use double_spend_lab::cli::{self, AttackArgs};
use double_spend_lab::config::EngineConfig;
use double_spend_lab::core::Amount;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dslab")]
#[command(author = "Darshan")]
#[command(version)]
#[command(about = "Proof-of-work ledger and double-spend attack simulator", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a double-spend attack against a fresh chain
    Attack {
        /// Attacking wallet (must be funded at genesis)
        #[arg(short, long, default_value = "mallory")]
        attacker: String,

        /// Wallet receiving the legitimate payment
        #[arg(short, long, default_value = "merchant")]
        victim: String,

        /// Attacker-controlled wallet for the conflicting payment
        #[arg(short, long)]
        shadow: Option<String>,

        /// Amount to double-spend
        #[arg(long, default_value = "10")]
        amount: Amount,

        /// Blocks to mine on the private branch
        #[arg(short, long, default_value = "3")]
        blocks: u64,

        /// Block the private branch starts from (default: current tip)
        #[arg(long)]
        fork_point: Option<u64>,

        /// Public blocks to mine before the attack
        #[arg(long, default_value = "0")]
        warmup: u64,

        /// Always let the attack succeed
        #[arg(long, conflicts_with = "force_failure")]
        force_success: bool,

        /// Always let the attack fail
        #[arg(long)]
        force_failure: bool,

        /// Base success probability for the natural model
        #[arg(long)]
        base_probability: Option<f64>,

        /// Attacker's share of total hash power (0-1)
        #[arg(long)]
        hash_power: Option<f64>,

        /// Seed for the outcome draw
        #[arg(long)]
        seed: Option<u64>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mine blocks on a fresh chain
    Mine {
        /// Miner receiving the rewards
        #[arg(short, long)]
        miner: String,

        /// Number of blocks to mine
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Run a node that serves its chain and reconciles with peers
    Node {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Peers to reconcile with (comma-separated host:port)
        #[arg(long)]
        peers: Option<String>,

        /// Seconds between reconciliation rounds
        #[arg(long)]
        reconcile_interval: Option<u64>,

        /// Mine a block every interval for this wallet
        #[arg(long)]
        miner: Option<String>,
    },

    /// Reconcile once with peers and report the decision
    Reconcile {
        /// Peers to pull chains from (comma-separated host:port)
        #[arg(long)]
        peers: Option<String>,
    },

    /// Try to isolate part of the peer network
    Partition {
        /// Peers to partition (comma-separated host:port)
        #[arg(long)]
        peers: Option<String>,

        /// Share of peers to isolate (0-1)
        #[arg(long, default_value_t = DEFAULT_PARTITION_RATIO)]
        ratio: f64,

        /// Seed for the draw
        #[arg(long)]
        seed: Option<u64>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn split_peers(peers: Option<String>) -> Vec<String> {
    peers
        .map(|p| {
            p.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Attack {
            attacker,
            victim,
            shadow,
            amount,
            blocks,
            fork_point,
            warmup,
            force_success,
            force_failure,
            base_probability,
            hash_power,
            seed,
            json,
        } => {
            if seed.is_some() {
                config.attack.seed = seed;
            }

            let model = if force_success {
                Some(SuccessModel::ForcedSuccess)
            } else if force_failure {
                Some(SuccessModel::ForcedFailure)
            } else if base_probability.is_some() || hash_power.is_some() {
                Some(SuccessModel::natural(
                    base_probability.unwrap_or(config.attack.base_probability),
                    hash_power.unwrap_or(config.attack.hash_power_share),
                )?)
            } else {
                None
            };

            let args = AttackArgs {
                attacker,
                victim,
                shadow,
                amount,
                blocks,
                fork_point,
                model,
                warmup,
                json,
            };
            rt.block_on(cli::cmd_attack(config, args))?;
        }

        Commands::Mine { miner, count } => {
            rt.block_on(cli::cmd_mine(config, &miner, count))?;
        }

        Commands::Node {
            port,
            peers,
            reconcile_interval,
            miner,
        } => {
            if let Some(port) = port {
                config.network.listen_port = port;
            }
            config.network.peers.extend(split_peers(peers));
            if let Some(secs) = reconcile_interval {
                config.network.reconcile_interval_secs = secs;
            }
            rt.block_on(cli::cmd_node(config, miner))?;
        }

        Commands::Reconcile { peers } => {
            let peers = split_peers(peers);
            rt.block_on(cli::cmd_reconcile(config, peers))?;
        }

        Commands::Partition {
            peers,
            ratio,
            seed,
            json,
        } => {
            config.network.peers.extend(split_peers(peers));
            if seed.is_some() {
                config.attack.seed = seed;
            }
            rt.block_on(cli::cmd_partition(config, ratio, json))?;
        }

        Commands::Config => {
            cli::cmd_config(&config)?;
        }
    }

    Ok(())
}
