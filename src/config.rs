//! Engine configuration
//!
//! Loaded from a TOML file; every field has a default, so an empty file (or
//! no file at all) gives a working demo setup.

use crate::attack::{ModelError, SuccessModel, DEFAULT_HONEST_CONFIRMATIONS, DEFAULT_HONEST_MINER};
use crate::core::{Amount, ChainParams};
use crate::mining::DEFAULT_MEMPOOL_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid attack model: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mempool: MempoolConfig,
    pub attack: AttackConfig,
    pub network: NetworkConfig,
    #[serde(default = "default_chain")]
    pub chain: ChainParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_mempool_size")]
    pub max_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackConfig {
    #[serde(default = "default_base_probability")]
    pub base_probability: f64,
    #[serde(default = "default_hash_power_share")]
    pub hash_power_share: f64,
    #[serde(default = "default_honest_confirmations")]
    pub honest_confirmations: u64,
    #[serde(default = "default_honest_miner")]
    pub honest_miner: String,
    /// Seed for attack draws; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_chain() -> ChainParams {
    ChainParams::default()
        .with_allocation("alice", Amount::from_coins(50))
        .with_allocation("mallory", Amount::from_coins(100))
}

fn default_mempool_size() -> usize {
    DEFAULT_MEMPOOL_SIZE
}

fn default_base_probability() -> f64 {
    0.5
}

fn default_hash_power_share() -> f64 {
    0.3
}

fn default_honest_confirmations() -> u64 {
    DEFAULT_HONEST_CONFIRMATIONS
}

fn default_honest_miner() -> String {
    DEFAULT_HONEST_MINER.to_string()
}

fn default_listen_port() -> u16 {
    8333
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mempool: MempoolConfig::default(),
            attack: AttackConfig::default(),
            network: NetworkConfig::default(),
            chain: default_chain(),
        }
    }
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_mempool_size(),
        }
    }
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            base_probability: default_base_probability(),
            hash_power_share: default_hash_power_share(),
            honest_confirmations: default_honest_confirmations(),
            honest_miner: default_honest_miner(),
            seed: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            peers: Vec::new(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

impl AttackConfig {
    /// Natural model built from the configured parameters
    pub fn success_model(&self) -> SuccessModel {
        SuccessModel::Natural {
            base_probability: self.base_probability,
            hash_power_share: self.hash_power_share,
        }
    }
}

impl NetworkConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl EngineConfig {
    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a file if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.chain.difficulty > 256 {
            return invalid(format!(
                "difficulty {} exceeds 256 bits",
                self.chain.difficulty
            ));
        }
        if self.chain.max_txs_per_block == 0 {
            return invalid("max_txs_per_block must be at least 1".to_string());
        }
        if !self.chain.block_reward.is_positive() {
            return invalid("block_reward must be positive".to_string());
        }
        if let Some((wallet, amount)) = self
            .chain
            .genesis_allocations
            .iter()
            .find(|(_, amount)| !amount.is_positive())
        {
            return invalid(format!("allocation for {} must be positive, got {}", wallet, amount));
        }
        if self.mempool.max_size == 0 {
            return invalid("mempool max_size must be at least 1".to_string());
        }
        self.attack.success_model().validate()?;
        if self.attack.honest_miner.trim().is_empty() {
            return invalid("honest_miner must not be empty".to_string());
        }
        if self.network.fetch_timeout_ms == 0 {
            return invalid("fetch_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.chain.difficulty, 16);
        assert_eq!(config.chain.block_reward, Amount::from_coins(1));
        assert_eq!(config.chain.genesis_allocations["mallory"], Amount::from_coins(100));
        assert_eq!(config.network.listen_port, 8333);
        assert_eq!(config.attack.seed, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[chain]
difficulty = 6
block_reward = "2.5"

[chain.genesis_allocations]
eve = "10"

[attack]
seed = 42
hash_power_share = 0.45

[network]
peers = ["127.0.0.1:9000"]
"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.chain.difficulty, 6);
        assert_eq!(config.chain.block_reward, "2.5".parse().unwrap());
        assert_eq!(config.chain.max_txs_per_block, 5);
        assert_eq!(config.chain.genesis_allocations.len(), 1);
        assert_eq!(config.attack.seed, Some(42));
        assert_eq!(config.attack.base_probability, 0.5);
        assert_eq!(config.network.peers, vec!["127.0.0.1:9000".to_string()]);
        assert_eq!(config.network.fetch_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_rejects_invalid_values() {
        for content in [
            "[chain]\ndifficulty = 300",
            "[chain]\nmax_txs_per_block = 0",
            "[network]\nfetch_timeout_ms = 0",
            "[chain.genesis_allocations]\nbob = \"0\"",
        ] {
            assert!(
                matches!(EngineConfig::from_toml(content), Err(ConfigError::Invalid(_))),
                "{} should be rejected",
                content
            );
        }
        assert!(matches!(
            EngineConfig::from_toml("[attack]\nbase_probability = 1.5"),
            Err(ConfigError::Model(ModelError::BaseProbability(_)))
        ));
        assert!(matches!(
            EngineConfig::from_toml("[chain]\ndifficulty = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::load("/nonexistent/dslab.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let text = EngineConfig::default().to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), EngineConfig::default());
    }
}
