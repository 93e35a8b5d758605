//! Node Configuration

use pot_consensus::pot::REFERENCE_AVERAGE_BLOCK_TIME;
use pot_peers::DEFAULT_CANDIDATE_CAPACITY;
use pot_txpool::DEFAULT_MUTABLE_RANGE;
use pot_types::{hash, PubKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Chain {0} configured twice")]
    DuplicateChain(String),

    #[error("Chain {0}: average block time must be positive")]
    InvalidBlockTime(String),
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory for the state store
    pub data_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// This node's public key, base58. Derived from the data dir if unset.
    pub self_key: Option<String>,
    /// Chains to follow
    pub chains: Vec<ChainConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            self_key: None,
            chains: vec![ChainConfig::default()],
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn self_key(&self) -> Result<PubKey, ConfigError> {
        match &self.self_key {
            Some(encoded) => {
                PubKey::from_base58(encoded).ok_or_else(|| ConfigError::InvalidKey(encoded.clone()))
            }
            None => Ok(PubKey::new(hash(self.data_dir.to_string_lossy().as_bytes()))),
        }
    }
}

/// Per-chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain identifier
    pub name: String,
    /// Average block time in seconds
    pub average_block_time: u64,
    /// Mutable-range window, in blocks
    pub mutable_range: usize,
    /// Block and tx candidate set size
    pub candidate_capacity: usize,
    /// This node's mining power on the chain
    pub power: u64,
    /// Known peers, base58 public keys
    pub bootstrap_peers: Vec<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "community".to_string(),
            average_block_time: REFERENCE_AVERAGE_BLOCK_TIME,
            mutable_range: DEFAULT_MUTABLE_RANGE,
            candidate_capacity: DEFAULT_CANDIDATE_CAPACITY,
            power: 1,
            bootstrap_peers: Vec::new(),
        }
    }
}

impl ChainConfig {
    pub fn bootstrap_peers(&self) -> Result<Vec<PubKey>, ConfigError> {
        self.bootstrap_peers
            .iter()
            .map(|encoded| {
                PubKey::from_base58(encoded).ok_or_else(|| ConfigError::InvalidKey(encoded.clone()))
            })
            .collect()
    }
}
