//! Node core wiring
//!
//! One `ChainContext` per followed chain (pool, peers, PoT engine, recent
//! headers) owned by a `ChainManager`, which also holds the vote tally shared
//! by every chain.

pub mod assembly;
pub mod chain;
pub mod config;

pub use assembly::{BlockCandidate, BlockHeader};
pub use chain::{ChainContext, ChainManager};
pub use config::{ChainConfig, ConfigError, NodeConfig};

#[cfg(test)]
mod tests;
