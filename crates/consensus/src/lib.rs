//! Proof-of-Transaction consensus core
//!
//! - `pot`: generation signatures, hits, targets, cumulative difficulty and
//!   the block-time acceptance rule
//! - `voting`: per-chain vote tally over competing block hashes, used for fork choice

pub mod pot;
pub mod voting;

pub use pot::{PotConfig, ProofOfTransaction};
pub use voting::{Vote, VotingPool};
