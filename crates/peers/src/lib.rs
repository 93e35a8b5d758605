//! Peer selection for one chain
//!
//! Keeps the known peers, a sliding window of recently active ("mutable
//! range") peers, and two small candidate sets used to pick who to ask for
//! blocks and transactions without hitting the same peer every round.

pub mod manager;

pub use manager::{PeerManager, PeerManagerConfig, DEFAULT_CANDIDATE_CAPACITY};
