//! State storage for the node core
//!
//! This crate provides the account/state store the mempool reads from:
//! - The `StateStore` interface (nonces, accounts, the local self-pool)
//! - An in-memory store for tests and light nodes
//! - A sled-backed store that survives restarts

pub mod error;
pub mod memory;
pub mod persistence;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStateStore;
pub use persistence::SledStateStore;
pub use store::StateStore;
