//! Transaction pool for one chain
//!
//! - Read-through nonce cache over the state store
//! - Two priority policies: local (nonce continuity, then recency) and remote (fee)
//! - The pool itself, with best-transaction selection for block assembly

pub mod nonce_cache;
pub mod policy;
pub mod pool;

pub use nonce_cache::NonceCache;
pub use policy::{LocalEntry, RemoteEntry};
pub use pool::{PoolConfig, TransactionPool, DEFAULT_MUTABLE_RANGE, SLIM_DOWN_FACTOR};
