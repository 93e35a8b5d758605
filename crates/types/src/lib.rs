//! Core types shared by every crate of the node core
//!
//! - Fixed-length identities (public keys, transaction ids, block hashes)
//! - Transactions and account state as seen by the mempool
//! - A clock abstraction so time-dependent logic can be driven in tests

pub mod clock;
pub mod ids;
pub mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{hash, BlockHash, ChainId, PeerId, PubKey, TxId, HASH_LEN};
pub use transaction::{AccountState, Transaction};
pub use primitive_types::U256;
