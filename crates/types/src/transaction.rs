//! Transactions and account state as seen by the pool

use crate::ids::{PubKey, TxId, HASH_LEN};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A signed-and-verified transaction. Identity is the `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash of the transaction contents
    pub id: TxId,
    /// Sender public key
    pub sender: PubKey,
    /// Sender account nonce this transaction consumes
    pub nonce: u64,
    /// Fee offered to the block producer
    pub fee: u64,
    /// Creation time (unix seconds)
    pub timestamp: u64,
    /// Opaque application payload (messages, transfers)
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Create a transaction, deriving its id from the contents
    pub fn new(sender: PubKey, nonce: u64, fee: u64, timestamp: u64, payload: Vec<u8>) -> Self {
        let id = Self::compute_id(&sender, nonce, fee, timestamp, &payload);
        Self {
            id,
            sender,
            nonce,
            fee,
            timestamp,
            payload,
        }
    }

    fn compute_id(sender: &PubKey, nonce: u64, fee: u64, timestamp: u64, payload: &[u8]) -> TxId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(sender.as_ref());
        hasher.update(&nonce.to_be_bytes());
        hasher.update(&fee.to_be_bytes());
        hasher.update(&timestamp.to_be_bytes());
        hasher.update(payload);

        let digest: [u8; HASH_LEN] = *hasher.finalize().as_bytes();
        TxId::new(digest)
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// On-chain account state, owned by the state store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: U256,
    /// Last nonce consumed on chain; never decreases
    pub nonce: u64,
    pub identity: Option<String>,
}

impl AccountState {
    pub fn new(balance: U256, nonce: u64) -> Self {
        Self {
            balance,
            nonce,
            identity: None,
        }
    }
}
