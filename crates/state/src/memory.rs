//! In-memory state store using DashMap for concurrent access

use crate::{error::StoreError, store::StateStore};
use dashmap::DashMap;
use pot_types::{AccountState, ChainId, PubKey, Transaction, TxId};
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe in-memory state store
///
/// Uses DashMap for lock-free concurrent reads and fine-grained write locks.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    /// Account state keyed by (chain, account)
    accounts: Arc<DashMap<(ChainId, PubKey), AccountState>>,
    /// Own transactions per chain
    self_pools: Arc<DashMap<ChainId, HashMap<TxId, Transaction>>>,
}

impl MemoryStateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set only the nonce of an account, creating it if needed
    pub fn set_nonce(&self, chain_id: &ChainId, pubkey: &PubKey, nonce: u64) {
        self.accounts
            .entry((chain_id.clone(), *pubkey))
            .or_default()
            .nonce = nonce;
    }

    /// Number of persisted own transactions for a chain
    pub fn self_pool_len(&self, chain_id: &ChainId) -> usize {
        self.self_pools.get(chain_id).map(|p| p.len()).unwrap_or(0)
    }
}

impl StateStore for MemoryStateStore {
    fn get_account(&self, chain_id: &ChainId, pubkey: &PubKey) -> Result<Option<AccountState>, StoreError> {
        Ok(self
            .accounts
            .get(&(chain_id.clone(), *pubkey))
            .map(|r| r.value().clone()))
    }

    fn put_account(&self, chain_id: &ChainId, pubkey: &PubKey, state: AccountState) -> Result<(), StoreError> {
        self.accounts.insert((chain_id.clone(), *pubkey), state);
        Ok(())
    }

    fn put_tx_into_self_pool(&self, chain_id: &ChainId, tx: &Transaction) -> Result<(), StoreError> {
        self.self_pools
            .entry(chain_id.clone())
            .or_default()
            .insert(tx.id, tx.clone());
        Ok(())
    }

    fn get_self_tx_pool(&self, chain_id: &ChainId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .self_pools
            .get(chain_id)
            .map(|pool| pool.values().cloned().collect())
            .unwrap_or_default())
    }

    fn remove_tx_from_self_pool(&self, chain_id: &ChainId, txid: &TxId) -> Result<(), StoreError> {
        if let Some(mut pool) = self.self_pools.get_mut(chain_id) {
            pool.remove(txid);
        }
        Ok(())
    }
}
