//! Per-account "last consumed nonce" cache
//!
//! Reads fall through to the state store once per account and are then
//! served from memory. Store failures degrade to nonce 0.

use dashmap::DashMap;
use pot_state::{StateStore, StoreError};
use pot_types::{ChainId, PubKey};
use std::sync::Arc;

pub struct NonceCache {
    chain_id: ChainId,
    store: Arc<dyn StateStore>,
    nonces: DashMap<PubKey, u64>,
}

impl NonceCache {
    pub fn new(chain_id: ChainId, store: Arc<dyn StateStore>) -> Self {
        Self {
            chain_id,
            store,
            nonces: DashMap::new(),
        }
    }

    /// Cached nonce, loading it from the store on first use
    pub fn get_nonce(&self, pubkey: &PubKey) -> u64 {
        if let Some(nonce) = self.nonces.get(pubkey) {
            return *nonce;
        }

        let nonce = match self.store.get_nonce(&self.chain_id, pubkey) {
            Ok(nonce) => nonce,
            Err(StoreError::AccountNotFound) => 0,
            Err(e) => {
                tracing::warn!("Nonce lookup for {} on {} failed: {}", pubkey, self.chain_id, e);
                0
            }
        };

        *self.nonces.entry(*pubkey).or_insert(nonce)
    }

    /// Overwrite the cached nonce
    pub fn set_nonce(&self, pubkey: &PubKey, nonce: u64) {
        self.nonces.insert(*pubkey, nonce);
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}
