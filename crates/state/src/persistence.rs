//! Persistence layer for account state and the self-pool
//!
//! Uses the sled embedded database so own transactions survive restarts and
//! can be re-admitted to the pool on warm start.

use crate::{error::StoreError, store::StateStore};
use pot_types::{AccountState, ChainId, PubKey, Transaction, TxId};
use sled::Db;
use std::path::Path;

/// Persistent state store
pub struct SledStateStore {
    /// Sled database instance
    db: Db,
    /// Accounts tree, keyed by chain prefix + pubkey
    accounts: sled::Tree,
    /// Own transactions tree, keyed by chain prefix + txid
    self_pool: sled::Tree,
}

impl SledStateStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(&path)?;
        let accounts = db.open_tree("accounts")?;
        let self_pool = db.open_tree("self_pool")?;

        tracing::info!("Opened state store at {:?}", path.as_ref());

        Ok(Self {
            db,
            accounts,
            self_pool,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored accounts across all chains
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// Length-prefixed chain id so one chain's keys never prefix another's
fn chain_prefix(chain_id: &ChainId) -> Vec<u8> {
    let bytes = chain_id.as_bytes();
    let mut prefix = Vec::with_capacity(8 + bytes.len() + 32);
    prefix.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    prefix.extend_from_slice(bytes);
    prefix
}

fn scoped_key(chain_id: &ChainId, suffix: &[u8]) -> Vec<u8> {
    let mut key = chain_prefix(chain_id);
    key.extend_from_slice(suffix);
    key
}

impl StateStore for SledStateStore {
    fn get_account(&self, chain_id: &ChainId, pubkey: &PubKey) -> Result<Option<AccountState>, StoreError> {
        match self.accounts.get(scoped_key(chain_id, pubkey.as_ref()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_account(&self, chain_id: &ChainId, pubkey: &PubKey, state: AccountState) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&state)?;
        self.accounts.insert(scoped_key(chain_id, pubkey.as_ref()), bytes)?;
        Ok(())
    }

    fn put_tx_into_self_pool(&self, chain_id: &ChainId, tx: &Transaction) -> Result<(), StoreError> {
        let bytes = bincode::serialize(tx)?;
        self.self_pool.insert(scoped_key(chain_id, tx.id.as_ref()), bytes)?;
        Ok(())
    }

    fn get_self_tx_pool(&self, chain_id: &ChainId) -> Result<Vec<Transaction>, StoreError> {
        let prefix = chain_prefix(chain_id);
        let mut txs = Vec::new();

        for result in self.self_pool.scan_prefix(&prefix) {
            let (key, value) = result?;
            if key.len() != prefix.len() + 32 {
                return Err(StoreError::CorruptKey("self_pool"));
            }
            let tx: Transaction = bincode::deserialize(&value)?;
            txs.push(tx);
        }

        Ok(txs)
    }

    fn remove_tx_from_self_pool(&self, chain_id: &ChainId, txid: &TxId) -> Result<(), StoreError> {
        self.self_pool.remove(scoped_key(chain_id, txid.as_ref()))?;
        Ok(())
    }
}
