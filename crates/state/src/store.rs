//! The account/state store interface consumed by the mempool

use crate::error::StoreError;
use pot_types::{AccountState, ChainId, PubKey, Transaction, TxId};

/// Per-chain account state plus the durable pool of this node's own transactions.
///
/// Implementations must be safe to share between the mining thread and the
/// network threads.
pub trait StateStore: Send + Sync {
    /// Read an account, `None` if it has never been written
    fn get_account(&self, chain_id: &ChainId, pubkey: &PubKey) -> Result<Option<AccountState>, StoreError>;

    /// Write an account
    fn put_account(&self, chain_id: &ChainId, pubkey: &PubKey, state: AccountState) -> Result<(), StoreError>;

    /// Last nonce consumed on chain by `pubkey`
    fn get_nonce(&self, chain_id: &ChainId, pubkey: &PubKey) -> Result<u64, StoreError> {
        self.get_account(chain_id, pubkey)?
            .map(|account| account.nonce)
            .ok_or(StoreError::AccountNotFound)
    }

    /// Persist one of this node's own transactions
    fn put_tx_into_self_pool(&self, chain_id: &ChainId, tx: &Transaction) -> Result<(), StoreError>;

    /// All persisted own transactions for a chain
    fn get_self_tx_pool(&self, chain_id: &ChainId) -> Result<Vec<Transaction>, StoreError>;

    /// Drop a persisted own transaction (after it was confirmed)
    fn remove_tx_from_self_pool(&self, chain_id: &ChainId, txid: &TxId) -> Result<(), StoreError>;
}
