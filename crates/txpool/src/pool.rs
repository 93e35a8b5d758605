//! Transaction Pool - local and remote priority queues over one index
//!
//! `all` is the single source of truth for retrieval. `locals` holds this
//! node's own transactions ordered by nonce continuity, `remotes` holds
//! network transactions ordered by fee. Every id in a queue is in `all`.
//!
//! ## Thread Safety
//!
//! All three structures sit behind one mutex per pool; the nonce cache has its
//! own fine-grained locking and is only ever taken inside the pool lock.

use crate::nonce_cache::NonceCache;
use crate::policy::{LocalEntry, RemoteEntry};
use parking_lot::Mutex;
use pot_state::StateStore;
use pot_types::{ChainId, PubKey, Transaction, TxId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Default size of the mutable-range window
pub const DEFAULT_MUTABLE_RANGE: usize = 36;

/// The pool is slimmed once it holds more than this many mutable ranges
pub const SLIM_DOWN_FACTOR: usize = 3;

/// Pool configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Mutable-range window size, in blocks
    pub mutable_range: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mutable_range: DEFAULT_MUTABLE_RANGE,
        }
    }
}

#[derive(Default)]
struct PoolState {
    all: HashMap<TxId, Transaction>,
    locals: BTreeSet<LocalEntry>,
    remotes: BTreeSet<RemoteEntry>,
}

impl PoolState {
    fn insert_local(&mut self, tx: Transaction) {
        self.remove(&tx.id);
        self.locals.insert(LocalEntry::from(&tx));
        self.all.insert(tx.id, tx);
    }

    fn insert_remote(&mut self, tx: Transaction) {
        self.remove(&tx.id);
        self.remotes.insert(RemoteEntry::from(&tx));
        self.all.insert(tx.id, tx);
    }

    fn is_local(&self, txid: &TxId) -> bool {
        self.all
            .get(txid)
            .is_some_and(|tx| self.locals.contains(&LocalEntry::from(tx)))
    }

    fn remove(&mut self, txid: &TxId) -> Option<Transaction> {
        let tx = self.all.remove(txid)?;
        self.locals.remove(&LocalEntry::from(&tx));
        self.remotes.remove(&RemoteEntry::from(&tx));
        Some(tx)
    }
}

/// Pending transactions for one chain
pub struct TransactionPool {
    chain_id: ChainId,
    /// This node's key; remote transactions from it are treated as local
    self_key: PubKey,
    store: Arc<dyn StateStore>,
    nonce_cache: NonceCache,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl TransactionPool {
    pub fn new(chain_id: ChainId, self_key: PubKey, store: Arc<dyn StateStore>, config: PoolConfig) -> Self {
        Self {
            nonce_cache: NonceCache::new(chain_id.clone(), store.clone()),
            chain_id,
            self_key,
            store,
            config,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn nonce_cache(&self) -> &NonceCache {
        &self.nonce_cache
    }

    /// Re-admit persisted own transactions after a restart.
    ///
    /// Returns the number admitted; transactions already consumed on chain are skipped.
    pub fn warm_start(&self) -> usize {
        let txs = match self.store.get_self_tx_pool(&self.chain_id) {
            Ok(txs) => txs,
            Err(e) => {
                tracing::warn!("Failed to load self pool for {}: {}", self.chain_id, e);
                return 0;
            }
        };

        let mut state = self.state.lock();
        let mut admitted = 0;
        for tx in txs {
            if tx.nonce > self.nonce_cache.get_nonce(&tx.sender) {
                state.insert_local(tx);
                admitted += 1;
            }
        }

        tracing::info!("Warm start for {}: {} local transactions restored", self.chain_id, admitted);
        admitted
    }

    /// Add one of this node's own transactions.
    ///
    /// The transaction is persisted first (best effort), then admitted only if
    /// its nonce is ahead of the sender's current nonce. Returns true if it is
    /// now queued.
    pub fn add_local(&self, tx: Transaction) -> bool {
        if let Err(e) = self.store.put_tx_into_self_pool(&self.chain_id, &tx) {
            tracing::warn!("Failed to persist local tx {} on {}: {}", tx.id, self.chain_id, e);
        }

        let mut state = self.state.lock();
        let current = self.nonce_cache.get_nonce(&tx.sender);
        if tx.nonce <= current {
            tracing::debug!(
                "Dropping local tx {}: nonce {} already consumed (current {})",
                tx.id,
                tx.nonce,
                current
            );
            return false;
        }

        state.insert_local(tx);
        true
    }

    /// Add a transaction heard from the network.
    ///
    /// Transactions signed by this node are routed to `add_local`. Others are
    /// admitted whatever their nonce; a gap is only logged. An id already
    /// queued as local is never replaced.
    pub fn add_remote(&self, tx: Transaction) -> bool {
        if tx.sender == self.self_key {
            return self.add_local(tx);
        }

        let mut state = self.state.lock();
        if state.is_local(&tx.id) {
            tracing::debug!("Ignoring remote tx {}: id is queued as local", tx.id);
            return false;
        }

        let current = self.nonce_cache.get_nonce(&tx.sender);
        if current.checked_add(1) != Some(tx.nonce) {
            tracing::debug!(
                "Remote tx {} from {} has nonce {}, expected {}",
                tx.id,
                tx.sender,
                tx.nonce,
                current.saturating_add(1)
            );
        }

        state.insert_remote(tx);
        true
    }

    /// Head of the local queue, only if it is exactly the sender's next nonce
    pub fn get_local_best_transaction(&self) -> Option<Transaction> {
        let state = self.state.lock();
        self.local_best(&state)
    }

    fn local_best(&self, state: &PoolState) -> Option<Transaction> {
        let head = state.locals.first()?;
        let tx = state.all.get(&head.txid)?;
        let current = self.nonce_cache.get_nonce(&tx.sender);

        if current.checked_add(1) == Some(tx.nonce) {
            Some(tx.clone())
        } else {
            None
        }
    }

    /// Local best if there is one, otherwise the highest-fee remote transaction
    pub fn get_best_transaction(&self) -> Option<Transaction> {
        let state = self.state.lock();
        if let Some(tx) = self.local_best(&state) {
            return Some(tx);
        }

        let head = state.remotes.last()?;
        state.all.get(&head.txid).cloned()
    }

    pub fn local_size(&self) -> usize {
        self.state.lock().locals.len()
    }

    pub fn remote_size(&self) -> usize {
        let state = self.state.lock();
        state.all.len() - state.locals.len()
    }

    pub fn size(&self) -> usize {
        self.state.lock().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().all.is_empty()
    }

    pub fn is_in_pool(&self, txid: &TxId) -> bool {
        self.state.lock().all.contains_key(txid)
    }

    pub fn get_transaction_by_txid(&self, txid: &TxId) -> Option<Transaction> {
        self.state.lock().all.get(txid).cloned()
    }

    /// Fee of the best remote transaction, 0 if there is none
    pub fn get_max_fee(&self) -> u64 {
        self.state.lock().remotes.last().map(|e| e.fee).unwrap_or(0)
    }

    /// Own transactions in queue order
    pub fn local_transactions(&self) -> Vec<Transaction> {
        let state = self.state.lock();
        state
            .locals
            .iter()
            .filter_map(|e| state.all.get(&e.txid).cloned())
            .collect()
    }

    /// Network transactions, highest fee first
    pub fn remote_transactions(&self) -> Vec<Transaction> {
        let state = self.state.lock();
        state
            .remotes
            .iter()
            .rev()
            .filter_map(|e| state.all.get(&e.txid).cloned())
            .collect()
    }

    pub fn remove_transaction(&self, txid: &TxId) -> Option<Transaction> {
        self.state.lock().remove(txid)
    }

    /// Drop transactions included in an accepted block and advance their
    /// senders' nonces. Local transactions whose nonce is now consumed
    /// (resubmissions of a confirmed nonce) are dropped as well.
    pub fn on_transactions_confirmed(&self, txs: &[Transaction]) {
        let mut state = self.state.lock();
        for tx in txs {
            state.remove(&tx.id);

            if tx.nonce > self.nonce_cache.get_nonce(&tx.sender) {
                self.nonce_cache.set_nonce(&tx.sender, tx.nonce);
            }
            self.unpersist(tx);
        }

        let stale: Vec<TxId> = state
            .locals
            .iter()
            .filter_map(|entry| state.all.get(&entry.txid))
            .filter(|tx| tx.nonce <= self.nonce_cache.get_nonce(&tx.sender))
            .map(|tx| tx.id)
            .collect();
        for txid in stale {
            if let Some(tx) = state.remove(&txid) {
                tracing::debug!("Dropping local tx {}: nonce {} already consumed", tx.id, tx.nonce);
                self.unpersist(&tx);
            }
        }
    }

    fn unpersist(&self, tx: &Transaction) {
        if tx.sender != self.self_key {
            return;
        }
        if let Err(e) = self.store.remove_tx_from_self_pool(&self.chain_id, &tx.id) {
            tracing::warn!("Failed to unpersist confirmed tx {}: {}", tx.id, e);
        }
    }

    /// Keep the pool bounded.
    ///
    /// Above `SLIM_DOWN_FACTOR` mutable ranges, evict down to half the current
    /// size: lowest-fee remote transactions first, then the local transactions
    /// furthest from execution (highest nonce). Returns the number evicted.
    pub fn try_slim_down_pool(&self) -> usize {
        let threshold = self.config.mutable_range.saturating_mul(SLIM_DOWN_FACTOR);
        let mut state = self.state.lock();
        let before = state.all.len();
        if before <= threshold {
            return 0;
        }

        let target = before / 2;
        while state.all.len() > target {
            let Some(entry) = state.remotes.pop_first() else {
                break;
            };
            state.all.remove(&entry.txid);
        }
        while state.all.len() > target {
            let Some(entry) = state.locals.pop_last() else {
                break;
            };
            state.all.remove(&entry.txid);
        }

        let evicted = before - state.all.len();
        tracing::info!(
            "Slimmed pool for {}: evicted {} of {} transactions",
            self.chain_id,
            evicted,
            before
        );
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pot_state::{MemoryStateStore, StoreError};
    use pot_types::AccountState;

    const ME: PubKey = PubKey::new([0xAA; 32]);
    const PEER: PubKey = PubKey::new([0xBB; 32]);

    fn chain() -> ChainId {
        ChainId::from("chat")
    }

    fn pool_with_nonce(nonce: u64) -> (TransactionPool, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        store.set_nonce(&chain(), &ME, nonce);
        let pool = TransactionPool::new(chain(), ME, store.clone(), PoolConfig::default());
        (pool, store)
    }

    fn tx(sender: PubKey, nonce: u64, fee: u64) -> Transaction {
        Transaction::new(sender, nonce, fee, 1_000 + nonce, vec![])
    }

    /// Accepts nonce reads but refuses every write
    struct ReadOnlyStore(MemoryStateStore);

    impl StateStore for ReadOnlyStore {
        fn get_account(&self, chain_id: &ChainId, pubkey: &PubKey) -> Result<Option<AccountState>, StoreError> {
            self.0.get_account(chain_id, pubkey)
        }

        fn put_account(&self, _: &ChainId, _: &PubKey, _: AccountState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read only".into()))
        }

        fn put_tx_into_self_pool(&self, _: &ChainId, _: &Transaction) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read only".into()))
        }

        fn get_self_tx_pool(&self, _: &ChainId) -> Result<Vec<Transaction>, StoreError> {
            Err(StoreError::Unavailable("read only".into()))
        }

        fn remove_tx_from_self_pool(&self, _: &ChainId, _: &TxId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read only".into()))
        }
    }

    #[test]
    fn test_add_local_and_best() {
        let (pool, store) = pool_with_nonce(5);
        let next = tx(ME, 6, 10);

        assert!(pool.add_local(next.clone()));
        assert_eq!(pool.get_local_best_transaction().unwrap().id, next.id);
        assert_eq!(store.self_pool_len(&chain()), 1);
    }

    #[test]
    fn test_nonce_gap_blocks_local_best() {
        let (pool, _) = pool_with_nonce(5);
        let next = tx(ME, 6, 10);
        pool.add_local(next.clone());

        // Block accepted elsewhere, tx still queued
        pool.nonce_cache().set_nonce(&ME, 6);
        assert!(pool.get_local_best_transaction().is_none());
        assert_eq!(pool.local_size(), 1);

        // A future nonce alone is not executable either
        let (pool, _) = pool_with_nonce(5);
        pool.add_local(tx(ME, 8, 10));
        assert!(pool.get_local_best_transaction().is_none());
    }

    #[test]
    fn test_stale_local_is_persisted_but_dropped() {
        let (pool, store) = pool_with_nonce(5);
        assert!(!pool.add_local(tx(ME, 5, 10)));
        assert!(!pool.add_local(tx(ME, 2, 10)));

        assert_eq!(pool.size(), 0);
        assert_eq!(store.self_pool_len(&chain()), 2);
    }

    #[test]
    fn test_persistence_failure_does_not_block_admission() {
        let inner = MemoryStateStore::new();
        inner.set_nonce(&chain(), &ME, 1);
        let pool = TransactionPool::new(chain(), ME, Arc::new(ReadOnlyStore(inner)), PoolConfig::default());

        let next = tx(ME, 2, 1);
        assert!(pool.add_local(next.clone()));
        assert_eq!(pool.get_best_transaction().unwrap().id, next.id);

        // Confirmation still cleans up despite the store refusing the delete
        pool.on_transactions_confirmed(&[next]);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.warm_start(), 0);
    }

    #[test]
    fn test_add_remote_is_permissive() {
        let (pool, _) = pool_with_nonce(0);

        // Nonce gap is only advisory
        assert!(pool.add_remote(tx(PEER, 42, 3)));
        assert_eq!(pool.remote_size(), 1);
        assert_eq!(pool.local_size(), 0);
    }

    #[test]
    fn test_add_remote_from_self_goes_local() {
        let (pool, store) = pool_with_nonce(0);
        let mine = tx(ME, 1, 3);

        assert!(pool.add_remote(mine.clone()));
        assert_eq!(pool.local_size(), 1);
        assert_eq!(pool.remote_size(), 0);
        assert_eq!(store.self_pool_len(&chain()), 1);
        assert_eq!(pool.get_local_best_transaction().unwrap().id, mine.id);
    }

    #[test]
    fn test_best_remote_is_max_fee() {
        let (pool, _) = pool_with_nonce(0);
        pool.add_remote(tx(PEER, 1, 5));
        pool.add_remote(tx(PEER, 2, 50));
        pool.add_remote(tx(PEER, 3, 20));

        assert_eq!(pool.get_max_fee(), 50);
        assert_eq!(pool.get_best_transaction().unwrap().fee, 50);

        let fees: Vec<u64> = pool.remote_transactions().iter().map(|t| t.fee).collect();
        assert_eq!(fees, vec![50, 20, 5]);
    }

    #[test]
    fn test_local_continuity_beats_remote_fee() {
        let (pool, _) = pool_with_nonce(5);
        let six = tx(ME, 6, 10);
        let seven = tx(ME, 7, 1);
        pool.add_local(seven.clone());
        pool.add_local(six.clone());
        pool.add_remote(tx(PEER, 1, 1_000));

        assert_eq!(pool.get_best_transaction().unwrap().id, six.id);

        let order: Vec<u64> = pool.local_transactions().iter().map(|t| t.nonce).collect();
        assert_eq!(order, vec![6, 7]);

        pool.on_transactions_confirmed(&[six]);
        assert_eq!(pool.get_best_transaction().unwrap().id, seven.id);
    }

    #[test]
    fn test_confirmed_resubmission_does_not_block_queue() {
        let (pool, store) = pool_with_nonce(5);
        let older = Transaction::new(ME, 6, 10, 100, b"old".to_vec());
        let newer = Transaction::new(ME, 6, 10, 200, b"new".to_vec());
        let seven = Transaction::new(ME, 7, 10, 300, vec![]);
        pool.add_local(older.clone());
        pool.add_local(newer.clone());
        pool.add_local(seven.clone());

        // Same nonce, the more recent one wins
        assert_eq!(pool.get_local_best_transaction().unwrap().id, newer.id);

        pool.on_transactions_confirmed(&[newer]);
        assert_eq!(pool.nonce_cache().get_nonce(&ME), 6);
        assert!(!pool.is_in_pool(&older.id));
        assert_eq!(pool.local_size(), 1);
        assert_eq!(pool.get_local_best_transaction().unwrap().id, seven.id);
        assert_eq!(store.self_pool_len(&chain()), 1);
    }

    #[test]
    fn test_remote_cannot_replace_local_id() {
        let (pool, _) = pool_with_nonce(0);
        let mine = tx(ME, 1, 1);
        pool.add_local(mine.clone());

        let mut forged = tx(PEER, 1, 99);
        forged.id = mine.id;
        assert!(!pool.add_remote(forged));

        assert_eq!(pool.local_size(), 1);
        assert_eq!(pool.remote_size(), 0);
        assert_eq!(pool.get_transaction_by_txid(&mine.id).unwrap().sender, ME);
    }

    #[test]
    fn test_concurrent_admission_and_confirmation() {
        let (pool, _) = pool_with_nonce(0);
        let pool = Arc::new(pool);

        let adder = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                for n in 1..=200 {
                    pool.add_local(tx(ME, n, 1));
                }
            })
        };
        for n in 1..=200 {
            pool.on_transactions_confirmed(&[tx(ME, n, 1)]);
        }
        adder.join().unwrap();

        // Nothing queued may be at or below the consumed nonce
        let current = pool.nonce_cache().get_nonce(&ME);
        assert_eq!(current, 200);
        assert!(pool.local_transactions().iter().all(|t| t.nonce > current));
        assert_eq!(pool.local_size(), 0);
    }

    #[test]
    fn test_falls_back_to_remote_on_gap() {
        let (pool, _) = pool_with_nonce(5);
        pool.add_local(tx(ME, 9, 10));
        let remote = tx(PEER, 1, 7);
        pool.add_remote(remote.clone());

        assert_eq!(pool.get_best_transaction().unwrap().id, remote.id);
    }

    #[test]
    fn test_duplicates_are_deduplicated() {
        let (pool, _) = pool_with_nonce(0);
        let remote = tx(PEER, 1, 7);
        pool.add_remote(remote.clone());
        pool.add_remote(remote.clone());
        let mine = tx(ME, 1, 1);
        pool.add_local(mine.clone());
        pool.add_local(mine.clone());

        assert_eq!(pool.size(), 2);
        assert_eq!(pool.local_size(), 1);
        assert_eq!(pool.remote_size(), 1);
        assert!(pool.is_in_pool(&remote.id));
        assert_eq!(pool.get_transaction_by_txid(&mine.id).unwrap().nonce, 1);
    }

    #[test]
    fn test_sizes_add_up() {
        let (pool, _) = pool_with_nonce(0);
        for n in 1..=5 {
            pool.add_local(tx(ME, n, 1));
            pool.add_remote(tx(PEER, n, n));
            assert_eq!(pool.local_size() + pool.remote_size(), pool.size());
        }

        let removed = pool.remove_transaction(&tx(PEER, 3, 3).id).unwrap();
        assert_eq!(removed.fee, 3);
        assert_eq!(pool.local_size() + pool.remote_size(), pool.size());
        assert_eq!(pool.size(), 9);
    }

    #[test]
    fn test_slim_down_evicts_cheap_remotes_first() {
        let store = Arc::new(MemoryStateStore::new());
        let pool = TransactionPool::new(chain(), ME, store, PoolConfig { mutable_range: 2 });

        // Threshold is 6
        for n in 1..=4 {
            pool.add_local(tx(ME, n, 1));
        }
        for fee in 1..=4 {
            pool.add_remote(tx(PEER, fee, fee * 10));
        }
        assert_eq!(pool.size(), 8);

        assert_eq!(pool.try_slim_down_pool(), 4);
        assert_eq!(pool.size(), 4);
        assert_eq!(pool.local_size(), 4);
        assert_eq!(pool.remote_size(), 0);

        // At or below threshold nothing happens
        assert_eq!(pool.try_slim_down_pool(), 0);
    }

    #[test]
    fn test_slim_down_keeps_lowest_local_nonces() {
        let store = Arc::new(MemoryStateStore::new());
        let pool = TransactionPool::new(chain(), ME, store, PoolConfig { mutable_range: 1 });

        for n in 1..=6 {
            pool.add_local(tx(ME, n, 1));
        }
        pool.add_remote(tx(PEER, 1, 99));

        assert_eq!(pool.try_slim_down_pool(), 4);
        let nonces: Vec<u64> = pool.local_transactions().iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
        assert_eq!(pool.remote_size(), 0);
    }

    #[test]
    fn test_warm_start_restores_pending_locals() {
        let (pool, store) = pool_with_nonce(3);
        for n in 2..=5 {
            pool.add_local(tx(ME, n, 1));
        }

        let restarted = TransactionPool::new(chain(), ME, store, PoolConfig::default());
        assert_eq!(restarted.warm_start(), 2);
        assert_eq!(restarted.local_size(), 2);
        assert_eq!(restarted.get_local_best_transaction().unwrap().nonce, 4);
    }
}
