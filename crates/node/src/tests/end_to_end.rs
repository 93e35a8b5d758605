//! Whole-node flows: pool, assembly, voting and peers working together

use crate::{ChainConfig, ChainManager};
use pot_state::{MemoryStateStore, SledStateStore, StateStore};
use pot_types::{ChainId, ManualClock, PubKey, Transaction};
use std::sync::Arc;

const SELF_KEY: PubKey = PubKey::new([0xA1; 32]);
const PEER: PubKey = PubKey::new([0xB2; 32]);

fn chat() -> ChainId {
    ChainId::from("chat")
}

fn chat_config(mutable_range: usize) -> ChainConfig {
    ChainConfig {
        name: "chat".to_string(),
        average_block_time: 60,
        mutable_range,
        power: 4,
        ..ChainConfig::default()
    }
}

fn remote(seed: u8, nonce: u64, fee: u64) -> Transaction {
    Transaction::new(PubKey::new([seed; 32]), nonce, fee, 0, vec![seed])
}

#[test]
fn test_local_transactions_mined_in_nonce_order() {
    let store = Arc::new(MemoryStateStore::new());
    store.set_nonce(&chat(), &SELF_KEY, 5);

    let mut manager = ChainManager::new(SELF_KEY, store.clone(), Arc::new(ManualClock::new(0)));
    let chain = manager.add_chain(&chat_config(36)).unwrap();
    assert!(chain.start(&[PEER], 1_000));

    let cheap_first = Transaction::new(SELF_KEY, 6, 10, 0, b"first".to_vec());
    let cheap_second = Transaction::new(SELF_KEY, 7, 1, 0, b"second".to_vec());
    let rich_remote = remote(0x33, 1, 1_000);
    assert!(chain.pool().add_local(cheap_second.clone()));
    assert!(chain.pool().add_local(cheap_first.clone()));
    assert!(chain.pool().add_remote(rich_remote.clone()));
    assert_eq!(store.self_pool_len(&chat()), 2);

    // Own transactions go first regardless of fee
    assert_eq!(chain.pool().get_best_transaction(), Some(cheap_first.clone()));

    let mut included = Vec::new();
    for _ in 0..3 {
        let candidate = chain.try_assemble().unwrap();
        assert!(chain.verify(&candidate, chain.power()));

        manager.vote(&chat(), &candidate.header);
        let winner = manager.resolve_fork(&chat()).unwrap();
        assert_eq!(winner.block_hash, candidate.header.hash);

        chain.accept(&candidate);
        included.extend(candidate.transaction);
    }

    assert_eq!(included, vec![cheap_first, cheap_second, rich_remote]);
    assert!(chain.pool().is_empty());
    assert_eq!(chain.pool().nonce_cache().get_nonce(&SELF_KEY), 7);
    assert_eq!(store.self_pool_len(&chat()), 0);
    assert_eq!(chain.tip().unwrap().number, 3);

    // Nothing left to include
    let empty = chain.try_assemble().unwrap();
    assert!(empty.transaction.is_none());
    assert!(chain.verify(&empty, chain.power()));
}

#[test]
fn test_gap_blocks_local_queue() {
    let store = Arc::new(MemoryStateStore::new());
    store.set_nonce(&chat(), &SELF_KEY, 5);

    let mut manager = ChainManager::new(SELF_KEY, store, Arc::new(ManualClock::new(0)));
    let chain = manager.add_chain(&chat_config(36)).unwrap();
    assert!(chain.start(&[PEER], 1_000));

    assert!(chain.pool().add_local(Transaction::new(SELF_KEY, 7, 50, 0, Vec::new())));
    let fallback = remote(0x44, 9, 2);
    chain.pool().add_remote(fallback.clone());

    // Nonce 6 is missing, so the remote transaction is mined instead
    let candidate = chain.try_assemble().unwrap();
    assert_eq!(candidate.transaction, Some(fallback));
    chain.accept(&candidate);
    assert_eq!(chain.pool().local_size(), 1);
    assert!(chain.pool().get_best_transaction().is_none());
}

#[test]
fn test_accept_slims_crowded_pool() {
    let mut manager = ChainManager::new(
        SELF_KEY,
        Arc::new(MemoryStateStore::new()),
        Arc::new(ManualClock::new(0)),
    );
    let chain = manager.add_chain(&chat_config(2)).unwrap();
    assert!(chain.start(&[PEER], 1_000));

    for fee in 1..=8u64 {
        chain.pool().add_remote(remote(fee as u8, 1, fee));
    }

    let candidate = chain.try_assemble().unwrap();
    assert_eq!(candidate.transaction.as_ref().map(|tx| tx.fee), Some(8));
    chain.accept(&candidate);

    // 7 left is over 3 * 2, so half are kept, richest first
    let fees: Vec<u64> = chain.pool().remote_transactions().iter().map(|tx| tx.fee).collect();
    assert_eq!(fees, vec![7, 6, 5]);
}

#[test]
fn test_local_pool_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = Transaction::new(SELF_KEY, 1, 3, 0, b"one".to_vec());
    let second = Transaction::new(SELF_KEY, 2, 3, 0, b"two".to_vec());

    {
        let store = Arc::new(SledStateStore::open(dir.path()).unwrap());
        let mut manager = ChainManager::new(SELF_KEY, store.clone(), Arc::new(ManualClock::new(0)));
        let chain = manager.add_chain(&chat_config(36)).unwrap();
        assert!(chain.start(&[PEER], 1_000));
        assert!(chain.pool().add_local(first.clone()));
        assert!(chain.pool().add_local(second.clone()));
        store.flush().unwrap();
    }

    let store = Arc::new(SledStateStore::open(dir.path()).unwrap());
    let mut manager = ChainManager::new(SELF_KEY, store.clone(), Arc::new(ManualClock::new(0)));
    let chain = manager.add_chain(&chat_config(36)).unwrap();
    assert!(chain.start(&[PEER], 1_000));

    assert_eq!(chain.pool().local_transactions(), vec![first.clone(), second]);
    assert_eq!(chain.pool().get_best_transaction(), Some(first.clone()));

    let candidate = chain.try_assemble().unwrap();
    chain.accept(&candidate);
    assert_eq!(store.get_self_tx_pool(&chat()).unwrap().len(), 1);
}

#[test]
fn test_block_peer_cooldown_follows_clock() {
    let clock = Arc::new(ManualClock::new(10_000));
    let mut manager = ChainManager::new(SELF_KEY, Arc::new(MemoryStateStore::new()), clock.clone());
    let chain = manager.add_chain(&chat_config(36)).unwrap();
    assert!(chain.start(&[PEER], 1_000));

    assert_eq!(chain.peers().pop_up_optimal_block_peer(), Some(PEER));
    assert_eq!(chain.peers().get_peer_visit_time(&PEER), 10_000);

    // Asked too recently, and a single peer cannot fill the candidate set
    // so the cooldown is waived on refill
    assert_eq!(chain.peers().pop_up_optimal_block_peer(), Some(PEER));

    clock.advance(61);
    assert_eq!(chain.peers().pop_up_optimal_block_peer(), Some(PEER));
    assert_eq!(chain.peers().get_peer_visit_time(&PEER), 10_061);
}
