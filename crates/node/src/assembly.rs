//! Block assembly and verification on top of the PoT engine

use pot_consensus::ProofOfTransaction;
use pot_txpool::TransactionPool;
use pot_types::{hash, BlockHash, PubKey, Transaction, TxId, HASH_LEN};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Number of ancestors the base-target retarget looks back
const RETARGET_LOOKBACK: usize = 3;

/// Consensus-relevant block fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
    /// Unix seconds
    pub timestamp: u64,
    pub base_target: U256,
    pub cumulative_difficulty: U256,
    pub generation_signature: [u8; HASH_LEN],
    pub miner: PubKey,
}

impl BlockHeader {
    pub fn genesis(pot: &ProofOfTransaction, timestamp: u64) -> Self {
        let mut header = Self {
            number: 0,
            hash: BlockHash::default(),
            previous_hash: BlockHash::default(),
            timestamp,
            base_target: pot.genesis_base_target(),
            cumulative_difficulty: U256::zero(),
            generation_signature: [0u8; HASH_LEN],
            miner: PubKey::default(),
        };
        header.hash = header.compute_hash(None);
        header
    }

    /// Hash over the header fields and the included transaction id
    pub fn compute_hash(&self, txid: Option<&TxId>) -> BlockHash {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.number.to_be_bytes());
        buf.extend_from_slice(self.previous_hash.as_ref());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&u256_bytes(self.base_target));
        buf.extend_from_slice(&u256_bytes(self.cumulative_difficulty));
        buf.extend_from_slice(&self.generation_signature);
        buf.extend_from_slice(self.miner.as_ref());
        if let Some(txid) = txid {
            buf.extend_from_slice(txid.as_ref());
        }
        BlockHash::new(hash(&buf))
    }
}

fn u256_bytes(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// A block ready to be announced: header plus at most one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockCandidate {
    pub header: BlockHeader,
    pub transaction: Option<Transaction>,
}

/// Seconds between `tip` and its third ancestor, 0 without enough history.
/// `history` is oldest first and ends with `tip`.
fn recent_span(history: &[BlockHeader]) -> u64 {
    match history.len().checked_sub(RETARGET_LOOKBACK + 1) {
        Some(idx) => {
            let tip = &history[history.len() - 1];
            tip.timestamp.saturating_sub(history[idx].timestamp)
        }
        None => 0,
    }
}

/// Build the next block on top of `history` for `miner`.
///
/// The timestamp is the earliest moment the miner's hit is under target.
pub fn assemble_candidate(
    pot: &ProofOfTransaction,
    pool: &TransactionPool,
    history: &[BlockHeader],
    miner: &PubKey,
    power: u64,
) -> Option<BlockCandidate> {
    let previous = history.last()?;

    let generation_signature = pot.generation_signature(&previous.generation_signature, miner);
    let hit = pot.hit(&generation_signature);
    let base_target = pot.required_base_target(previous.base_target, previous.number, recent_span(history));
    let interval = pot.mining_time_interval(hit, base_target, power);
    let transaction = pool.get_best_transaction();

    let mut header = BlockHeader {
        number: previous.number + 1,
        hash: BlockHash::default(),
        previous_hash: previous.hash,
        timestamp: previous.timestamp + interval,
        base_target,
        cumulative_difficulty: pot.cumulative_difficulty(previous.cumulative_difficulty, base_target),
        generation_signature,
        miner: *miner,
    };
    header.hash = header.compute_hash(transaction.as_ref().map(|tx| &tx.id));

    tracing::debug!(
        "Assembled block {} for {}: wait {}s, tx {:?}",
        header.number,
        miner,
        interval,
        transaction.as_ref().map(|tx| tx.id)
    );

    Some(BlockCandidate { header, transaction })
}

/// Check a received candidate against our view of the chain
pub fn verify_candidate(
    pot: &ProofOfTransaction,
    history: &[BlockHeader],
    candidate: &BlockCandidate,
    power: u64,
) -> bool {
    let Some(previous) = history.last() else {
        return false;
    };
    let header = &candidate.header;

    if header.number != previous.number + 1 || header.previous_hash != previous.hash {
        return false;
    }
    if header.generation_signature != pot.generation_signature(&previous.generation_signature, &header.miner) {
        return false;
    }
    if header.base_target != pot.required_base_target(previous.base_target, previous.number, recent_span(history)) {
        return false;
    }
    if header.cumulative_difficulty != pot.cumulative_difficulty(previous.cumulative_difficulty, header.base_target) {
        return false;
    }
    if header.hash != header.compute_hash(candidate.transaction.as_ref().map(|tx| &tx.id)) {
        return false;
    }
    let Some(interval) = header.timestamp.checked_sub(previous.timestamp) else {
        return false;
    };

    let hit = pot.hit(&header.generation_signature);
    pot.verify_hit(hit, header.base_target, power, interval)
}
