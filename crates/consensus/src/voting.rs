//! Fork-choice vote tally
//!
//! Peers vote for the block hash they consider the tip of a chain. The pool
//! counts votes per (chain, block hash) and ranks them by count, then height.

use parking_lot::Mutex;
use pot_types::{BlockHash, ChainId};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Tally for one candidate block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub block_hash: BlockHash,
    pub block_number: u64,
    pub count: u64,
}

impl Vote {
    pub fn new(block_hash: BlockHash, block_number: u64) -> Self {
        Self {
            block_hash,
            block_number,
            count: 0,
        }
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// Fork-choice order: more votes first, then higher block first.
    /// The hash only breaks remaining ties so the ranking is deterministic.
    pub fn fork_choice_cmp(&self, other: &Self) -> Ordering {
        other
            .count
            .cmp(&self.count)
            .then_with(|| other.block_number.cmp(&self.block_number))
            .then_with(|| self.block_hash.cmp(&other.block_hash))
    }
}

/// Vote tally for every chain this node follows.
///
/// One lock covers all chains.
#[derive(Default)]
pub struct VotingPool {
    votes: Mutex<HashMap<ChainId, HashMap<BlockHash, Vote>>>,
}

impl VotingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one vote for `block_hash` on `chain_id`
    pub fn put_into_voting_pool(&self, chain_id: &ChainId, block_hash: BlockHash, block_number: u64) {
        let mut votes = self.votes.lock();
        votes
            .entry(chain_id.clone())
            .or_default()
            .entry(block_hash)
            .or_insert_with(|| Vote::new(block_hash, block_number))
            .increment();
    }

    /// Forget every vote for `chain_id`
    pub fn remove_all_votes(&self, chain_id: &ChainId) {
        if let Some(removed) = self.votes.lock().remove(chain_id) {
            tracing::debug!("Cleared {} vote candidates for chain {}", removed.len(), chain_id);
        }
    }

    /// Votes ranked for fork choice, `None` if there are none
    pub fn get_sorted_votes(&self, chain_id: &ChainId) -> Option<Vec<Vote>> {
        let votes = self.votes.lock();
        let chain_votes = votes.get(chain_id)?;
        if chain_votes.is_empty() {
            return None;
        }

        Some(ranked(chain_votes.values().cloned().collect()))
    }

    /// Rank and clear the votes for `chain_id` in one step, so no vote cast
    /// in between is dropped unseen
    pub fn take_sorted_votes(&self, chain_id: &ChainId) -> Option<Vec<Vote>> {
        let chain_votes = self.votes.lock().remove(chain_id)?;
        tracing::debug!("Cleared {} vote candidates for chain {}", chain_votes.len(), chain_id);
        if chain_votes.is_empty() {
            return None;
        }

        Some(ranked(chain_votes.into_values().collect()))
    }

    /// Top-ranked candidate
    pub fn best_vote(&self, chain_id: &ChainId) -> Option<Vote> {
        let votes = self.votes.lock();
        votes
            .get(chain_id)?
            .values()
            .min_by(|a, b| a.fork_choice_cmp(b))
            .cloned()
    }

    /// Votes counted so far for one candidate (0 if unknown)
    pub fn vote_count(&self, chain_id: &ChainId, block_hash: &BlockHash) -> u64 {
        self.votes
            .lock()
            .get(chain_id)
            .and_then(|chain_votes| chain_votes.get(block_hash))
            .map(|vote| vote.count)
            .unwrap_or(0)
    }
}

fn ranked(mut votes: Vec<Vote>) -> Vec<Vote> {
    votes.sort_by(Vote::fork_choice_cmp);
    votes
}
