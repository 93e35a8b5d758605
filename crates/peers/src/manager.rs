//! Peer manager - bounded candidate sets with a revisit cooldown

use parking_lot::Mutex;
use pot_types::{ChainId, Clock, PeerId, SystemClock};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// Size of the block and tx candidate sets
pub const DEFAULT_CANDIDATE_CAPACITY: usize = 8;

/// Refills attempted by one pop before giving up on cooling peers
const MAX_REFILLS_PER_POP: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeerManagerConfig {
    /// Maximum size of each candidate set
    pub candidate_capacity: usize,
    /// Maximum size of the priority (mutable range) window
    pub mutable_range: usize,
    /// A peer is not asked again until this many seconds have passed
    pub average_block_time: u64,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            candidate_capacity: DEFAULT_CANDIDATE_CAPACITY,
            mutable_range: 36,
            average_block_time: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidates {
    Block,
    Tx,
}

struct PeerState<R> {
    all_peers: BTreeSet<PeerId>,
    /// Oldest at the front
    priority_peers: VecDeque<PeerId>,
    /// Last time each peer was served from, unix seconds
    peer_info: HashMap<PeerId, u64>,
    block_peers: BTreeSet<PeerId>,
    tx_peers: BTreeSet<PeerId>,
    /// Scratch buffer for sampling `all_peers`
    random_peer_list: Vec<PeerId>,
    rng: R,
    initialized: bool,
}

impl<R: Rng> PeerState<R> {
    fn candidates(&mut self, which: Candidates) -> &mut BTreeSet<PeerId> {
        match which {
            Candidates::Block => &mut self.block_peers,
            Candidates::Tx => &mut self.tx_peers,
        }
    }

    /// Refill an empty candidate set: half from the priority window, the
    /// rest from a fresh sample of all peers. Returns true if it reached
    /// full capacity.
    fn refill(&mut self, which: Candidates, capacity: usize) -> bool {
        let from_priority = self
            .priority_peers
            .iter()
            .copied()
            .choose_multiple(&mut self.rng, capacity / 2);

        self.random_peer_list.clear();
        self.random_peer_list.extend(
            self.all_peers
                .iter()
                .copied()
                .choose_multiple(&mut self.rng, capacity),
        );

        let set = match which {
            Candidates::Block => &mut self.block_peers,
            Candidates::Tx => &mut self.tx_peers,
        };
        set.extend(from_priority);
        for peer in self.random_peer_list.drain(..) {
            if set.len() >= capacity {
                break;
            }
            set.insert(peer);
        }

        set.len() >= capacity
    }

    /// Remove and return a uniformly chosen candidate
    fn take_random(&mut self, which: Candidates) -> Option<PeerId> {
        let set = match which {
            Candidates::Block => &mut self.block_peers,
            Candidates::Tx => &mut self.tx_peers,
        };
        let peer = set.iter().copied().choose(&mut self.rng)?;
        set.remove(&peer);
        Some(peer)
    }

    fn visit_time(&self, peer: &PeerId) -> u64 {
        self.peer_info.get(peer).copied().unwrap_or(0)
    }
}

/// Known peers of one chain and the candidates picked from them.
///
/// Every operation runs under one lock per instance.
pub struct PeerManager<R = StdRng> {
    chain_id: ChainId,
    config: PeerManagerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PeerState<R>>,
}

impl PeerManager<StdRng> {
    /// Create a manager using wall-clock time and an entropy-seeded RNG
    pub fn new(chain_id: ChainId, config: PeerManagerConfig) -> Self {
        Self::with_clock(chain_id, config, Arc::new(SystemClock))
    }

    /// Create a manager reading time from `clock`
    pub fn with_clock(chain_id: ChainId, config: PeerManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(chain_id, config, clock, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> PeerManager<R> {
    pub fn with_rng(chain_id: ChainId, config: PeerManagerConfig, clock: Arc<dyn Clock>, rng: R) -> Self {
        Self {
            chain_id,
            config,
            clock,
            state: Mutex::new(PeerState {
                all_peers: BTreeSet::new(),
                priority_peers: VecDeque::new(),
                peer_info: HashMap::new(),
                block_peers: BTreeSet::new(),
                tx_peers: BTreeSet::new(),
                random_peer_list: Vec::new(),
                rng,
                initialized: false,
            }),
        }
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    /// Adopt the initial peer sets and seed both candidate sets from the
    /// priority peers. Fails without touching state if either set is empty.
    pub fn init(
        &self,
        all_peers: impl IntoIterator<Item = PeerId>,
        priority_peers: impl IntoIterator<Item = PeerId>,
    ) -> bool {
        let all: BTreeSet<PeerId> = all_peers.into_iter().collect();
        let mut priority: VecDeque<PeerId> = VecDeque::new();
        for peer in priority_peers {
            if !priority.contains(&peer) {
                priority.push_back(peer);
            }
        }

        if all.is_empty() || priority.is_empty() {
            tracing::warn!(
                "Peer manager for {} not initialized: {} peers, {} priority peers",
                self.chain_id,
                all.len(),
                priority.len()
            );
            return false;
        }

        // Keep the most recent end of the window
        while priority.len() > self.config.mutable_range.max(1) {
            priority.pop_front();
        }

        let capacity = self.config.candidate_capacity;
        let mut state = self.state.lock();
        let state = &mut *state;

        state.all_peers = all;
        state.all_peers.extend(priority.iter().copied());
        state.peer_info = state.all_peers.iter().map(|peer| (*peer, 0)).collect();
        state.priority_peers = priority;

        state.block_peers = state
            .priority_peers
            .iter()
            .copied()
            .choose_multiple(&mut state.rng, capacity)
            .into_iter()
            .collect();
        state.tx_peers = state
            .priority_peers
            .iter()
            .copied()
            .choose_multiple(&mut state.rng, capacity)
            .into_iter()
            .collect();
        state.initialized = true;

        tracing::info!(
            "Peer manager for {} initialized: {} peers, {} priority peers",
            self.chain_id,
            state.all_peers.len(),
            state.priority_peers.len()
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// A peer that just served a new block: most recent end of the window,
    /// evicting the oldest entry if full.
    pub fn add_new_block_peer(&self, peer: PeerId) {
        let window = self.config.mutable_range;
        let mut state = self.state.lock();
        state.all_peers.insert(peer);

        if window == 0 {
            return;
        }
        if let Some(pos) = state.priority_peers.iter().position(|p| *p == peer) {
            state.priority_peers.remove(pos);
        }
        while state.priority_peers.len() >= window {
            state.priority_peers.pop_front();
        }
        state.priority_peers.push_back(peer);
    }

    /// A peer that served a historical block: only fills spare window room
    pub fn add_old_block_peer(&self, peer: PeerId) {
        let mut state = self.state.lock();
        state.all_peers.insert(peer);

        if state.priority_peers.len() < self.config.mutable_range && !state.priority_peers.contains(&peer) {
            state.priority_peers.push_back(peer);
        }
    }

    /// Next peer to ask for blocks, skipping peers asked within the last
    /// average block time
    pub fn pop_up_optimal_block_peer(&self) -> Option<PeerId> {
        self.pop_up_optimal(Candidates::Block)
    }

    /// Next peer to ask for transactions, with the same cooldown
    pub fn pop_up_optimal_tx_peer(&self) -> Option<PeerId> {
        self.pop_up_optimal(Candidates::Tx)
    }

    fn pop_up_optimal(&self, which: Candidates) -> Option<PeerId> {
        let capacity = self.config.candidate_capacity;
        let now = self.clock.now_secs();
        let mut state = self.state.lock();

        let mut cooldown = true;
        let mut refills = 0;
        loop {
            if state.candidates(which).is_empty() {
                if refills == MAX_REFILLS_PER_POP {
                    break;
                }
                refills += 1;
                // Too few peers to wait on any of them
                cooldown = state.refill(which, capacity);
            }

            let peer = state.take_random(which)?;
            let visited = state.visit_time(&peer);
            if !cooldown || visited == 0 || now.saturating_sub(visited) > self.config.average_block_time {
                state.peer_info.insert(peer, now);
                return Some(peer);
            }
        }

        tracing::debug!("All {:?} peer candidates for {} are cooling down", which, self.chain_id);
        None
    }

    /// Any block candidate, no cooldown
    pub fn get_block_peer_randomly(&self) -> Option<PeerId> {
        self.get_peer_randomly(Candidates::Block)
    }

    /// Any tx candidate, no cooldown
    pub fn get_tx_peer_randomly(&self) -> Option<PeerId> {
        self.get_peer_randomly(Candidates::Tx)
    }

    fn get_peer_randomly(&self, which: Candidates) -> Option<PeerId> {
        let capacity = self.config.candidate_capacity;
        let mut state = self.state.lock();
        if state.candidates(which).is_empty() {
            state.refill(which, capacity);
        }
        state.take_random(which)
    }

    /// Offer a block candidate; dropped if the set is full
    pub fn add_block_peer(&self, peer: PeerId) -> bool {
        self.add_candidate(Candidates::Block, peer)
    }

    /// Offer a tx candidate; dropped if the set is full
    pub fn add_tx_peer(&self, peer: PeerId) -> bool {
        self.add_candidate(Candidates::Tx, peer)
    }

    fn add_candidate(&self, which: Candidates, peer: PeerId) -> bool {
        let capacity = self.config.candidate_capacity;
        let mut state = self.state.lock();
        let set = state.candidates(which);
        if set.len() >= capacity {
            return false;
        }
        set.insert(peer)
    }

    /// Last time `peer` was served from, 0 if never
    pub fn get_peer_visit_time(&self, peer: &PeerId) -> u64 {
        self.state.lock().visit_time(peer)
    }

    /// Stamp `peer` as served from now
    pub fn update_visit_time(&self, peer: &PeerId) {
        let now = self.clock.now_secs();
        self.state.lock().peer_info.insert(*peer, now);
    }

    /// Uniform pick from the priority window
    pub fn get_mutable_range_peer_randomly(&self) -> Option<PeerId> {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.priority_peers.iter().copied().choose(&mut state.rng)
    }

    pub fn all_peer_count(&self) -> usize {
        self.state.lock().all_peers.len()
    }

    pub fn priority_peer_count(&self) -> usize {
        self.state.lock().priority_peers.len()
    }

    pub fn block_peers(&self) -> Vec<PeerId> {
        self.state.lock().block_peers.iter().copied().collect()
    }

    pub fn tx_peers(&self) -> Vec<PeerId> {
        self.state.lock().tx_peers.iter().copied().collect()
    }

    /// Priority window, oldest first
    pub fn priority_peers(&self) -> Vec<PeerId> {
        self.state.lock().priority_peers.iter().copied().collect()
    }
}
