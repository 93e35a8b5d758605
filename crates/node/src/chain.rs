//! Per-chain state and the manager that owns it

use crate::assembly::{assemble_candidate, verify_candidate, BlockCandidate, BlockHeader};
use crate::config::{ChainConfig, ConfigError};
use parking_lot::Mutex;
use pot_consensus::{PotConfig, ProofOfTransaction, Vote, VotingPool};
use pot_peers::{PeerManager, PeerManagerConfig};
use pot_state::StateStore;
use pot_txpool::{PoolConfig, TransactionPool};
use pot_types::{ChainId, Clock, PeerId, PubKey};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Headers kept for retargeting: the tip and its three ancestors
const HISTORY_LEN: usize = 4;

/// Tip plus a few ancestors, oldest first
#[derive(Default)]
struct RecentHeaders(VecDeque<BlockHeader>);

impl RecentHeaders {
    fn push(&mut self, header: BlockHeader) {
        if self.0.len() == HISTORY_LEN {
            self.0.pop_front();
        }
        self.0.push_back(header);
    }

    fn to_vec(&self) -> Vec<BlockHeader> {
        self.0.iter().cloned().collect()
    }

    fn tip(&self) -> Option<&BlockHeader> {
        self.0.back()
    }
}

/// Everything this node tracks for one chain
pub struct ChainContext {
    chain_id: ChainId,
    self_key: PubKey,
    power: u64,
    pot: ProofOfTransaction,
    pool: TransactionPool,
    peers: PeerManager,
    headers: Mutex<RecentHeaders>,
}

impl ChainContext {
    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn pot(&self) -> &ProofOfTransaction {
        &self.pot
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn peers(&self) -> &PeerManager {
        &self.peers
    }

    pub fn power(&self) -> u64 {
        self.power
    }

    /// Restore the local pool, seed peers and start from a genesis header.
    ///
    /// Returns false if the peer manager could not be initialized; the chain
    /// must not be mined until it is.
    pub fn start(&self, bootstrap: &[PeerId], genesis_timestamp: u64) -> bool {
        let restored = self.pool.warm_start();
        self.headers
            .lock()
            .push(BlockHeader::genesis(&self.pot, genesis_timestamp));

        let ready = self.peers.init(bootstrap.iter().copied(), bootstrap.iter().copied());
        tracing::info!(
            "Chain {} started: {} local txs restored, peers ready: {}",
            self.chain_id,
            restored,
            ready
        );
        ready
    }

    pub fn tip(&self) -> Option<BlockHeader> {
        self.headers.lock().tip().cloned()
    }

    /// Our next block on the current tip
    pub fn try_assemble(&self) -> Option<BlockCandidate> {
        let history = self.headers.lock().to_vec();
        assemble_candidate(&self.pot, &self.pool, &history, &self.self_key, self.power)
    }

    /// Validate a candidate mined with `power` on top of the current tip
    pub fn verify(&self, candidate: &BlockCandidate, power: u64) -> bool {
        let history = self.headers.lock().to_vec();
        verify_candidate(&self.pot, &history, candidate, power)
    }

    /// Extend the chain and drop the included transaction from the pool
    pub fn accept(&self, candidate: &BlockCandidate) {
        self.headers.lock().push(candidate.header.clone());

        if let Some(tx) = &candidate.transaction {
            self.pool.on_transactions_confirmed(std::slice::from_ref(tx));
        }
        self.pool.try_slim_down_pool();

        if candidate.header.miner != self.self_key {
            self.peers.add_new_block_peer(candidate.header.miner);
        }
    }
}

/// Owns the per-chain contexts and the vote tally shared by all chains
pub struct ChainManager {
    self_key: PubKey,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    voting: VotingPool,
    chains: HashMap<ChainId, Arc<ChainContext>>,
}

impl ChainManager {
    pub fn new(self_key: PubKey, store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            self_key,
            store,
            clock,
            voting: VotingPool::new(),
            chains: HashMap::new(),
        }
    }

    pub fn self_key(&self) -> &PubKey {
        &self.self_key
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a chain from its configuration
    pub fn add_chain(&mut self, config: &ChainConfig) -> Result<Arc<ChainContext>, ConfigError> {
        let chain_id = ChainId::from(config.name.as_str());
        if self.chains.contains_key(&chain_id) {
            return Err(ConfigError::DuplicateChain(config.name.clone()));
        }
        if config.average_block_time == 0 {
            return Err(ConfigError::InvalidBlockTime(config.name.clone()));
        }

        let pot = ProofOfTransaction::new(PotConfig {
            average_block_time: config.average_block_time,
        });
        let pool = TransactionPool::new(
            chain_id.clone(),
            self.self_key,
            self.store.clone(),
            PoolConfig {
                mutable_range: config.mutable_range,
            },
        );
        let peers = PeerManager::with_clock(
            chain_id.clone(),
            PeerManagerConfig {
                candidate_capacity: config.candidate_capacity,
                mutable_range: config.mutable_range,
                average_block_time: config.average_block_time,
            },
            self.clock.clone(),
        );

        let context = Arc::new(ChainContext {
            chain_id: chain_id.clone(),
            self_key: self.self_key,
            power: config.power,
            pot,
            pool,
            peers,
            headers: Mutex::new(RecentHeaders::default()),
        });
        self.chains.insert(chain_id, context.clone());
        Ok(context)
    }

    pub fn chain(&self, chain_id: &ChainId) -> Option<Arc<ChainContext>> {
        self.chains.get(chain_id).cloned()
    }

    pub fn chains(&self) -> impl Iterator<Item = &Arc<ChainContext>> {
        self.chains.values()
    }

    pub fn voting(&self) -> &VotingPool {
        &self.voting
    }

    /// Count a vote for a block announced on `chain_id`
    pub fn vote(&self, chain_id: &ChainId, header: &BlockHeader) {
        self.voting
            .put_into_voting_pool(chain_id, header.hash, header.number);
    }

    /// Pick the winning candidate and reset the tally for the next round
    pub fn resolve_fork(&self, chain_id: &ChainId) -> Option<Vote> {
        self.voting.take_sorted_votes(chain_id)?.into_iter().next()
    }
}
