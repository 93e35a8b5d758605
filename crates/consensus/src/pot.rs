//! Proof-of-Transaction engine
//!
//! A miner's eligibility for the next block comes from a pseudo-random "hit"
//! derived from the rotating generation signature. The hit is compared against
//! a target that grows with the miner's power and with the time elapsed since
//! the previous block. All functions here are pure; the only state is the set
//! of constants derived from the configured average block time.

use pot_types::{PubKey, HASH_LEN};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Genesis base target of the reference chain
pub const REFERENCE_GENESIS_BASE_TARGET: u64 = 0x21D0369D036978;

/// Average block time (seconds) the reference genesis base target was tuned for
pub const REFERENCE_AVERAGE_BLOCK_TIME: u64 = 300;

/// Cumulative difficulty numerator is 2^(8*9)
const DIFFICULTY_NUMERATOR_SHIFT: usize = 8 * 9;

/// Hits are scaled by 2^59
const HIT_COEFFICIENT_SHIFT: usize = 59;

/// The logarithm is kept in thousandths through the integer truncation
const HIT_SCALE: u64 = 1000;

/// ln is taken relative to (2^32)^2
const HIT_HALF_RANGE: f64 = 4_294_967_296.0;

/// Retarget step when blocks come in fast: bt/1875 per second of shortfall, times 4
const RETARGET_DIVISOR: u64 = 1875;
const RETARGET_GAMMA: u64 = 4;

/// Blocks up to this height use the genesis base target
const RETARGET_WINDOW: u64 = 3;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotConfig {
    /// Average block time in seconds
    pub average_block_time: u64,
}

impl Default for PotConfig {
    fn default() -> Self {
        Self {
            average_block_time: REFERENCE_AVERAGE_BLOCK_TIME,
        }
    }
}

/// Hit/target/difficulty calculator for one chain
#[derive(Debug, Clone)]
pub struct ProofOfTransaction {
    average_block_time: u64,
    min_ratio: u64,
    max_ratio: u64,
    min_block_time: u64,
    max_block_time: u64,
    genesis_base_target: U256,
}

impl ProofOfTransaction {
    /// Create an engine for the given average block time (seconds, non-zero)
    pub fn new(config: PotConfig) -> Self {
        let t = config.average_block_time.max(1);
        Self {
            average_block_time: t,
            // T * (1 - 7/60) and T * (1 + 7/60)
            min_ratio: t * 53 / 60,
            max_ratio: t * 67 / 60,
            min_block_time: t / 5,
            max_block_time: t * 9 / 5,
            genesis_base_target: U256::from(REFERENCE_GENESIS_BASE_TARGET)
                * U256::from(REFERENCE_AVERAGE_BLOCK_TIME)
                / U256::from(t),
        }
    }

    pub fn average_block_time(&self) -> u64 {
        self.average_block_time
    }

    pub fn min_ratio(&self) -> u64 {
        self.min_ratio
    }

    pub fn max_ratio(&self) -> u64 {
        self.max_ratio
    }

    pub fn min_block_time(&self) -> u64 {
        self.min_block_time
    }

    pub fn max_block_time(&self) -> u64 {
        self.max_block_time
    }

    pub fn genesis_base_target(&self) -> U256 {
        self.genesis_base_target
    }

    /// Hash(previous generation signature || miner public key)
    pub fn generation_signature(
        &self,
        previous: &[u8; HASH_LEN],
        miner: &PubKey,
    ) -> [u8; HASH_LEN] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(previous);
        hasher.update(miner.as_ref());
        *hasher.finalize().as_bytes()
    }

    /// Pseudo-random hit derived from the first 8 bytes of a generation signature.
    ///
    /// `hit = 2^59 * floor(|ln(b + 1) - 2 ln(2^32)| * 1000) / 1000`
    pub fn hit(&self, generation_signature: &[u8; HASH_LEN]) -> U256 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&generation_signature[..8]);
        let b = u64::from_be_bytes(head);

        // b + 1 reaches 2^64, widen before converting
        let value = (u128::from(b) + 1) as f64;
        let logarithm = (value.ln() - 2.0 * HIT_HALF_RANGE.ln()).abs() * HIT_SCALE as f64;
        let milli = logarithm as u64;

        (U256::one() << HIT_COEFFICIENT_SHIFT) * U256::from(milli) / U256::from(HIT_SCALE)
    }

    /// baseTarget * floor(sqrt(power)) * time
    pub fn miner_target(&self, base_target: U256, power: u64, time: u64) -> U256 {
        base_target
            .saturating_mul(U256::from(integer_sqrt(power)))
            .saturating_mul(U256::from(time))
    }

    /// prev + 2^72 / baseTarget
    pub fn cumulative_difficulty(&self, previous: U256, base_target: U256) -> U256 {
        let numerator = U256::one() << DIFFICULTY_NUMERATOR_SHIFT;
        let step = numerator.checked_div(base_target).unwrap_or(numerator);
        // Every block adds at least one unit
        previous.saturating_add(step.max(U256::one()))
    }

    /// Seconds a miner must wait after the previous block before its hit is
    /// under target, clamped to [min_block_time, max_block_time].
    pub fn mining_time_interval(&self, hit: U256, base_target: U256, power: u64) -> u64 {
        let per_second = base_target.saturating_mul(U256::from(integer_sqrt(power)));
        if per_second.is_zero() {
            return self.max_block_time;
        }

        let time = hit / per_second + U256::one();
        if time > U256::from(self.max_block_time) {
            self.max_block_time
        } else if time < U256::from(self.min_block_time) {
            self.min_block_time
        } else {
            time.low_u64()
        }
    }

    /// Block acceptance rule.
    ///
    /// Too fast is always rejected, slow enough is always accepted, and in
    /// between the miner's target must strictly exceed its hit.
    pub fn verify_hit(&self, hit: U256, base_target: U256, power: u64, time_interval: u64) -> bool {
        if time_interval < self.min_block_time {
            return false;
        }
        if time_interval >= self.max_block_time {
            return true;
        }
        self.miner_target(base_target, power, time_interval) > hit
    }

    /// Base target for the block after `previous_block_number`.
    ///
    /// `recent_span` is the time between the previous block and its third
    /// ancestor. Slow blocks raise the base target (easier), fast blocks lower it.
    pub fn required_base_target(
        &self,
        previous_base_target: U256,
        previous_block_number: u64,
        recent_span: u64,
    ) -> U256 {
        if previous_block_number <= RETARGET_WINDOW {
            return self.genesis_base_target;
        }

        let t = self.average_block_time;
        let average = recent_span / RETARGET_WINDOW;

        if average > t {
            let bounded = average.min(self.max_ratio);
            previous_base_target.saturating_mul(U256::from(bounded)) / U256::from(t)
        } else {
            let bounded = average.max(self.min_ratio);
            let step = previous_base_target / U256::from(RETARGET_DIVISOR)
                * U256::from(t - bounded)
                * U256::from(RETARGET_GAMMA);
            previous_base_target.saturating_sub(step)
        }
    }
}

impl Default for ProofOfTransaction {
    fn default() -> Self {
        Self::new(PotConfig::default())
    }
}

/// floor(sqrt(n))
fn integer_sqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    // f64 rounding can be off by one near perfect squares
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).map_or(false, |sq| sq <= n) {
        x += 1;
    }
    x
}
