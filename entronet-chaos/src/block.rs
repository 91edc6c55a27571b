use blake3::Hasher;
use entronet_fhe::Address;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::BlockConfig,
    error::{ChaosError, ChaosResult},
};

/// Chain-local values visible to a call while it executes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub number: u64,
    pub timestamp: u64,
    /// Randomness beacon contributed by the block proposer.
    pub prevrandao: [u8; 32],
    pub parent_hash: [u8; 32],
    pub coinbase: Address,
    /// Remaining execution budget at the point the call reads it.
    pub gas_left: u64,
}

impl BlockContext {
    pub fn with_gas_left(mut self, gas_left: u64) -> Self {
        self.gas_left = gas_left;
        self
    }

    pub fn header_hash(&self) -> [u8; 32] {
        let mut hasher = Hasher::new();
        hasher.update(b"entronet/block");
        hasher.update(&self.number.to_be_bytes());
        hasher.update(&self.timestamp.to_be_bytes());
        hasher.update(&self.prevrandao);
        hasher.update(&self.parent_hash);
        hasher.update(self.coinbase.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(hasher.finalize().as_bytes());
        out
    }
}

/// Deterministic block source for simulations: strictly increasing height and
/// timestamp, ChaCha20-driven beacon and proposer.
#[derive(Clone, Debug)]
pub struct BlockProducer {
    config: BlockConfig,
    rng: ChaCha20Rng,
    current: BlockContext,
}

impl BlockProducer {
    pub fn new(config: BlockConfig) -> Self {
        let seed = blake3::hash(&config.beacon_seed.to_le_bytes());
        let mut rng = ChaCha20Rng::from_seed(*seed.as_bytes());
        let mut prevrandao = [0u8; 32];
        rng.fill_bytes(&mut prevrandao);
        let current = BlockContext {
            number: 0,
            timestamp: config.genesis_timestamp,
            prevrandao,
            parent_hash: [0u8; 32],
            coinbase: Self::draw_proposer(&mut rng),
            gas_left: 0,
        };
        Self {
            config,
            rng,
            current,
        }
    }

    pub fn current(&self) -> &BlockContext {
        &self.current
    }

    /// Mines the next block. Fails without touching the current block when
    /// height or timestamp would leave the `u64` range.
    pub fn advance(&mut self) -> ChaosResult<&BlockContext> {
        let number = self
            .current
            .number
            .checked_add(1)
            .ok_or_else(|| self.clock_overflow())?;
        let timestamp = self
            .current
            .timestamp
            .checked_add(self.config.interval_secs)
            .ok_or_else(|| self.clock_overflow())?;
        let parent_hash = self.current.header_hash();
        let mut prevrandao = [0u8; 32];
        self.rng.fill_bytes(&mut prevrandao);
        self.current = BlockContext {
            number,
            timestamp,
            prevrandao,
            parent_hash,
            coinbase: Self::draw_proposer(&mut self.rng),
            gas_left: 0,
        };
        Ok(&self.current)
    }

    fn clock_overflow(&self) -> ChaosError {
        ChaosError::ClockOverflow {
            number: self.current.number,
            timestamp: self.current.timestamp,
        }
    }

    fn draw_proposer(rng: &mut ChaCha20Rng) -> Address {
        let mut raw = [0u8; 20];
        rng.fill_bytes(&mut raw);
        Address::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_strictly_increasing_and_linked() {
        let mut producer = BlockProducer::new(BlockConfig::default());
        let genesis = producer.current().clone();
        let next = producer.advance().unwrap().clone();
        assert_eq!(next.number, genesis.number + 1);
        assert!(next.timestamp > genesis.timestamp);
        assert_eq!(next.parent_hash, genesis.header_hash());
        assert_ne!(next.prevrandao, genesis.prevrandao);
    }

    #[test]
    fn same_seed_replays_same_chain() {
        let mut a = BlockProducer::new(BlockConfig::default());
        let mut b = BlockProducer::new(BlockConfig::default());
        for _ in 0..4 {
            assert_eq!(a.advance().unwrap(), b.advance().unwrap());
        }
    }

    #[test]
    fn clock_overflow_is_an_error_not_a_wrap() {
        let config = BlockConfig {
            genesis_timestamp: u64::MAX - 5,
            interval_secs: 5,
            beacon_seed: 0,
        };
        config.validate().unwrap();
        let mut producer = BlockProducer::new(config);
        let last = producer.advance().unwrap().clone();
        assert_eq!(last.timestamp, u64::MAX);

        assert_eq!(
            producer.advance().unwrap_err(),
            ChaosError::ClockOverflow {
                number: 1,
                timestamp: u64::MAX
            }
        );
        assert_eq!(producer.current(), &last);
    }
}
