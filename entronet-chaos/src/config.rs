use serde::{Deserialize, Serialize};

use crate::error::{ChaosError, ChaosResult};

/// Mixer parameters. The multiplier must be odd so that scaling is a
/// bijection on the 64-bit ring.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ChaosConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
    #[serde(default = "default_rounds")]
    pub rounds: u8,
}

const fn default_multiplier() -> u64 {
    0x5851_F42D
}

const fn default_rounds() -> u8 {
    1
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            rounds: default_rounds(),
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> ChaosResult<()> {
        if self.multiplier % 2 == 0 {
            return Err(ChaosError::InvalidConfig(
                "chaos multiplier must be odd".into(),
            ));
        }
        if self.rounds == 0 {
            return Err(ChaosError::InvalidConfig(
                "chaos mixer needs at least one round".into(),
            ));
        }
        Ok(())
    }
}

/// Simulated chain cadence used by [`crate::block::BlockProducer`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct BlockConfig {
    #[serde(default = "default_genesis_timestamp")]
    pub genesis_timestamp: u64,
    #[serde(default = "default_block_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub beacon_seed: u64,
}

const fn default_genesis_timestamp() -> u64 {
    1_700_000_000
}

/// Longest accepted block interval (one day).
pub const MAX_BLOCK_INTERVAL_SECS: u64 = 86_400;

const fn default_block_interval_secs() -> u64 {
    12
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: default_genesis_timestamp(),
            interval_secs: default_block_interval_secs(),
            beacon_seed: 0,
        }
    }
}

impl BlockConfig {
    pub fn validate(&self) -> ChaosResult<()> {
        if self.interval_secs == 0 {
            return Err(ChaosError::InvalidConfig(
                "block interval must be greater than zero".into(),
            ));
        }
        if self.interval_secs > MAX_BLOCK_INTERVAL_SECS {
            return Err(ChaosError::InvalidConfig(format!(
                "block interval must not exceed {MAX_BLOCK_INTERVAL_SECS} seconds"
            )));
        }
        if self.genesis_timestamp.checked_add(self.interval_secs).is_none() {
            return Err(ChaosError::InvalidConfig(
                "genesis timestamp leaves no room for a second block".into(),
            ));
        }
        Ok(())
    }
}
