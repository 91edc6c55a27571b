use entronet_fhe::{Address, FheEvaluator, FheResult, FheUint64, Ungranted};

use crate::{
    config::ChaosConfig,
    error::{ChaosError, ChaosResult},
};

/// Scale-then-fold transform: `x * C xor x` over the wrapping 64-bit ring.
///
/// One round costs a scalar multiply and an xor. The multiply alone would be
/// invertible and keep successive states linearly related; the fold breaks
/// that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChaosMixer {
    multiplier: u64,
    rounds: u8,
}

impl ChaosMixer {
    pub fn new(config: &ChaosConfig) -> ChaosResult<Self> {
        config.validate()?;
        Ok(Self {
            multiplier: config.multiplier,
            rounds: config.rounds,
        })
    }

    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    pub fn rounds(&self) -> u8 {
        self.rounds
    }

    pub fn mix<F: FheEvaluator + ?Sized>(
        &self,
        fhe: &mut F,
        caller: Address,
        value: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let scaled = fhe.mul_scalar(caller, value, self.multiplier)?;
        fhe.xor(caller, scaled.transient(), value)
    }

    /// Feeds the output back in `rounds` times.
    pub fn mix_rounds<F: FheEvaluator + ?Sized>(
        &self,
        fhe: &mut F,
        caller: Address,
        value: &FheUint64,
        rounds: u8,
    ) -> ChaosResult<Ungranted<FheUint64>> {
        if rounds == 0 {
            return Err(ChaosError::InvalidConfig(
                "chaos mixer needs at least one round".into(),
            ));
        }
        let mut state = self.mix(fhe, caller, value)?;
        for _ in 1..rounds {
            state = self.mix(fhe, caller, state.transient())?;
        }
        Ok(state)
    }

    /// Mixes with the configured round count.
    pub fn apply<F: FheEvaluator + ?Sized>(
        &self,
        fhe: &mut F,
        caller: Address,
        value: &FheUint64,
    ) -> ChaosResult<Ungranted<FheUint64>> {
        self.mix_rounds(fhe, caller, value, self.rounds)
    }

    /// Cleartext mirror of [`Self::apply`] for reference checks.
    pub fn apply_plain(&self, value: u64) -> u64 {
        (0..self.rounds).fold(value, |x, _| x.wrapping_mul(self.multiplier) ^ x)
    }
}
