use std::collections::BTreeSet;

use entronet_fhe::{Address, ExternalUint64, FheEvaluator, FheUint64};
use tracing::{debug, info};

use crate::{
    block::BlockContext,
    config::ChaosConfig,
    error::{ChaosError, ChaosResult},
    mixer::ChaosMixer,
    seed::{aggregate_seed, derive_public_seed, SeedInputs},
};

/// Owner of the private master seed and the running state that chains every
/// request together.
///
/// State after derivation `n` depends on the state after `n - 1`, the master
/// seed and request `n`'s public seed, so a request's entropy can only be
/// reproduced by replaying every earlier derivation. Nothing here can
/// regenerate lost entropy: callers keep the returned handle.
/// Engine state touched by a derivation, captured so a reverted call can put
/// it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineCheckpoint {
    running_state: Option<FheUint64>,
    generation: u64,
}

#[derive(Clone, Debug)]
pub struct ChaosEngine {
    address: Address,
    admin: Address,
    mixer: ChaosMixer,
    master_seed: Option<FheUint64>,
    running_state: Option<FheUint64>,
    authorized_callers: BTreeSet<Address>,
    generation: u64,
}

impl ChaosEngine {
    pub fn new(address: Address, admin: Address, config: &ChaosConfig) -> ChaosResult<Self> {
        if address.is_zero() || admin.is_zero() {
            return Err(ChaosError::InvalidAddress);
        }
        Ok(Self {
            address,
            admin,
            mixer: ChaosMixer::new(config)?,
            master_seed: None,
            running_state: None,
            authorized_callers: BTreeSet::new(),
            generation: 0,
        })
    }

    /// Restricts [`Self::generate_entropy`] to the given caller (builder form).
    pub fn allow_caller(mut self, caller: Address) -> Self {
        self.authorized_callers.insert(caller);
        self
    }

    pub fn authorize_caller(&mut self, sender: Address, caller: Address) -> ChaosResult<()> {
        self.ensure_admin(sender)?;
        if caller.is_zero() {
            return Err(ChaosError::InvalidAddress);
        }
        self.authorized_callers.insert(caller);
        Ok(())
    }

    pub fn revoke_caller(&mut self, sender: Address, caller: Address) -> ChaosResult<bool> {
        self.ensure_admin(sender)?;
        Ok(self.authorized_callers.remove(&caller))
    }

    pub fn transfer_admin(&mut self, sender: Address, new_admin: Address) -> ChaosResult<()> {
        self.ensure_admin(sender)?;
        if new_admin.is_zero() {
            return Err(ChaosError::InvalidAddress);
        }
        info!("chaos engine admin transferred engine={} admin={new_admin}", self.address);
        self.admin = new_admin;
        Ok(())
    }

    /// One-time installation of the master seed. Only the engine and the
    /// administrator are ever granted access to it.
    pub fn initialize_master_seed<F: FheEvaluator + ?Sized>(
        &mut self,
        fhe: &mut F,
        sender: Address,
        input: &ExternalUint64,
    ) -> ChaosResult<FheUint64> {
        self.ensure_admin(sender)?;
        if self.master_seed.is_some() {
            return Err(ChaosError::AlreadyInitialized);
        }
        let seed = fhe
            .verify_input(self.address, sender, input)?
            .grant(fhe, self.address, &[self.address, self.admin])?;
        self.master_seed = Some(seed);
        self.running_state = Some(seed);
        info!(
            "chaos engine seeded engine={} master_seed={}",
            self.address,
            seed.handle()
        );
        Ok(seed)
    }

    /// Advances the running state by one derivation and returns the new state
    /// as the request's entropy, readable by `consumer` alone.
    pub fn generate_entropy<F: FheEvaluator + ?Sized>(
        &mut self,
        fhe: &mut F,
        block: &BlockContext,
        caller: Address,
        tag: &[u8],
        consumer: Address,
        request_id: u64,
    ) -> ChaosResult<FheUint64> {
        if !self.authorized_callers.is_empty() && !self.authorized_callers.contains(&caller) {
            return Err(ChaosError::Unauthorized { caller });
        }
        let (master, running) = match (self.master_seed, self.running_state) {
            (Some(master), Some(running)) => (master, running),
            _ => return Err(ChaosError::NotInitialized),
        };
        if consumer.is_zero() {
            return Err(ChaosError::InvalidAddress);
        }

        let public_seed = derive_public_seed(&SeedInputs {
            request_id,
            consumer,
            tag,
            block,
        });
        let aggregated = aggregate_seed(fhe, self.address, public_seed, &master)?;
        let merged = fhe.xor(self.address, aggregated.transient(), &running)?;
        let next = self
            .mixer
            .apply(fhe, self.address, merged.transient())?
            .grant(fhe, self.address, &[self.address, consumer])?;

        self.running_state = Some(next);
        self.generation += 1;
        debug!(
            "entropy derived engine={} request_id={request_id} generation={} block={}",
            self.address, self.generation, block.number
        );
        Ok(next)
    }

    pub fn checkpoint(&self) -> EngineCheckpoint {
        EngineCheckpoint {
            running_state: self.running_state,
            generation: self.generation,
        }
    }

    pub fn restore(&mut self, checkpoint: EngineCheckpoint) {
        self.running_state = checkpoint.running_state;
        self.generation = checkpoint.generation;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn is_initialized(&self) -> bool {
        self.master_seed.is_some()
    }

    pub fn master_seed(&self) -> Option<FheUint64> {
        self.master_seed
    }

    pub fn running_state(&self) -> Option<FheUint64> {
        self.running_state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mixer(&self) -> &ChaosMixer {
        &self.mixer
    }

    pub fn authorized_callers(&self) -> impl Iterator<Item = &Address> {
        self.authorized_callers.iter()
    }

    fn ensure_admin(&self, sender: Address) -> ChaosResult<()> {
        if sender != self.admin {
            return Err(ChaosError::Unauthorized { caller: sender });
        }
        Ok(())
    }
}
