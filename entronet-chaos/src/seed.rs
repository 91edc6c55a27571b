//! Per-request seed derivation. Chain-local values are the only outside
//! entropy that reaches the engine; callers cannot contribute randomness.

use blake3::Hasher;
use entronet_fhe::{Address, FheEvaluator, FheResult, FheUint64, Ungranted};
use serde::{Deserialize, Serialize};

use crate::block::BlockContext;

/// Everything a single request contributes to its public seed.
#[derive(Clone, Copy, Debug)]
pub struct SeedInputs<'a> {
    pub request_id: u64,
    pub consumer: Address,
    pub tag: &'a [u8],
    pub block: &'a BlockContext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicSeed(pub u64);

/// Hashes the ambient block values and request metadata, keeping the low 64
/// bits of the digest (big-endian tail of the 256-bit word).
pub fn derive_public_seed(inputs: &SeedInputs<'_>) -> PublicSeed {
    let block = inputs.block;
    let mut hasher = Hasher::new();
    hasher.update(&block.timestamp.to_be_bytes());
    hasher.update(&block.prevrandao);
    hasher.update(&block.parent_hash);
    hasher.update(block.coinbase.as_bytes());
    hasher.update(&block.gas_left.to_be_bytes());
    hasher.update(&inputs.request_id.to_be_bytes());
    hasher.update(inputs.consumer.as_bytes());
    hasher.update(&(inputs.tag.len() as u64).to_be_bytes());
    hasher.update(inputs.tag);
    let digest = hasher.finalize();
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest.as_bytes()[24..]);
    PublicSeed(u64::from_be_bytes(tail))
}

/// Lifts the public seed into the opaque domain and folds in the master seed.
pub fn aggregate_seed<F: FheEvaluator + ?Sized>(
    fhe: &mut F,
    engine: Address,
    seed: PublicSeed,
    master: &FheUint64,
) -> FheResult<Ungranted<FheUint64>> {
    let lifted = fhe.trivial_encrypt(engine, seed.0);
    fhe.xor(engine, lifted.transient(), master)
}
