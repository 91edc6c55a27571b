//! Encrypted chaos-state entropy engine.
//!
//! Chain-local block values and request metadata are hashed into a public
//! seed, lifted into the opaque domain, folded with the private master seed
//! and the running state, then passed through the scale-then-fold chaos mixer.
//! The result becomes both the new running state and the requester's entropy.

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod seed;

pub use block::{BlockContext, BlockProducer};
pub use config::{BlockConfig, ChaosConfig, MAX_BLOCK_INTERVAL_SECS};
pub use engine::{ChaosEngine, EngineCheckpoint};
pub use error::{ChaosError, ChaosResult};
pub use mixer::ChaosMixer;
pub use seed::{aggregate_seed, derive_public_seed, PublicSeed, SeedInputs};
