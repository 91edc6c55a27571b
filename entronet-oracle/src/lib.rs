//! Request ledger for the entronet entropy service.
//!
//! Callers attach the fixed fee, receive a monotonically increasing request id
//! and an encrypted entropy handle only they can decrypt. Every call is
//! atomic against the simulated [`Chain`]: a rejected fee transfer leaves no
//! record, no consumed id and no engine state change behind.

pub mod chain;
pub mod consumer;
pub mod error;
pub mod events;
pub mod oracle;

pub use chain::{
    Bank, Chain, ChainCheckpoint, Delivery, Message, RecipientBehavior, TransferError,
    CALLDATA_BYTE_GAS, INTRINSIC_GAS,
};
pub use consumer::EntropyConsumer;
pub use error::{OracleError, OracleResult};
pub use events::{hash_consumer, hash_tag, EventDigest, OracleEvent};
pub use oracle::{EntropyEngine, EntropyOracle, EntropyRequest, REQUEST_FEE_WEI};
