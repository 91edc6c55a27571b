use entronet_fhe::{Address, FheError};
use thiserror::Error;

pub type ChaosResult<T> = Result<T, ChaosError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChaosError {
    #[error("master seed already initialized")]
    AlreadyInitialized,
    #[error("master seed not initialized")]
    NotInitialized,
    #[error("{caller} is not authorized for this engine operation")]
    Unauthorized { caller: Address },
    #[error("zero address is not a valid target")]
    InvalidAddress,
    #[error("invalid chaos configuration: {0}")]
    InvalidConfig(String),
    #[error("block clock overflows after block {number} at timestamp {timestamp}")]
    ClockOverflow { number: u64, timestamp: u64 },
    #[error(transparent)]
    Fhe(#[from] FheError),
}
