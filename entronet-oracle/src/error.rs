use entronet_chaos::ChaosError;
use entronet_fhe::FheError;
use thiserror::Error;

use crate::chain::TransferError;

pub type OracleResult<T> = Result<T, OracleError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("insufficient fee: sent {sent} wei, required {required} wei")]
    InsufficientFee { sent: u128, required: u128 },
    #[error("request {0} is unknown or not fulfilled")]
    RequestNotFulfilled(u64),
    #[error("zero address is not a valid target")]
    InvalidAddress,
    #[error("caller is not the administrator")]
    Unauthorized,
    #[error("reentrant call rejected")]
    Reentrancy,
    #[error("fee transfer failed: {0}")]
    FeeTransferFailed(TransferError),
    #[error("emergency withdrawal failed: {0}")]
    WithdrawFailed(TransferError),
    #[error("sender cannot cover attached value: needed {needed} wei, available {available} wei")]
    InsufficientBalance { needed: u128, available: u128 },
    #[error("consumer holds no encrypted value")]
    NotInitialized,
    #[error(transparent)]
    Chaos(#[from] ChaosError),
    #[error(transparent)]
    Fhe(#[from] FheError),
}
