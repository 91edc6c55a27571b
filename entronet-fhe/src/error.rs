use thiserror::Error;

use crate::types::{Address, Handle};

pub type FheResult<T> = Result<T, FheError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FheError {
    #[error("{principal} is not allowed to use ciphertext {handle}")]
    NotAllowed { handle: Handle, principal: Address },
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(Handle),
    #[error("input proof does not bind ciphertext {handle} to sender {sender} and contract {contract}")]
    InvalidInputProof {
        handle: Handle,
        sender: Address,
        contract: Address,
    },
    #[error("grant requires at least one principal")]
    EmptyGrant,
    #[error("cannot grant capability to the zero address")]
    InvalidPrincipal,
}
