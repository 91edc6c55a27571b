use std::fmt;

use crate::{
    error::{FheError, FheResult},
    types::{Address, ExternalUint64, FheUint64},
};

/// Homomorphic operations over encrypted 64-bit integers.
///
/// `caller` is the contract executing the operation. Every operand must be
/// usable by `caller`, and every result comes back [`Ungranted`]: the producer
/// may keep chaining it within the current transaction, but nobody holds a
/// persistent capability until [`Ungranted::grant`] runs.
pub trait FheEvaluator: Send + Sync {
    /// Position in the evaluator's undo journal.
    type Checkpoint: Clone + fmt::Debug + Send;

    fn trivial_encrypt(&mut self, caller: Address, plaintext: u64) -> Ungranted<FheUint64>;

    /// Accepts a client-encrypted input whose proof binds it to `sender` and `caller`.
    fn verify_input(
        &mut self,
        caller: Address,
        sender: Address,
        input: &ExternalUint64,
    ) -> FheResult<Ungranted<FheUint64>>;

    fn add(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>>;

    fn mul(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>>;

    fn mul_scalar(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: u64,
    ) -> FheResult<Ungranted<FheUint64>>;

    fn xor(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>>;

    /// Persistent grant. `granter` must itself be able to use the value.
    fn allow(&mut self, granter: Address, value: &FheUint64, principal: Address) -> FheResult<()>;

    fn is_allowed(&self, value: &FheUint64, principal: &Address) -> bool;

    /// Drops every transient allowance handed out during the current call.
    /// Checkpoints taken before this point can no longer be reverted to.
    fn end_transaction(&mut self);

    fn checkpoint(&self) -> Self::Checkpoint;

    /// Discards every ciphertext and grant created since `checkpoint`. Only
    /// valid inside the transaction the checkpoint was taken in.
    fn revert_to(&mut self, checkpoint: Self::Checkpoint);
}

/// Reference decryption oracle: only principals holding a persistent grant
/// may read a plaintext.
pub trait Decryptor {
    fn decrypt(&self, requester: &Address, value: &FheUint64) -> FheResult<u64>;
}

/// Freshly derived value with an empty persistent capability set. Neither
/// `Clone` nor `Copy`: [`Ungranted::grant`] consumes the only instance.
///
/// ```compile_fail,E0382
/// use entronet_fhe::{Address, FheEvaluator, MockFheEvaluator};
///
/// let contract = Address::derive("contract");
/// let mut fhe = MockFheEvaluator::default();
/// let value = fhe.trivial_encrypt(contract, 1);
/// let first = value.grant(&mut fhe, contract, &[contract]);
/// let second = value.grant(&mut fhe, contract, &[contract]);
/// ```
#[must_use = "derived ciphertexts are unusable outside this call until granted"]
#[derive(Debug, PartialEq, Eq)]
pub struct Ungranted<T> {
    value: T,
}

impl<T> Ungranted<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    /// Borrow the value as an operand inside the producing call.
    pub fn transient(&self) -> &T {
        &self.value
    }
}

impl Ungranted<FheUint64> {
    /// Grants every principal in `principals` and releases the value.
    /// All-or-nothing: on error no principal keeps a grant from this call.
    pub fn grant<E: FheEvaluator + ?Sized>(
        self,
        fhe: &mut E,
        granter: Address,
        principals: &[Address],
    ) -> FheResult<FheUint64> {
        if principals.is_empty() {
            return Err(FheError::EmptyGrant);
        }
        if principals.iter().any(Address::is_zero) {
            return Err(FheError::InvalidPrincipal);
        }
        let checkpoint = fhe.checkpoint();
        for principal in principals {
            if let Err(err) = fhe.allow(granter, &self.value, *principal) {
                fhe.revert_to(checkpoint);
                return Err(err);
            }
        }
        Ok(self.value)
    }
}
