use std::collections::BTreeMap;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    acl::AccessControlList,
    error::{FheError, FheResult},
    evaluator::{Decryptor, FheEvaluator, Ungranted},
    types::{Address, ExternalUint64, FheUint64, Handle},
};

/// Gas charged per homomorphic operation. Multiplications dominate, which is
/// why the chaos mixer is limited to one multiply per round.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct FheConfig {
    pub trivial_encrypt_gas: u64,
    pub verify_input_gas: u64,
    pub add_gas: u64,
    pub mul_gas: u64,
    pub mul_scalar_gas: u64,
    pub xor_gas: u64,
    pub allow_gas: u64,
}

impl Default for FheConfig {
    fn default() -> Self {
        Self {
            trivial_encrypt_gas: 32,
            verify_input_gas: 1_000,
            add_gas: 162_000,
            mul_gas: 641_000,
            mul_scalar_gas: 272_000,
            xor_gas: 94_000,
            allow_gas: 25_000,
        }
    }
}

/// Plaintext-transparent reference backend. Values are stored in the clear
/// behind opaque handles; the only read path is [`Decryptor::decrypt`], which
/// enforces the persistent ACL exactly like a real threshold decryption
/// network would.
#[derive(Clone, Debug, Default)]
pub struct MockFheEvaluator {
    config: FheConfig,
    plaintexts: BTreeMap<Handle, u64>,
    acl: AccessControlList,
    counter: u64,
    gas_used: u64,
    /// Undo log for the open transaction, cleared by `end_transaction`.
    journal: Vec<JournalEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JournalEntry {
    Created(Handle),
    Granted(Handle, Address),
    TransientGranted(Handle, Address),
}

/// Journal position plus the scalar counters at that point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockCheckpoint {
    journal: usize,
    counter: u64,
    gas_used: u64,
}

impl MockFheEvaluator {
    pub fn new(config: FheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Client-side encryption of a user input for `contract`.
    pub fn encrypt_input(
        &mut self,
        plaintext: u64,
        sender: Address,
        contract: Address,
    ) -> ExternalUint64 {
        let handle = self.fresh_handle("input", &[]);
        self.store(handle, plaintext);
        ExternalUint64 {
            handle,
            proof: input_proof(&handle, &sender, &contract),
        }
    }

    pub fn acl(&self) -> &AccessControlList {
        &self.acl
    }

    pub fn config(&self) -> &FheConfig {
        &self.config
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn ciphertext_count(&self) -> usize {
        self.plaintexts.len()
    }

    fn fresh_handle(&mut self, op: &str, inputs: &[&Handle]) -> Handle {
        self.counter += 1;
        let mut hasher = Hasher::new();
        hasher.update(b"entronet/fhe/");
        hasher.update(op.as_bytes());
        hasher.update(&self.counter.to_le_bytes());
        for input in inputs {
            hasher.update(&input.0);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(hasher.finalize().as_bytes());
        Handle(out)
    }

    fn store(&mut self, handle: Handle, plaintext: u64) {
        if self.plaintexts.insert(handle, plaintext).is_none() {
            self.journal.push(JournalEntry::Created(handle));
        }
    }

    fn allow_transient(&mut self, handle: Handle, principal: Address) {
        if self.acl.allow_transient(handle, principal) {
            self.journal
                .push(JournalEntry::TransientGranted(handle, principal));
        }
    }

    fn operand(&self, caller: &Address, value: &FheUint64) -> FheResult<u64> {
        let handle = value.handle();
        let plaintext = *self
            .plaintexts
            .get(&handle)
            .ok_or(FheError::UnknownHandle(handle))?;
        if !self.acl.can_use(&handle, caller) {
            return Err(FheError::NotAllowed {
                handle,
                principal: *caller,
            });
        }
        Ok(plaintext)
    }

    fn produce(
        &mut self,
        caller: Address,
        op: &str,
        inputs: &[&Handle],
        plaintext: u64,
        gas: u64,
    ) -> Ungranted<FheUint64> {
        let handle = self.fresh_handle(op, inputs);
        self.store(handle, plaintext);
        self.allow_transient(handle, caller);
        self.gas_used = self.gas_used.saturating_add(gas);
        Ungranted::new(FheUint64::from_handle(handle))
    }

    fn binary(
        &mut self,
        caller: Address,
        op: &str,
        lhs: &FheUint64,
        rhs: &FheUint64,
        gas: u64,
        apply: impl FnOnce(u64, u64) -> u64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let a = self.operand(&caller, lhs)?;
        let b = self.operand(&caller, rhs)?;
        let (lh, rh) = (lhs.handle(), rhs.handle());
        Ok(self.produce(caller, op, &[&lh, &rh], apply(a, b), gas))
    }
}

impl FheEvaluator for MockFheEvaluator {
    type Checkpoint = MockCheckpoint;

    fn trivial_encrypt(&mut self, caller: Address, plaintext: u64) -> Ungranted<FheUint64> {
        let gas = self.config.trivial_encrypt_gas;
        self.produce(caller, "trivial", &[], plaintext, gas)
    }

    fn verify_input(
        &mut self,
        caller: Address,
        sender: Address,
        input: &ExternalUint64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let handle = input.handle;
        if !self.plaintexts.contains_key(&handle) {
            return Err(FheError::UnknownHandle(handle));
        }
        if input.proof != input_proof(&handle, &sender, &caller) {
            return Err(FheError::InvalidInputProof {
                handle,
                sender,
                contract: caller,
            });
        }
        self.allow_transient(handle, caller);
        self.gas_used = self.gas_used.saturating_add(self.config.verify_input_gas);
        Ok(Ungranted::new(FheUint64::from_handle(handle)))
    }

    fn add(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let gas = self.config.add_gas;
        self.binary(caller, "add", lhs, rhs, gas, u64::wrapping_add)
    }

    fn mul(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let gas = self.config.mul_gas;
        self.binary(caller, "mul", lhs, rhs, gas, u64::wrapping_mul)
    }

    fn mul_scalar(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: u64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let a = self.operand(&caller, lhs)?;
        let lh = lhs.handle();
        let gas = self.config.mul_scalar_gas;
        Ok(self.produce(caller, "mul_scalar", &[&lh], a.wrapping_mul(rhs), gas))
    }

    fn xor(
        &mut self,
        caller: Address,
        lhs: &FheUint64,
        rhs: &FheUint64,
    ) -> FheResult<Ungranted<FheUint64>> {
        let gas = self.config.xor_gas;
        self.binary(caller, "xor", lhs, rhs, gas, |a, b| a ^ b)
    }

    fn allow(&mut self, granter: Address, value: &FheUint64, principal: Address) -> FheResult<()> {
        if principal.is_zero() {
            return Err(FheError::InvalidPrincipal);
        }
        self.operand(&granter, value)?;
        let handle = value.handle();
        if self.acl.allow(handle, principal) {
            self.journal.push(JournalEntry::Granted(handle, principal));
        }
        self.gas_used = self.gas_used.saturating_add(self.config.allow_gas);
        Ok(())
    }

    fn is_allowed(&self, value: &FheUint64, principal: &Address) -> bool {
        self.acl.is_allowed(&value.handle(), principal)
    }

    fn end_transaction(&mut self) {
        let dropped = self.acl.clear_transient();
        self.journal.clear();
        debug!("fhe transaction closed dropped_transient={dropped}");
    }

    fn checkpoint(&self) -> MockCheckpoint {
        MockCheckpoint {
            journal: self.journal.len(),
            counter: self.counter,
            gas_used: self.gas_used,
        }
    }

    fn revert_to(&mut self, checkpoint: MockCheckpoint) {
        if checkpoint.journal > self.journal.len() {
            warn!("fhe checkpoint outlived its transaction, nothing reverted");
            return;
        }
        let undone = self.journal.len() - checkpoint.journal;
        for entry in self.journal.drain(checkpoint.journal..).rev() {
            match entry {
                JournalEntry::Created(handle) => {
                    self.plaintexts.remove(&handle);
                }
                JournalEntry::Granted(handle, principal) => self.acl.revoke(&handle, &principal),
                JournalEntry::TransientGranted(handle, principal) => {
                    self.acl.revoke_transient(handle, principal)
                }
            }
        }
        self.counter = checkpoint.counter;
        self.gas_used = checkpoint.gas_used;
        debug!("fhe reverted to checkpoint undone={undone}");
    }
}

impl Decryptor for MockFheEvaluator {
    fn decrypt(&self, requester: &Address, value: &FheUint64) -> FheResult<u64> {
        let handle = value.handle();
        let plaintext = *self
            .plaintexts
            .get(&handle)
            .ok_or(FheError::UnknownHandle(handle))?;
        if !self.acl.is_allowed(&handle, requester) {
            return Err(FheError::NotAllowed {
                handle,
                principal: *requester,
            });
        }
        Ok(plaintext)
    }
}

fn input_proof(handle: &Handle, sender: &Address, contract: &Address) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(b"entronet/fhe/input-proof");
    hasher.update(&handle.0);
    hasher.update(sender.as_bytes());
    hasher.update(contract.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(hasher.finalize().as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actors() -> (Address, Address) {
        (Address::derive("contract"), Address::derive("user"))
    }

    #[test]
    fn arithmetic_wraps_modulo_two_pow_64() {
        let (contract, user) = actors();
        let mut fhe = MockFheEvaluator::default();
        let a = fhe.trivial_encrypt(contract, u64::MAX);
        let b = fhe.trivial_encrypt(contract, 2);
        let sum = fhe
            .add(contract, a.transient(), b.transient())
            .unwrap()
            .grant(&mut fhe, contract, &[user])
            .unwrap();
        assert_eq!(fhe.decrypt(&user, &sum).unwrap(), 1);

        let product = fhe
            .mul_scalar(contract, a.transient(), 3)
            .unwrap()
            .grant(&mut fhe, contract, &[user])
            .unwrap();
        assert_eq!(fhe.decrypt(&user, &product).unwrap(), u64::MAX.wrapping_mul(3));
    }

    #[test]
    fn results_start_without_persistent_capabilities() {
        let (contract, user) = actors();
        let mut fhe = MockFheEvaluator::default();
        let value = fhe.trivial_encrypt(contract, 9);
        let raw = *value.transient();
        assert!(!fhe.is_allowed(&raw, &contract));
        assert!(matches!(
            fhe.decrypt(&user, &raw),
            Err(FheError::NotAllowed { .. })
        ));
    }

    #[test]
    fn transient_access_ends_with_transaction() {
        let (contract, _) = actors();
        let mut fhe = MockFheEvaluator::default();
        let value = fhe.trivial_encrypt(contract, 5);
        let raw = *value.transient();
        fhe.end_transaction();
        let err = fhe.xor(contract, &raw, &raw).unwrap_err();
        assert_eq!(
            err,
            FheError::NotAllowed {
                handle: raw.handle(),
                principal: contract
            }
        );
    }

    #[test]
    fn input_proof_is_bound_to_sender_and_contract() {
        let (contract, user) = actors();
        let mut fhe = MockFheEvaluator::default();
        let input = fhe.encrypt_input(42, user, contract);
        let other = Address::derive("other-contract");
        assert!(matches!(
            fhe.verify_input(other, user, &input),
            Err(FheError::InvalidInputProof { .. })
        ));
        let value = fhe
            .verify_input(contract, user, &input)
            .unwrap()
            .grant(&mut fhe, contract, &[user])
            .unwrap();
        assert_eq!(fhe.decrypt(&user, &value).unwrap(), 42);
    }

    #[test]
    fn grant_rejects_empty_and_zero_principals() {
        let (contract, _) = actors();
        let mut fhe = MockFheEvaluator::default();
        let value = fhe.trivial_encrypt(contract, 1);
        assert_eq!(
            value.grant(&mut fhe, contract, &[]).unwrap_err(),
            FheError::EmptyGrant
        );
        let value = fhe.trivial_encrypt(contract, 1);
        assert_eq!(
            value.grant(&mut fhe, contract, &[Address::ZERO]).unwrap_err(),
            FheError::InvalidPrincipal
        );
    }

    #[test]
    fn failed_grant_leaves_no_principal_behind() {
        let (contract, user) = actors();
        let mut fhe = MockFheEvaluator::default();
        let value = fhe.trivial_encrypt(contract, 3);
        let raw = *value.transient();
        assert_eq!(
            value
                .grant(&mut fhe, contract, &[user, Address::ZERO])
                .unwrap_err(),
            FheError::InvalidPrincipal
        );
        assert!(!fhe.is_allowed(&raw, &user));
        assert!(fhe.acl().principals(&raw.handle()).is_empty());
    }

    #[test]
    fn revert_discards_only_work_after_checkpoint() {
        let (contract, user) = actors();
        let mut fhe = MockFheEvaluator::default();
        let kept = fhe
            .trivial_encrypt(contract, 10)
            .grant(&mut fhe, contract, &[user])
            .unwrap();
        let checkpoint = fhe.checkpoint();
        let count = fhe.ciphertext_count();
        let gas = fhe.gas_used();

        let scaled = fhe.mul_scalar(contract, &kept, 7).unwrap();
        let scratch = *scaled.transient();
        fhe.allow(user, &kept, Address::derive("delegate")).unwrap();
        let _granted = scaled.grant(&mut fhe, contract, &[user]).unwrap();
        assert_eq!(fhe.ciphertext_count(), count + 1);

        fhe.revert_to(checkpoint);
        assert_eq!(fhe.ciphertext_count(), count);
        assert_eq!(fhe.gas_used(), gas);
        assert!(matches!(
            fhe.decrypt(&user, &scratch),
            Err(FheError::UnknownHandle(_))
        ));
        assert!(!fhe.is_allowed(&kept, &Address::derive("delegate")));
        assert_eq!(fhe.decrypt(&user, &kept).unwrap(), 10);

        // Handle derivation restarts from the checkpoint.
        let again = fhe.mul_scalar(contract, &kept, 7).unwrap();
        assert_eq!(again.transient(), &scratch);
    }

    #[test]
    fn gas_accumulates_per_operation() {
        let (contract, _) = actors();
        let mut fhe = MockFheEvaluator::default();
        let a = fhe.trivial_encrypt(contract, 1);
        let _ = fhe.mul(contract, a.transient(), a.transient()).unwrap();
        let expected = fhe.config().trivial_encrypt_gas + fhe.config().mul_gas;
        assert_eq!(fhe.gas_used(), expected);
    }
}
