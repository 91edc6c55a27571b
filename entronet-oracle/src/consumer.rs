//! Thin consumer contract: keeps one private value for a single user, either
//! as supplied or blinded with entropy fetched from the ledger.

use entronet_fhe::{Address, ExternalUint64, FheEvaluator, FheUint64};
use tracing::info;

use crate::{
    chain::Chain,
    error::{OracleError, OracleResult},
    oracle::{EntropyEngine, EntropyOracle},
};

#[derive(Clone, Debug)]
pub struct EntropyConsumer {
    address: Address,
    encrypted_value: Option<FheUint64>,
    allowed_user: Option<Address>,
}

impl EntropyConsumer {
    pub fn new(address: Address) -> OracleResult<Self> {
        if address.is_zero() {
            return Err(OracleError::InvalidAddress);
        }
        Ok(Self {
            address,
            encrypted_value: None,
            allowed_user: None,
        })
    }

    /// Stores `input` as-is for `sender`.
    pub fn store_value<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        input: &ExternalUint64,
    ) -> OracleResult<FheUint64> {
        let result = chain
            .fhe
            .verify_input(self.address, sender, input)
            .and_then(|value| value.grant(&mut chain.fhe, self.address, &[self.address, sender]));
        chain.end_call();
        let value = result?;
        self.commit(sender, value);
        Ok(value)
    }

    /// Stores `input xor entropy(request_id)` for `sender`.
    ///
    /// The consumer contract must already be allowed on the request's
    /// entropy; the holder grants that with a plain ACL call beforehand.
    pub fn store_with_entropy<F: FheEvaluator, E: EntropyEngine>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        input: &ExternalUint64,
        oracle: &EntropyOracle<E>,
        request_id: u64,
    ) -> OracleResult<FheUint64> {
        let result = self.blind(chain, sender, input, oracle, request_id);
        chain.end_call();
        let value = result?;
        self.commit(sender, value);
        info!("consumer stored blinded value consumer={} request_id={request_id}", self.address);
        Ok(value)
    }

    fn blind<F: FheEvaluator, E: EntropyEngine>(
        &self,
        chain: &mut Chain<F>,
        sender: Address,
        input: &ExternalUint64,
        oracle: &EntropyOracle<E>,
        request_id: u64,
    ) -> OracleResult<FheUint64> {
        let entropy = oracle.get_encrypted_entropy(request_id)?;
        let private = chain.fhe.verify_input(self.address, sender, input)?;
        let blinded = chain
            .fhe
            .xor(self.address, private.transient(), &entropy)?
            .grant(&mut chain.fhe, self.address, &[self.address, sender])?;
        Ok(blinded)
    }

    fn commit(&mut self, sender: Address, value: FheUint64) {
        self.encrypted_value = Some(value);
        self.allowed_user = Some(sender);
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_initialized(&self) -> bool {
        self.encrypted_value.is_some()
    }

    pub fn allowed_user(&self) -> Option<Address> {
        self.allowed_user
    }

    pub fn encrypted_value(&self) -> OracleResult<FheUint64> {
        self.encrypted_value.ok_or(OracleError::NotInitialized)
    }
}
