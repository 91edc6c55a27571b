use std::collections::BTreeMap;

use entronet_chaos::{BlockContext, ChaosEngine, ChaosError, EngineCheckpoint};
use entronet_fhe::{Address, FheEvaluator, FheUint64};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    chain::{Chain, Delivery, Message, TransferError},
    error::{OracleError, OracleResult},
    events::{hash_consumer, hash_tag, OracleEvent},
};

/// Fixed per-request fee (0.00001 ether).
pub const REQUEST_FEE_WEI: u128 = 10_000_000_000_000;

/// Immutable record of an accepted request.
///
/// Fulfilment is synchronous, so `fulfilled` is always `true` once a record
/// exists. The flag is kept so an asynchronous fulfilment path can be added
/// without changing the record layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyRequest {
    pub id: u64,
    pub consumer: Address,
    pub tag: Vec<u8>,
    pub entropy: FheUint64,
    pub timestamp: u64,
    pub fulfilled: bool,
}

/// Seam between the ledger and whatever produces encrypted entropy.
pub trait EntropyEngine: Clone {
    /// Engine state a reverted request has to put back.
    type Checkpoint;

    fn address(&self) -> Address;

    fn checkpoint(&self) -> Self::Checkpoint;

    fn restore(&mut self, checkpoint: Self::Checkpoint);

    fn generate_entropy<F: FheEvaluator + ?Sized>(
        &mut self,
        fhe: &mut F,
        block: &BlockContext,
        caller: Address,
        tag: &[u8],
        consumer: Address,
        request_id: u64,
    ) -> Result<FheUint64, ChaosError>;
}

impl EntropyEngine for ChaosEngine {
    type Checkpoint = EngineCheckpoint;

    fn address(&self) -> Address {
        ChaosEngine::address(self)
    }

    fn checkpoint(&self) -> EngineCheckpoint {
        ChaosEngine::checkpoint(self)
    }

    fn restore(&mut self, checkpoint: EngineCheckpoint) {
        ChaosEngine::restore(self, checkpoint)
    }

    fn generate_entropy<F: FheEvaluator + ?Sized>(
        &mut self,
        fhe: &mut F,
        block: &BlockContext,
        caller: Address,
        tag: &[u8],
        consumer: Address,
        request_id: u64,
    ) -> Result<FheUint64, ChaosError> {
        ChaosEngine::generate_entropy(self, fhe, block, caller, tag, consumer, request_id)
    }
}

/// Ledger fields a request may change.
struct LedgerCheckpoint<C> {
    last_request_id: u64,
    engine: C,
}

/// Fee-gated public entry point. Allocates ids, drives the engine, records
/// requests and routes fees.
#[derive(Clone, Debug)]
pub struct EntropyOracle<E = ChaosEngine> {
    address: Address,
    admin: Address,
    fee_recipient: Address,
    engine: E,
    last_request_id: u64,
    requests: BTreeMap<u64, EntropyRequest>,
    entered: bool,
}

impl<E: EntropyEngine> EntropyOracle<E> {
    pub fn new(
        address: Address,
        admin: Address,
        fee_recipient: Address,
        engine: E,
    ) -> OracleResult<Self> {
        if address.is_zero()
            || admin.is_zero()
            || fee_recipient.is_zero()
            || engine.address().is_zero()
        {
            return Err(OracleError::InvalidAddress);
        }
        Ok(Self {
            address,
            admin,
            fee_recipient,
            engine,
            last_request_id: 0,
            requests: BTreeMap::new(),
            entered: false,
        })
    }

    /// Pays the fee, derives entropy for `msg.sender` and returns the new
    /// request id. All-or-nothing: any failure restores the chain and ledger
    /// to their state before the call.
    pub fn request_entropy<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        msg: Message,
        tag: &[u8],
    ) -> OracleResult<u64> {
        if self.entered {
            warn!("reentrant entropy request rejected sender={}", msg.sender);
            return Err(OracleError::Reentrancy);
        }
        if msg.value < REQUEST_FEE_WEI {
            return Err(OracleError::InsufficientFee {
                sent: msg.value,
                required: REQUEST_FEE_WEI,
            });
        }

        let chain_checkpoint = chain.checkpoint();
        let ledger_checkpoint = self.checkpoint();
        self.entered = true;
        let result = self.execute_request(chain, msg, tag);
        self.entered = false;
        if let Err(err) = &result {
            warn!("entropy request reverted err={err}");
            chain.revert_to(chain_checkpoint);
            self.restore(ledger_checkpoint);
        }
        chain.end_call();
        result
    }

    fn checkpoint(&self) -> LedgerCheckpoint<E::Checkpoint> {
        LedgerCheckpoint {
            last_request_id: self.last_request_id,
            engine: self.engine.checkpoint(),
        }
    }

    fn restore(&mut self, checkpoint: LedgerCheckpoint<E::Checkpoint>) {
        // Ids are allocated in order, so everything past the checkpoint is new.
        drop(self.requests.split_off(&(checkpoint.last_request_id + 1)));
        self.last_request_id = checkpoint.last_request_id;
        self.engine.restore(checkpoint.engine);
    }

    fn execute_request<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        msg: Message,
        tag: &[u8],
    ) -> OracleResult<u64> {
        chain
            .bank
            .deposit(msg.sender, self.address, msg.value)
            .map_err(|err| match err {
                TransferError::InsufficientBalance {
                    needed, available, ..
                } => OracleError::InsufficientBalance { needed, available },
                other => OracleError::FeeTransferFailed(other),
            })?;

        let request_id = self.last_request_id + 1;
        self.last_request_id = request_id;

        let block = chain.call_context(tag.len());
        let entropy = self.engine.generate_entropy(
            &mut chain.fhe,
            &block,
            self.address,
            tag,
            msg.sender,
            request_id,
        )?;
        self.requests.insert(
            request_id,
            EntropyRequest {
                id: request_id,
                consumer: msg.sender,
                tag: tag.to_vec(),
                entropy,
                timestamp: block.timestamp,
                fulfilled: true,
            },
        );

        // Bookkeeping is committed; only now hand control to recipient code.
        self.forward_fee(chain, msg.value)?;

        let consumer_hash = hash_consumer(&msg.sender);
        let tag_hash = hash_tag(tag);
        chain.emit(OracleEvent::EntropyRequested {
            request_id,
            consumer_hash,
            tag_hash,
            fee_paid: msg.value,
        });
        chain.emit(OracleEvent::EntropyFulfilled {
            request_id,
            consumer_hash,
            tag_hash,
        });
        info!(
            "entropy request fulfilled request_id={request_id} consumer_hash={} block={}",
            hex::encode(&consumer_hash[..8]),
            block.number
        );
        Ok(request_id)
    }

    /// Forwards the whole attached value, overpayment included.
    fn forward_fee<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        amount: u128,
    ) -> OracleResult<()> {
        let recipient = self.fee_recipient;
        match chain.bank.transfer(self.address, recipient, amount) {
            Ok(Delivery::Settled) => Ok(()),
            Ok(Delivery::Callback { tag }) => {
                let reentry = Message::new(recipient).with_value(REQUEST_FEE_WEI);
                self.request_entropy(chain, reentry, &tag)
                    .map(|_| ())
                    .map_err(|err| {
                        OracleError::FeeTransferFailed(TransferError::CallbackReverted {
                            recipient,
                            reason: err.to_string(),
                        })
                    })
            }
            Err(err) => Err(OracleError::FeeTransferFailed(err)),
        }
    }

    pub fn get_encrypted_entropy(&self, request_id: u64) -> OracleResult<FheUint64> {
        self.requests
            .get(&request_id)
            .filter(|request| request.fulfilled)
            .map(|request| request.entropy)
            .ok_or(OracleError::RequestNotFulfilled(request_id))
    }

    pub fn is_request_fulfilled(&self, request_id: u64) -> bool {
        self.requests
            .get(&request_id)
            .map(|request| request.fulfilled)
            .unwrap_or(false)
    }

    pub fn get_request(&self, request_id: u64) -> Option<&EntropyRequest> {
        self.requests.get(&request_id)
    }

    pub fn fee(&self) -> u128 {
        REQUEST_FEE_WEI
    }

    pub fn request_count(&self) -> u64 {
        self.last_request_id
    }

    pub fn set_fee_recipient<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        recipient: Address,
    ) -> OracleResult<()> {
        self.ensure_admin(sender)?;
        if recipient.is_zero() {
            return Err(OracleError::InvalidAddress);
        }
        let previous = std::mem::replace(&mut self.fee_recipient, recipient);
        chain.emit(OracleEvent::FeeRecipientUpdated {
            previous,
            current: recipient,
        });
        info!("fee recipient updated recipient={recipient}");
        Ok(())
    }

    /// Emergency re-pointing to a different engine. Returns the engine that
    /// was replaced.
    pub fn set_chaos_engine<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        engine: E,
    ) -> OracleResult<E> {
        self.ensure_admin(sender)?;
        if engine.address().is_zero() {
            return Err(OracleError::InvalidAddress);
        }
        let current = engine.address();
        let previous = std::mem::replace(&mut self.engine, engine);
        chain.emit(OracleEvent::ChaosEngineUpdated {
            previous: previous.address(),
            current,
        });
        warn!("chaos engine re-pointed engine={current}");
        Ok(previous)
    }

    /// Sweeps the ledger's native balance to `to`.
    ///
    /// Runs under the same guard as [`Self::request_entropy`]: recipient code
    /// that tries to re-enter the ledger reverts the whole sweep.
    pub fn emergency_withdraw<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        to: Address,
    ) -> OracleResult<u128> {
        if self.entered {
            return Err(OracleError::Reentrancy);
        }
        self.ensure_admin(sender)?;
        if to.is_zero() {
            return Err(OracleError::InvalidAddress);
        }

        let checkpoint = chain.checkpoint();
        self.entered = true;
        let result = self.sweep(chain, to);
        self.entered = false;
        if let Err(err) = &result {
            warn!("emergency withdrawal reverted err={err}");
            chain.revert_to(checkpoint);
        }
        chain.end_call();
        result
    }

    fn sweep<F: FheEvaluator>(&mut self, chain: &mut Chain<F>, to: Address) -> OracleResult<u128> {
        let amount = chain.bank.balance_of(&self.address);
        match chain.bank.transfer(self.address, to, amount) {
            Ok(Delivery::Settled) => {}
            Ok(Delivery::Callback { tag }) => {
                let reentry = Message::new(to).with_value(REQUEST_FEE_WEI);
                self.request_entropy(chain, reentry, &tag).map_err(|err| {
                    OracleError::WithdrawFailed(TransferError::CallbackReverted {
                        recipient: to,
                        reason: err.to_string(),
                    })
                })?;
            }
            Err(err) => return Err(OracleError::WithdrawFailed(err)),
        }
        chain.emit(OracleEvent::EmergencyWithdrawal { to, amount });
        warn!("emergency withdrawal to={to} amount={amount}");
        Ok(amount)
    }

    pub fn transfer_admin<F: FheEvaluator>(
        &mut self,
        chain: &mut Chain<F>,
        sender: Address,
        new_admin: Address,
    ) -> OracleResult<()> {
        self.ensure_admin(sender)?;
        if new_admin.is_zero() {
            return Err(OracleError::InvalidAddress);
        }
        let previous = std::mem::replace(&mut self.admin, new_admin);
        chain.emit(OracleEvent::AdminTransferred {
            previous,
            current: new_admin,
        });
        Ok(())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn fee_recipient(&self) -> Address {
        self.fee_recipient
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct access to the engine's own entry points (seeding, caller
    /// authorization). The ledger itself only ever calls `generate_entropy`.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn ensure_admin(&self, sender: Address) -> OracleResult<()> {
        if sender != self.admin {
            return Err(OracleError::Unauthorized);
        }
        Ok(())
    }
}
