//! In-process stand-in for the execution environment the ledger runs on:
//! block context, FHE host, native balances and the event log.
//!
//! Every state change made inside a call is journaled, so a failing top-level
//! call reverts to a [`ChainCheckpoint`] at a cost proportional to what the
//! call itself touched.

use std::collections::BTreeMap;

use entronet_chaos::{BlockContext, BlockProducer};
use entronet_fhe::{Address, FheEvaluator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::OracleResult, events::OracleEvent};

/// Base cost charged before a call starts executing.
pub const INTRINSIC_GAS: u64 = 21_000;
/// Cost per byte of call data.
pub const CALLDATA_BYTE_GAS: u64 = 16;

/// Sender and attached native value of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message {
    pub sender: Address,
    pub value: u128,
}

impl Message {
    pub fn new(sender: Address) -> Self {
        Self { sender, value: 0 }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// What happens when an account receives native value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecipientBehavior {
    #[default]
    Accept,
    Reject,
    /// Recipient code tries to open a new entropy request from inside the
    /// transfer.
    ReenterRequest { tag: Vec<u8> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{account} holds {available} wei, needs {needed}")]
    InsufficientBalance {
        account: Address,
        needed: u128,
        available: u128,
    },
    #[error("recipient {recipient} rejected the transfer")]
    Rejected { recipient: Address },
    #[error("recipient {recipient} reverted during callback: {reason}")]
    CallbackReverted { recipient: Address, reason: String },
}

/// Outcome of a transfer that was not rejected outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Settled,
    /// Funds moved and the recipient's code now runs; the caller must execute
    /// it before the transfer counts as complete.
    Callback { tag: Vec<u8> },
}

#[derive(Clone, Debug, Default)]
pub struct Bank {
    balances: BTreeMap<Address, u128>,
    behaviors: BTreeMap<Address, RecipientBehavior>,
    /// Previous balance of every write since the last commit.
    journal: Vec<(Address, Option<u128>)>,
}

impl Bank {
    pub fn mint(&mut self, account: Address, amount: u128) {
        let balance = self.balance_of(&account).saturating_add(amount);
        self.write(account, balance);
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn set_behavior(&mut self, account: Address, behavior: RecipientBehavior) {
        self.behaviors.insert(account, behavior);
    }

    pub fn behavior(&self, account: &Address) -> RecipientBehavior {
        self.behaviors.get(account).cloned().unwrap_or_default()
    }

    /// Moves value attached to a call into the callee. No recipient code runs.
    pub fn deposit(&mut self, from: Address, to: Address, amount: u128) -> Result<(), TransferError> {
        self.debit(from, amount)?;
        self.mint(to, amount);
        Ok(())
    }

    /// External value transfer that honours the recipient's behaviour.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<Delivery, TransferError> {
        let behavior = self.behavior(&to);
        if behavior == RecipientBehavior::Reject {
            return Err(TransferError::Rejected { recipient: to });
        }
        self.debit(from, amount)?;
        self.mint(to, amount);
        match behavior {
            RecipientBehavior::ReenterRequest { tag } => Ok(Delivery::Callback { tag }),
            _ => Ok(Delivery::Settled),
        }
    }

    fn debit(&mut self, account: Address, amount: u128) -> Result<(), TransferError> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                account,
                needed: amount,
                available,
            });
        }
        self.write(account, available - amount);
        Ok(())
    }

    fn write(&mut self, account: Address, balance: u128) {
        let previous = self.balances.insert(account, balance);
        self.journal.push((account, previous));
    }

    pub fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    /// Restores every balance written after `checkpoint`.
    pub fn revert_to(&mut self, checkpoint: usize) {
        while self.journal.len() > checkpoint {
            let Some((account, previous)) = self.journal.pop() else {
                break;
            };
            match previous {
                Some(balance) => self.balances.insert(account, balance),
                None => self.balances.remove(&account),
            };
        }
    }

    /// Makes every journaled write permanent.
    pub fn commit(&mut self) {
        self.journal.clear();
    }
}

/// Undo position across the FHE host, balances and the event log.
#[derive(Clone, Debug)]
pub struct ChainCheckpoint<C> {
    fhe: C,
    bank: usize,
    events: usize,
}

#[derive(Clone, Debug)]
pub struct Chain<F> {
    blocks: BlockProducer,
    pub fhe: F,
    pub bank: Bank,
    events: Vec<OracleEvent>,
    gas_limit: u64,
}

impl<F: FheEvaluator> Chain<F> {
    pub fn new(fhe: F, blocks: BlockProducer, gas_limit: u64) -> Self {
        Self {
            blocks,
            fhe,
            bank: Bank::default(),
            events: Vec::new(),
            gas_limit,
        }
    }

    pub fn block(&self) -> &BlockContext {
        self.blocks.current()
    }

    pub fn advance_block(&mut self) -> OracleResult<&BlockContext> {
        Ok(self.blocks.advance()?)
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Block context as seen from inside a call carrying `calldata_len` bytes.
    pub fn call_context(&self, calldata_len: usize) -> BlockContext {
        let intrinsic = INTRINSIC_GAS + CALLDATA_BYTE_GAS * calldata_len as u64;
        self.block()
            .clone()
            .with_gas_left(self.gas_limit.saturating_sub(intrinsic))
    }

    pub fn emit(&mut self, event: OracleEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[OracleEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<OracleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn checkpoint(&self) -> ChainCheckpoint<F::Checkpoint> {
        ChainCheckpoint {
            fhe: self.fhe.checkpoint(),
            bank: self.bank.checkpoint(),
            events: self.events.len(),
        }
    }

    /// Undoes everything the current call did after `checkpoint`.
    pub fn revert_to(&mut self, checkpoint: ChainCheckpoint<F::Checkpoint>) {
        self.fhe.revert_to(checkpoint.fhe);
        self.bank.revert_to(checkpoint.bank);
        self.events.truncate(checkpoint.events);
    }

    /// Closes the current top-level call. Checkpoints taken inside it can no
    /// longer be reverted to.
    pub fn end_call(&mut self) {
        self.bank.commit();
        self.fhe.end_transaction();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_value_and_respects_behaviour() {
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        let mut bank = Bank::default();
        bank.mint(alice, 100);

        assert_eq!(bank.transfer(alice, bob, 40).unwrap(), Delivery::Settled);
        assert_eq!(bank.balance_of(&alice), 60);
        assert_eq!(bank.balance_of(&bob), 40);

        bank.set_behavior(bob, RecipientBehavior::Reject);
        assert_eq!(
            bank.transfer(alice, bob, 10).unwrap_err(),
            TransferError::Rejected { recipient: bob }
        );
        assert_eq!(bank.balance_of(&alice), 60);
    }

    #[test]
    fn overdraft_is_refused() {
        let alice = Address::derive("alice");
        let mut bank = Bank::default();
        bank.mint(alice, 5);
        assert!(matches!(
            bank.deposit(alice, Address::derive("x"), 6),
            Err(TransferError::InsufficientBalance { needed: 6, available: 5, .. })
        ));
    }

    #[test]
    fn bank_reverts_writes_after_checkpoint() {
        let alice = Address::derive("alice");
        let bob = Address::derive("bob");
        let mut bank = Bank::default();
        bank.mint(alice, 10);
        let checkpoint = bank.checkpoint();

        bank.transfer(alice, bob, 4).unwrap();
        bank.mint(bob, 1);
        bank.revert_to(checkpoint);
        assert_eq!(bank.balance_of(&alice), 10);
        assert_eq!(bank.balance_of(&bob), 0);

        bank.commit();
        assert_eq!(bank.checkpoint(), 0);
    }

    #[test]
    fn reentering_recipient_requests_callback() {
        let alice = Address::derive("alice");
        let hook = Address::derive("hook");
        let mut bank = Bank::default();
        bank.mint(alice, 1);
        bank.set_behavior(hook, RecipientBehavior::ReenterRequest { tag: b"again".to_vec() });
        assert_eq!(
            bank.transfer(alice, hook, 1).unwrap(),
            Delivery::Callback {
                tag: b"again".to_vec()
            }
        );
    }
}
