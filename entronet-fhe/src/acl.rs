//! Capability relation between ciphertext handles and the principals allowed
//! to decrypt or further combine them.
//!
//! Two tiers are tracked: persistent grants survive the current call and are
//! the only ones honoured by decryption, transient grants belong to whoever
//! produced a value and vanish when the enclosing transaction ends.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Address, Handle};

#[derive(Clone, Debug, Default)]
pub struct AccessControlList {
    persistent: BTreeMap<Handle, BTreeSet<Address>>,
    transient: BTreeSet<(Handle, Address)>,
}

impl AccessControlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the grant is new.
    pub fn allow(&mut self, handle: Handle, principal: Address) -> bool {
        self.persistent.entry(handle).or_default().insert(principal)
    }

    /// Returns `true` if the allowance is new.
    pub fn allow_transient(&mut self, handle: Handle, principal: Address) -> bool {
        self.transient.insert((handle, principal))
    }

    pub fn revoke(&mut self, handle: &Handle, principal: &Address) {
        if let Some(principals) = self.persistent.get_mut(handle) {
            principals.remove(principal);
            if principals.is_empty() {
                self.persistent.remove(handle);
            }
        }
    }

    pub fn revoke_transient(&mut self, handle: Handle, principal: Address) {
        self.transient.remove(&(handle, principal));
    }

    pub fn is_allowed(&self, handle: &Handle, principal: &Address) -> bool {
        self.persistent
            .get(handle)
            .map(|principals| principals.contains(principal))
            .unwrap_or(false)
    }

    /// Persistent or transient access, i.e. whether `principal` may use the
    /// handle as an operand right now.
    pub fn can_use(&self, handle: &Handle, principal: &Address) -> bool {
        self.is_allowed(handle, principal) || self.transient.contains(&(*handle, *principal))
    }

    pub fn principals(&self, handle: &Handle) -> BTreeSet<Address> {
        self.persistent.get(handle).cloned().unwrap_or_default()
    }

    pub fn clear_transient(&mut self) -> usize {
        let dropped = self.transient.len();
        self.transient.clear();
        dropped
    }
}
