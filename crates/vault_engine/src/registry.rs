//! Vault registry: many vaults, one lock each
//!
//! Calls on the same vault serialize on its mutex; calls on different vaults
//! run in parallel. A vault that hits an invariant violation is poisoned and
//! refuses every later call.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::VaultConfig;
use crate::engine::{LiquidationReceipt, PositionSnapshot, Vault};
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::market::{ComputeBudget, Market};
use crate::state::Address;

struct VaultSlot {
    vault: Vault,
    poisoned: bool,
}

#[derive(Default)]
pub struct VaultRegistry {
    vaults: HashMap<u16, Mutex<VaultSlot>>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vault built from `config`
    pub fn register(&mut self, config: VaultConfig) -> VaultResult<u16> {
        let vault_id = config.vault_id;
        if self.vaults.contains_key(&vault_id) {
            return Err(VaultError::InvalidConfig(format!("vault {} already registered", vault_id)));
        }
        let vault = Vault::new(config)?;
        self.insert(vault);
        Ok(vault_id)
    }

    /// Register a restored vault, replacing any vault with the same id
    pub fn insert(&mut self, vault: Vault) {
        let vault_id = vault.id();
        log::info!("vault {} registered", vault_id);
        self.vaults.insert(vault_id, Mutex::new(VaultSlot { vault, poisoned: false }));
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    pub fn is_poisoned(&self, vault_id: u16) -> VaultResult<bool> {
        let slot = self.vaults.get(&vault_id).ok_or(VaultError::VaultNotFound(vault_id))?;
        let poisoned = slot.lock().poisoned;
        Ok(poisoned)
    }

    /// Run `f` with exclusive access to a healthy vault, poisoning it when
    /// `f` fails with an invariant violation
    fn with_vault<T>(&self, vault_id: u16, f: impl FnOnce(&mut Vault) -> VaultResult<T>) -> VaultResult<T> {
        let slot = self.vaults.get(&vault_id).ok_or(VaultError::VaultNotFound(vault_id))?;
        let mut slot = slot.lock();
        if slot.poisoned {
            return Err(VaultError::VaultPoisoned(vault_id));
        }

        let result = f(&mut slot.vault);
        if let Err(e) = &result {
            if e.is_fatal() {
                slot.poisoned = true;
                log::error!("vault {} poisoned: {}", vault_id, e);
            }
        }
        result
    }

    /// Read-only access to a vault, poisoned or not
    pub fn inspect<T>(&self, vault_id: u16, f: impl FnOnce(&Vault) -> T) -> VaultResult<T> {
        let slot = self.vaults.get(&vault_id).ok_or(VaultError::VaultNotFound(vault_id))?;
        let slot = slot.lock();
        Ok(f(&slot.vault))
    }

    pub fn operate(
        &self,
        vault_id: u16,
        position_id: u32,
        signer: Address,
        delta_col: i128,
        delta_debt: i128,
        market: &Market<'_>,
    ) -> VaultResult<PositionSnapshot> {
        self.with_vault(vault_id, |v| v.operate(position_id, signer, delta_col, delta_debt, market))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &self,
        vault_id: u16,
        signer: Address,
        recipient: Address,
        requested_debt: u128,
        min_col_per_debt: u128,
        absorb: bool,
        market: &Market<'_>,
        budget: &mut dyn ComputeBudget,
    ) -> VaultResult<LiquidationReceipt> {
        self.with_vault(vault_id, |v| {
            v.liquidate(signer, recipient, requested_debt, min_col_per_debt, absorb, market, budget)
        })
    }

    /// Audit a vault's ledgers; a failed audit poisons it
    pub fn check(&self, vault_id: u16) -> VaultResult<()> {
        self.with_vault(vault_id, |v| crate::invariants::check_invariants(v))
    }

    pub fn drain_events(&self, vault_id: u16) -> VaultResult<Vec<VaultEvent>> {
        let slot = self.vaults.get(&vault_id).ok_or(VaultError::VaultNotFound(vault_id))?;
        let events = slot.lock().vault.drain_events();
        Ok(events)
    }

    /// Test hook: run an arbitrary mutation through the poisoning path
    #[cfg(test)]
    fn run<T>(&self, vault_id: u16, f: impl FnOnce(&mut Vault) -> VaultResult<T>) -> VaultResult<T> {
        self.with_vault(vault_id, f)
    }
}
