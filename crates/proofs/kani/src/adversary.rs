//! Adversarial operate sequences against a single vault

use vault_engine::{
    Address, FixedPrice, Market, PositionSnapshot, StaticLiquidity, Vault, VaultConfig, VaultResult,
    NEW_POSITION_ID,
};

use crate::sanitizer::{OperateInput, Sanitize, N_USERS};

/// A vault plus the last position each user opened
pub struct Harness {
    pub vault: Vault,
    owned: [u32; N_USERS],
}

impl Harness {
    pub fn new() -> VaultResult<Self> {
        let vault = Vault::new(VaultConfig::default())?;
        Ok(Self { vault, owned: [NEW_POSITION_ID; N_USERS] })
    }

    pub fn user(index: u8) -> Address {
        Address::repeat(index + 1)
    }

    /// Sanitize `input` and run it against the user's position, opening one
    /// when the user has none
    pub fn step(&mut self, input: OperateInput, oracle: FixedPrice) -> VaultResult<PositionSnapshot> {
        let input = input.sanitize();
        let liq = StaticLiquidity::default();
        let market = Market::new(&oracle, &liq);
        let slot = input.user as usize;

        let snap = self.vault.operate(
            self.owned[slot],
            Self::user(input.user),
            input.delta_col,
            input.delta_debt,
            &market,
        )?;
        self.owned[slot] = snap.position_id;
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_engine::invariants::check_invariants;

    #[test]
    fn test_step_reuses_position() {
        let mut h = Harness::new().unwrap();
        let open = h
            .step(OperateInput { user: 0, delta_col: 10_000_000, delta_debt: 1_000_000 }, FixedPrice::PARITY)
            .unwrap();
        let more = h
            .step(OperateInput { user: 0, delta_col: 5_000_000, delta_debt: 0 }, FixedPrice::PARITY)
            .unwrap();
        assert_eq!(open.position_id, more.position_id);
        assert_eq!(h.vault.state().total_positions, 1);
        assert!(check_invariants(&h.vault).is_ok());
    }

    #[test]
    fn test_rejected_step_leaves_vault_alone() {
        let mut h = Harness::new().unwrap();
        let before = h.vault.clone();
        // nothing to withdraw from a fresh position
        assert!(h
            .step(OperateInput { user: 1, delta_col: -5_000, delta_debt: 0 }, FixedPrice::PARITY)
            .is_err());
        assert_eq!(h.vault, before);
    }
}
