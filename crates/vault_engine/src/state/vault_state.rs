//! Aggregate vault state

use serde::{Deserialize, Serialize};

use crate::constants::{COLD_TICK, FIRST_BRANCH_ID};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub vault_id: u16,
    /// Highest tick holding debt, COLD_TICK when none
    pub topmost_tick: i32,
    pub current_branch_id: u32,
    pub total_branch_id: u32,
    pub next_position_id: u32,
    pub total_positions: u32,
    /// Raw collateral held for positions
    pub total_supply: u128,
    /// Raw gross debt across ticks
    pub total_borrow: u128,
    /// Debt written off by absorb and dust cleanup
    pub absorbed_debt: u128,
    /// Collateral kept by the vault against absorbed debt
    pub absorbed_col: u128,
}

impl VaultState {
    pub fn new(vault_id: u16) -> Self {
        Self {
            vault_id,
            topmost_tick: COLD_TICK,
            current_branch_id: FIRST_BRANCH_ID,
            total_branch_id: FIRST_BRANCH_ID,
            next_position_id: 1,
            total_positions: 0,
            total_supply: 0,
            total_borrow: 0,
            absorbed_debt: 0,
            absorbed_col: 0,
        }
    }

    pub fn has_debt(&self) -> bool {
        self.topmost_tick != COLD_TICK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_vault_state() {
        let s = VaultState::new(7);
        assert_eq!(s.vault_id, 7);
        assert_eq!(s.topmost_tick, COLD_TICK);
        assert_eq!(s.current_branch_id, 1);
        assert_eq!(s.next_position_id, 1);
        assert!(!s.has_debt());
    }
}
