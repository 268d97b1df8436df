//! Branch ledger
//!
//! Branches are append-only liquidation epochs. Every tick epoch is owned by
//! the branch that was current when it opened; a branch is retired once a
//! liquidation pass has taken the last debt from every epoch it owns.

use serde::{Deserialize, Serialize};

use crate::constants::{COLD_TICK, FACTOR_ONE, FIRST_BRANCH_ID, ROOT_BRANCH_ID};
use crate::error::{VaultError, VaultResult};
use crate::math::{mul_div, Rounding};
use crate::state::tick::FillFractions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchStatus {
    Active,
    /// Terminal
    Liquidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_id: u32,
    pub connected_branch_id: u32,
    /// Lowest tick of an epoch this branch opened (i32::MAX when none)
    pub min_tick: i32,
    /// Highest tick of an epoch this branch opened (COLD_TICK when none)
    pub max_tick: i32,
    pub status: BranchStatus,
    pub base_debt_factor: u128,
    pub base_collateral_factor: u128,
    /// Owned tick epochs still holding debt
    pub open_ticks: u32,
    pub debt_liquidated: u128,
    pub col_liquidated: u128,
}

impl Branch {
    fn new(branch_id: u32, connected_branch_id: u32) -> Self {
        Self {
            branch_id,
            connected_branch_id,
            min_tick: i32::MAX,
            max_tick: COLD_TICK,
            status: BranchStatus::Active,
            base_debt_factor: FACTOR_ONE,
            base_collateral_factor: FACTOR_ONE,
            open_ticks: 0,
            debt_liquidated: 0,
            col_liquidated: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BranchStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchLedger {
    branches: Vec<Branch>,
}

impl Default for BranchLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchLedger {
    /// Root sentinel plus the first working branch
    pub fn new() -> Self {
        Self {
            branches: vec![
                Branch::new(ROOT_BRANCH_ID, ROOT_BRANCH_ID),
                Branch::new(FIRST_BRANCH_ID, ROOT_BRANCH_ID),
            ],
        }
    }

    pub fn total_branch_id(&self) -> u32 {
        self.branches.len().saturating_sub(1) as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = &Branch> {
        self.branches.iter()
    }

    pub fn get(&self, branch_id: u32) -> VaultResult<&Branch> {
        self.branches
            .get(branch_id as usize)
            .ok_or(VaultError::BranchNotFound(branch_id))
    }

    fn get_mut(&mut self, branch_id: u32) -> VaultResult<&mut Branch> {
        self.branches
            .get_mut(branch_id as usize)
            .ok_or(VaultError::BranchNotFound(branch_id))
    }

    /// Append a new Active branch connected to `fork_from`
    pub fn create_branch(&mut self, fork_from: u32) -> VaultResult<u32> {
        self.get(fork_from)?;
        let branch_id = u32::try_from(self.branches.len()).map_err(|_| VaultError::MathOverflow)?;
        self.branches.push(Branch::new(branch_id, fork_from));
        log::info!("branch {} created from {}", branch_id, fork_from);
        Ok(branch_id)
    }

    /// Lineage of `start` up to (not including) the root, nearest first.
    ///
    /// Each branch may be visited once; a revisit means the connections form
    /// a cycle.
    pub fn merge_walk(&self, start: u32) -> VaultResult<Vec<u32>> {
        let mut visited = vec![false; self.branches.len()];
        let mut path = Vec::new();
        let mut cur = start;

        while cur != ROOT_BRANCH_ID {
            let branch = self.get(cur)?;
            let seen = &mut visited[cur as usize];
            if *seen {
                return Err(VaultError::BranchCycle(cur));
            }
            *seen = true;
            path.push(cur);
            cur = branch.connected_branch_id;
        }
        Ok(path)
    }

    /// A tick epoch opened under `branch_id`
    pub fn track_tick(&mut self, branch_id: u32, tick: i32) -> VaultResult<()> {
        let branch = self.get_mut(branch_id)?;
        branch.open_ticks = branch.open_ticks.checked_add(1).ok_or(VaultError::MathOverflow)?;
        branch.min_tick = branch.min_tick.min(tick);
        branch.max_tick = branch.max_tick.max(tick);
        Ok(())
    }

    /// A tick epoch owned by `branch_id` closed. When the last one goes by
    /// liquidation the branch is retired; returns true in that case.
    pub fn release_tick(&mut self, branch_id: u32, by_liquidation: bool) -> VaultResult<bool> {
        let branch = self.get_mut(branch_id)?;
        branch.open_ticks = branch.open_ticks.checked_sub(1).ok_or(VaultError::Underflow)?;

        if branch.open_ticks == 0 && by_liquidation && branch_id != ROOT_BRANCH_ID {
            branch.status = BranchStatus::Liquidated;
            log::info!("branch {} liquidated", branch_id);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn record_liquidation(&mut self, branch_id: u32, debt: u128, col: u128) -> VaultResult<()> {
        let branch = self.get_mut(branch_id)?;
        branch.debt_liquidated = branch.debt_liquidated.saturating_add(debt);
        branch.col_liquidated = branch.col_liquidated.saturating_add(col);
        Ok(())
    }

    /// Fold a partial fill of one of the branch's ticks into its base factors.
    /// Audit aggregate only: positions realize against their tick's factors.
    pub fn scale_base_factors(&mut self, branch_id: u32, f: &FillFractions) -> VaultResult<()> {
        let branch = self.get_mut(branch_id)?;
        branch.base_debt_factor =
            mul_div(branch.base_debt_factor, f.debt_kept, f.debt_before, Rounding::Down)?;
        if f.col_before > 0 {
            branch.base_collateral_factor =
                mul_div(branch.base_collateral_factor, f.col_kept, f.col_before, Rounding::Down)?;
        }
        Ok(())
    }
}
