//! Tick ledger: aggregated debt and collateral per tick, slot epochs and
//! the closure records that resolve positions left in a closed epoch

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::FACTOR_ONE;
use crate::error::{VaultError, VaultResult};
use crate::math::{mul_div, sub_u128, add_u128, Rounding};
use crate::state::bitmap::TickHasDebtBitmap;

/// How a tick epoch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureKind {
    /// Debt fully taken by a liquidator
    Liquidated,
    /// Debt written off into the vault's absorbed totals
    Absorbed,
    /// Emptied by operate; remaining positions keep their collateral
    Drained,
}

/// Record of a closed epoch, slots `epoch_start..epoch_end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClosure {
    pub epoch_start: u32,
    pub epoch_end: u32,
    pub branch_id: u32,
    pub kind: ClosureKind,
    pub debt_factor: u128,
    pub col_factor: u128,
}

impl EpochClosure {
    pub fn contains(&self, slot: u32) -> bool {
        self.epoch_start <= slot && slot < self.epoch_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub tick: i32,
    /// Sum of gross debt of the current epoch
    pub raw_debt: u128,
    pub raw_col: u128,
    /// Slots allocated so far; slots start at 1
    pub total_ids: u32,
    /// First slot of the current epoch
    pub epoch_start: u32,
    /// Branch that owns the current epoch
    pub branch_id: u32,
    pub debt_factor: u128,
    pub col_factor: u128,
    /// Current epoch is open (has taken debt and not been closed)
    pub epoch_open: bool,
}

impl Tick {
    fn new(tick: i32) -> Self {
        Self {
            tick,
            raw_debt: 0,
            raw_col: 0,
            total_ids: 0,
            epoch_start: 1,
            branch_id: 0,
            debt_factor: FACTOR_ONE,
            col_factor: FACTOR_ONE,
            epoch_open: false,
        }
    }

    /// Slot belongs to the current epoch
    pub fn is_live_slot(&self, slot: u32) -> bool {
        self.epoch_open && slot >= self.epoch_start && slot <= self.total_ids
    }
}

/// Fractions surviving a partial fill, as (kept, before) pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillFractions {
    pub debt_kept: u128,
    pub debt_before: u128,
    pub col_kept: u128,
    pub col_before: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickLedger {
    ticks: BTreeMap<i32, Tick>,
    closures: BTreeMap<i32, Vec<EpochClosure>>,
    bitmap: TickHasDebtBitmap,
}

impl TickLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tick: i32) -> Option<&Tick> {
        self.ticks.get(&tick)
    }

    pub fn bitmap(&self) -> &TickHasDebtBitmap {
        &self.bitmap
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tick> {
        self.ticks.values()
    }

    pub fn raw_debt(&self, tick: i32) -> u128 {
        self.ticks.get(&tick).map(|t| t.raw_debt).unwrap_or(0)
    }

    pub fn total_debt(&self) -> u128 {
        self.ticks.values().fold(0u128, |acc, t| acc.saturating_add(t.raw_debt))
    }

    fn entry(&mut self, tick: i32) -> VaultResult<&mut Tick> {
        crate::math::TickMath::ratio_at_tick(tick)?;
        Ok(self.ticks.entry(tick).or_insert_with(|| Tick::new(tick)))
    }

    fn existing(&mut self, tick: i32) -> VaultResult<&mut Tick> {
        self.ticks.get_mut(&tick).ok_or(VaultError::Underflow)
    }

    /// Add debt and collateral, opening a fresh epoch owned by `branch_id`
    /// when the tick has none. Returns true when an epoch was opened.
    pub fn add_debt(&mut self, tick: i32, debt: u128, col: u128, branch_id: u32) -> VaultResult<bool> {
        let t = self.entry(tick)?;
        let opened = !t.epoch_open;
        if opened {
            t.epoch_open = true;
            t.epoch_start = t.total_ids + 1;
            t.branch_id = branch_id;
            t.debt_factor = FACTOR_ONE;
            t.col_factor = FACTOR_ONE;
        }
        let was_empty = t.raw_debt == 0;
        t.raw_debt = add_u128(t.raw_debt, debt)?;
        t.raw_col = add_u128(t.raw_col, col)?;
        let now_set = t.raw_debt > 0;

        if was_empty && now_set {
            self.bitmap.set_bit(tick)?;
        }
        Ok(opened)
    }

    /// Remove debt and collateral; the caller clamps to what the tick holds
    pub fn remove_debt(&mut self, tick: i32, debt: u128, col: u128) -> VaultResult<()> {
        let t = self.existing(tick)?;
        let raw_debt = sub_u128(t.raw_debt, debt)?;
        let raw_col = sub_u128(t.raw_col, col)?;
        t.raw_debt = raw_debt;
        t.raw_col = raw_col;
        let cleared = raw_debt == 0;

        if cleared {
            self.bitmap.clear_bit(tick)?;
        }
        Ok(())
    }

    /// Next slot for a position entering the tick
    pub fn allocate_slot(&mut self, tick: i32) -> VaultResult<u32> {
        let t = self.entry(tick)?;
        t.total_ids = t.total_ids.checked_add(1).ok_or(VaultError::MathOverflow)?;
        Ok(t.total_ids)
    }

    /// Close the current epoch: record it, zero the tick and start the next
    /// epoch after every slot allocated so far
    pub fn close_epoch(&mut self, tick: i32, kind: ClosureKind) -> VaultResult<EpochClosure> {
        let t = self.existing(tick)?;
        let closure = EpochClosure {
            epoch_start: t.epoch_start,
            epoch_end: t.total_ids + 1,
            branch_id: t.branch_id,
            kind,
            debt_factor: t.debt_factor,
            col_factor: t.col_factor,
        };

        t.raw_debt = 0;
        t.raw_col = 0;
        t.epoch_open = false;
        t.epoch_start = t.total_ids + 1;
        t.debt_factor = FACTOR_ONE;
        t.col_factor = FACTOR_ONE;

        self.closures.entry(tick).or_default().push(closure);
        self.bitmap.clear_bit(tick)?;

        log::debug!(
            "tick {} epoch {}..{} closed ({:?})",
            tick, closure.epoch_start, closure.epoch_end, kind
        );
        Ok(closure)
    }

    /// Take `debt_out`/`col_out` from a tick that keeps some debt, scaling
    /// its factors by the surviving fractions
    pub fn apply_partial_fill(&mut self, tick: i32, debt_out: u128, col_out: u128) -> VaultResult<FillFractions> {
        let t = self.existing(tick)?;
        if debt_out >= t.raw_debt {
            return Err(VaultError::Underflow);
        }
        let fractions = FillFractions {
            debt_kept: t.raw_debt - debt_out,
            debt_before: t.raw_debt,
            col_kept: sub_u128(t.raw_col, col_out)?,
            col_before: t.raw_col,
        };

        t.debt_factor = mul_div(t.debt_factor, fractions.debt_kept, fractions.debt_before, Rounding::Down)?;
        if fractions.col_before > 0 {
            t.col_factor = mul_div(t.col_factor, fractions.col_kept, fractions.col_before, Rounding::Down)?;
        }
        t.raw_debt = fractions.debt_kept;
        t.raw_col = fractions.col_kept;
        Ok(fractions)
    }

    /// Closure covering a slot of a closed epoch
    pub fn closure_for(&self, tick: i32, slot: u32) -> Option<&EpochClosure> {
        let closures = self.closures.get(&tick)?;
        let idx = closures.partition_point(|c| c.epoch_end <= slot);
        closures.get(idx).filter(|c| c.contains(slot))
    }

    pub fn closures(&self, tick: i32) -> &[EpochClosure] {
        self.closures.get(&tick).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COLD_TICK;

    #[test]
    fn test_add_remove_toggles_bitmap() {
        let mut ledger = TickLedger::new();
        assert!(ledger.add_debt(-611, 400, 1000, 1).unwrap());
        assert!(ledger.bitmap().is_set(-611));
        assert!(!ledger.add_debt(-611, 100, 200, 1).unwrap());

        ledger.remove_debt(-611, 300, 700).unwrap();
        assert!(ledger.bitmap().is_set(-611));
        assert_eq!(ledger.raw_debt(-611), 200);

        ledger.remove_debt(-611, 200, 500).unwrap();
        assert!(!ledger.bitmap().is_set(-611));
        assert_eq!(ledger.bitmap().highest_tick_with_debt(), COLD_TICK);
    }

    #[test]
    fn test_remove_more_than_held_underflows() {
        let mut ledger = TickLedger::new();
        ledger.add_debt(5, 10, 10, 1).unwrap();
        assert_eq!(ledger.remove_debt(5, 11, 0), Err(VaultError::Underflow));
        assert_eq!(ledger.remove_debt(6, 1, 0), Err(VaultError::Underflow));
        // failed removal leaves the tick untouched
        assert_eq!(ledger.raw_debt(5), 10);
    }

    #[test]
    fn test_slots_never_reused_across_epochs() {
        let mut ledger = TickLedger::new();
        ledger.add_debt(0, 10, 20, 1).unwrap();
        let a = ledger.allocate_slot(0).unwrap();
        let b = ledger.allocate_slot(0).unwrap();
        assert_eq!((a, b), (1, 2));

        let closure = ledger.close_epoch(0, ClosureKind::Liquidated).unwrap();
        assert_eq!((closure.epoch_start, closure.epoch_end), (1, 3));

        ledger.add_debt(0, 5, 5, 2).unwrap();
        let c = ledger.allocate_slot(0).unwrap();
        assert_eq!(c, 3);
        let t = ledger.get(0).unwrap();
        assert_eq!(t.epoch_start, 3);
        assert_eq!(t.branch_id, 2);
        assert!(t.is_live_slot(3));
        assert!(!t.is_live_slot(2));

        assert_eq!(ledger.closure_for(0, 1).unwrap().kind, ClosureKind::Liquidated);
        assert_eq!(ledger.closure_for(0, 2).unwrap().branch_id, 1);
        assert!(ledger.closure_for(0, 3).is_none());
    }

    #[test]
    fn test_partial_fill_scales_factors() {
        let mut ledger = TickLedger::new();
        ledger.add_debt(100, 1_000, 2_000, 1).unwrap();
        let f = ledger.apply_partial_fill(100, 250, 500).unwrap();
        assert_eq!(f.debt_kept, 750);
        assert_eq!(f.col_kept, 1_500);

        let t = ledger.get(100).unwrap();
        assert_eq!(t.debt_factor, FACTOR_ONE / 4 * 3);
        assert_eq!(t.col_factor, FACTOR_ONE / 4 * 3);
        assert!(ledger.bitmap().is_set(100));

        // a fill that would empty the tick must close it instead
        assert_eq!(ledger.apply_partial_fill(100, 750, 0), Err(VaultError::Underflow));
    }

    #[test]
    fn test_close_resets_factors_and_records_them() {
        let mut ledger = TickLedger::new();
        ledger.add_debt(7, 100, 100, 1).unwrap();
        ledger.allocate_slot(7).unwrap();
        ledger.apply_partial_fill(7, 50, 50).unwrap();
        let closure = ledger.close_epoch(7, ClosureKind::Drained).unwrap();
        assert_eq!(closure.col_factor, FACTOR_ONE / 2);

        let t = ledger.get(7).unwrap();
        assert_eq!(t.debt_factor, FACTOR_ONE);
        assert_eq!(t.raw_col, 0);
        assert!(!t.epoch_open);
        assert!(!ledger.bitmap().is_set(7));
    }
}
