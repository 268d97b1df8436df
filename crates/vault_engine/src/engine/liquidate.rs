//! Liquidation walker
//!
//! Walks ticks downward from the topmost tick. Ticks past the liquidation
//! max limit are bad debt and get absorbed; ticks past the liquidation
//! threshold are filled at their own collateral/debt ratio until the
//! requested debt is covered. Planning is read-only; commit applies the plan.

use arrayvec::ArrayVec;

use crate::constants::*;
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::market::{Asset, ComputeBudget, Market, MarketSnapshot, Party, Transfer};
use crate::math::*;
use crate::state::*;

use super::{ThresholdTicks, Vault};

/// What one tick contributes to a liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickFill {
    pub tick: i32,
    /// Branch owning the tick's epoch
    pub branch_id: u32,
    /// Raw debt repaid by the liquidator
    pub debt_taken: u128,
    /// Raw collateral paid out to the liquidator
    pub col_taken: u128,
    /// Raw debt and collateral written off into the vault's absorbed totals
    pub debt_absorbed: u128,
    pub col_absorbed: u128,
    /// Closing kind when the epoch ends, None for a partial fill
    pub closes: Option<ClosureKind>,
}

/// Liquidation plan: the ticks to touch and their totals
#[derive(Debug, Clone, Default)]
pub struct LiquidationPlan {
    pub fills: ArrayVec<TickFill, MAX_LIQUIDATION_TICKS>,
    pub debt_raw: u128,
    pub col_raw: u128,
    pub debt_absorbed: u128,
    pub col_absorbed: u128,
    pub start_tick: i32,
    pub end_tick: i32,
    /// Stopped early on budget or plan capacity; call again to continue
    pub partial: bool,
}

impl LiquidationPlan {
    fn new(start_tick: i32) -> Self {
        Self {
            start_tick,
            end_tick: start_tick,
            ..Self::default()
        }
    }

    /// Add a tick to the plan
    fn add_fill(&mut self, fill: TickFill) -> VaultResult<()> {
        self.fills.try_push(fill).map_err(|_| VaultError::MathOverflow)?;
        self.debt_raw = add_u128(self.debt_raw, fill.debt_taken)?;
        self.col_raw = add_u128(self.col_raw, fill.col_taken)?;
        self.debt_absorbed = add_u128(self.debt_absorbed, fill.debt_absorbed)?;
        self.col_absorbed = add_u128(self.col_absorbed, fill.col_absorbed)?;
        self.end_tick = fill.tick;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }
}

/// Outcome of a liquidate call (or a preview of one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationReceipt {
    /// Debt tokens the liquidator pays
    pub debt_amount: u128,
    /// Collateral tokens the recipient receives
    pub col_amount: u128,
    pub debt_raw: u128,
    pub col_raw: u128,
    pub debt_absorbed: u128,
    pub col_absorbed: u128,
    pub start_tick: i32,
    pub end_tick: i32,
    pub ticks_touched: usize,
    pub partial: bool,
    pub transfers: Vec<Transfer>,
}

impl Vault {
    /// Liquidate up to `requested_debt` debt tokens from ticks above the
    /// liquidation threshold, paying out collateral to `recipient`.
    ///
    /// With `absorb` every tick above the threshold is written off instead
    /// and `requested_debt` may be zero.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        signer: Address,
        recipient: Address,
        requested_debt: u128,
        min_col_per_debt: u128,
        absorb: bool,
        market: &Market<'_>,
        budget: &mut dyn ComputeBudget,
    ) -> VaultResult<LiquidationReceipt> {
        let snapshot = market.snapshot()?;
        let plan = self.plan_liquidation(requested_debt, absorb, &snapshot, budget)?;
        let receipt = self.receipt(&plan, &snapshot, signer, recipient)?;

        if receipt.debt_raw > 0 {
            let col_per_debt = mul_div(receipt.col_amount, COL_PER_DEBT_PRECISION, receipt.debt_amount, Rounding::Down)?;
            if col_per_debt < min_col_per_debt {
                return Err(VaultError::SlippageExceeded);
            }
        }

        self.commit_liquidation(&plan)?;

        if receipt.debt_raw > 0 {
            self.emit(VaultEvent::Liquidate {
                col_amount: receipt.col_amount,
                debt_amount: receipt.debt_amount,
                signer,
                recipient,
            });
        }
        if receipt.debt_absorbed > 0 || receipt.col_absorbed > 0 {
            self.emit(VaultEvent::Absorb {
                debt_absorbed: receipt.debt_absorbed,
                col_absorbed: receipt.col_absorbed,
            });
        }
        self.emit(VaultEvent::LiquidateInfo {
            start_tick: receipt.start_tick,
            end_tick: receipt.end_tick,
        });

        log::info!(
            "vault {} liquidated ticks {}..{}: debt {} col {} absorbed {}/{}",
            self.state.vault_id,
            receipt.start_tick,
            receipt.end_tick,
            receipt.debt_amount,
            receipt.col_amount,
            receipt.debt_absorbed,
            receipt.col_absorbed
        );
        if receipt.partial {
            log::warn!(
                "vault {} liquidation stopped early at tick {}, topmost now {}",
                self.state.vault_id, receipt.end_tick, self.state.topmost_tick
            );
        }
        Ok(receipt)
    }

    /// Dry run of `liquidate`: what the call would move right now
    pub fn preview_liquidate(
        &self,
        requested_debt: u128,
        absorb: bool,
        market: &Market<'_>,
        budget: &mut dyn ComputeBudget,
    ) -> VaultResult<LiquidationReceipt> {
        let snapshot = market.snapshot()?;
        let plan = self.plan_liquidation(requested_debt, absorb, &snapshot, budget)?;
        self.receipt(&plan, &snapshot, Address::default(), Address::default())
    }

    /// Build the plan without touching state
    pub fn plan_liquidation(
        &self,
        requested_debt: u128,
        absorb: bool,
        market: &MarketSnapshot,
        budget: &mut dyn ComputeBudget,
    ) -> VaultResult<LiquidationPlan> {
        let thresholds = ThresholdTicks::from_market(&self.config, market)?;
        let requested_raw = market.prices.borrow_to_raw(requested_debt, Rounding::Down)?;

        if !absorb
            && (requested_raw < self.config.min_operate_amount as u128
                || requested_raw < self.state.total_borrow / BILLION)
        {
            return Err(VaultError::AmountInsufficient);
        }

        let absorb_floor = if absorb {
            thresholds.liquidation_tick
        } else {
            thresholds.absorb_tick
        };
        let min_tick_debt = self.config.min_tick_debt as u128;
        let bitmap = self.ticks.bitmap();

        let mut plan = LiquidationPlan::new(self.state.topmost_tick);
        let mut remaining = requested_raw;
        let mut tick = self.state.topmost_tick;

        while tick != COLD_TICK && tick > thresholds.liquidation_tick {
            let absorbing = tick > absorb_floor;
            if !absorbing && remaining == 0 {
                break;
            }
            if plan.fills.is_full() || !budget.charge(1) {
                plan.partial = true;
                break;
            }

            let t = self.ticks.get(tick).ok_or(VaultError::BitmapDesync(tick))?;
            if t.raw_debt == 0 {
                return Err(VaultError::BitmapDesync(tick));
            }

            let fill = if absorbing {
                TickFill {
                    tick,
                    branch_id: t.branch_id,
                    debt_taken: 0,
                    col_taken: 0,
                    debt_absorbed: t.raw_debt,
                    col_absorbed: t.raw_col,
                    closes: Some(ClosureKind::Absorbed),
                }
            } else {
                let take = min_u128(remaining, t.raw_debt);
                remaining -= take;
                plan_fill(t, take, min_tick_debt)?
            };
            log::debug!(
                "tick {}: take {} col {} absorb {}/{} {:?}",
                tick, fill.debt_taken, fill.col_taken, fill.debt_absorbed, fill.col_absorbed, fill.closes
            );
            plan.add_fill(fill)?;

            tick = bitmap.find_next_tick_with_debt(tick);
        }

        if plan.is_empty() {
            return Err(VaultError::NothingToLiquidate);
        }
        Ok(plan)
    }

    fn receipt(
        &self,
        plan: &LiquidationPlan,
        market: &MarketSnapshot,
        signer: Address,
        recipient: Address,
    ) -> VaultResult<LiquidationReceipt> {
        let debt_amount = market.prices.borrow_from_raw(plan.debt_raw, Rounding::Up)?;
        let col_amount = market.prices.supply_from_raw(plan.col_raw, Rounding::Down)?;

        let mut transfers = Vec::with_capacity(2);
        if debt_amount > 0 {
            transfers.push(Transfer {
                from: Party::Account(signer),
                to: Party::Vault,
                asset: Asset::Debt,
                amount: debt_amount,
            });
        }
        if col_amount > 0 {
            transfers.push(Transfer {
                from: Party::Vault,
                to: Party::Account(recipient),
                asset: Asset::Collateral,
                amount: col_amount,
            });
        }

        Ok(LiquidationReceipt {
            debt_amount,
            col_amount,
            debt_raw: plan.debt_raw,
            col_raw: plan.col_raw,
            debt_absorbed: plan.debt_absorbed,
            col_absorbed: plan.col_absorbed,
            start_tick: plan.start_tick,
            end_tick: plan.end_tick,
            ticks_touched: plan.fills.len(),
            partial: plan.partial,
            transfers,
        })
    }

    fn commit_liquidation(&mut self, plan: &LiquidationPlan) -> VaultResult<()> {
        for fill in plan.fills.iter() {
            match fill.closes {
                Some(kind) => {
                    self.ticks.close_epoch(fill.tick, kind)?;
                    self.branches.release_tick(fill.branch_id, true)?;
                }
                None => {
                    let fractions = self.ticks.apply_partial_fill(fill.tick, fill.debt_taken, fill.col_taken)?;
                    self.branches.scale_base_factors(fill.branch_id, &fractions)?;
                }
            }
            self.branches.record_liquidation(fill.branch_id, fill.debt_taken, fill.col_taken)?;
        }

        let debt_out = add_u128(plan.debt_raw, plan.debt_absorbed)?;
        let col_out = add_u128(plan.col_raw, plan.col_absorbed)?;
        self.state.total_borrow = sub_u128(self.state.total_borrow, debt_out)?;
        self.state.total_supply = sub_u128(self.state.total_supply, col_out)?;
        self.state.absorbed_debt = add_u128(self.state.absorbed_debt, plan.debt_absorbed)?;
        self.state.absorbed_col = add_u128(self.state.absorbed_col, plan.col_absorbed)?;

        self.state.topmost_tick = self.ticks.bitmap().highest_tick_with_debt();

        self.settle_branches()
    }

    /// Fork one new branch off a retired current branch. Only the current
    /// branch can own open tick epochs, so every ancestor is already retired.
    fn settle_branches(&mut self) -> VaultResult<()> {
        let current = self.state.current_branch_id;
        // validates the lineage before it grows
        self.branches.merge_walk(current)?;
        if self.branches.get(current)?.is_active() {
            return Ok(());
        }

        let next = self.branches.create_branch(current)?;
        self.state.current_branch_id = next;
        self.state.total_branch_id = self.branches.total_branch_id();
        self.emit(VaultEvent::BranchUpdate {
            from_branch: current,
            to_branch: next,
            created: true,
        });
        Ok(())
    }
}

/// Fill `take` raw debt from a tick at the tick's own collateral ratio.
/// Leftovers below `min_tick_debt` (or too small to keep non-zero factors)
/// are absorbed and the epoch closes.
fn plan_fill(t: &Tick, take: u128, min_tick_debt: u128) -> VaultResult<TickFill> {
    let col_taken = if take == t.raw_debt {
        t.raw_col
    } else {
        mul_div(t.raw_col, take, t.raw_debt, Rounding::Down)?
    };
    let debt_left = t.raw_debt - take;
    let col_left = t.raw_col - col_taken;

    let mut fill = TickFill {
        tick: t.tick,
        branch_id: t.branch_id,
        debt_taken: take,
        col_taken,
        debt_absorbed: 0,
        col_absorbed: 0,
        closes: None,
    };

    if debt_left == 0 {
        fill.col_absorbed = col_left;
        fill.closes = Some(ClosureKind::Liquidated);
        return Ok(fill);
    }

    let debt_factor = mul_div(t.debt_factor, debt_left, t.raw_debt, Rounding::Down)?;
    let col_factor = if t.raw_col > 0 {
        mul_div(t.col_factor, col_left, t.raw_col, Rounding::Down)?
    } else {
        t.col_factor
    };
    if debt_left < min_tick_debt || debt_factor == 0 || col_factor == 0 {
        fill.debt_absorbed = debt_left;
        fill.col_absorbed = col_left;
        fill.closes = Some(ClosureKind::Liquidated);
    }
    Ok(fill)
}
