//! Position operate flow: deposit, withdraw, borrow and payback

use crate::constants::*;
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::market::{Asset, Market, MarketSnapshot, Party, Transfer};
use crate::math::*;
use crate::state::*;

use super::{ThresholdTicks, Vault};

/// Result of a successful operate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub position_id: u32,
    pub owner: Address,
    pub tick: i32,
    pub tick_slot: u32,
    /// Raw collateral
    pub collateral: u128,
    /// Raw gross debt
    pub debt: u128,
    pub dust_debt: u128,
    /// Token amounts actually applied (withdraw/payback negative)
    pub col_amount: i128,
    pub debt_amount: i128,
    pub transfers: Vec<Transfer>,
}

impl PositionSnapshot {
    pub fn net_debt(&self) -> u128 {
        self.debt - self.dust_debt
    }
}

/// Raw and token sides of one delta
#[derive(Debug, Clone, Copy, Default)]
struct Leg {
    raw: u128,
    tokens: u128,
}

/// Everything commit needs; built without mutating the vault
#[derive(Debug, Clone)]
struct OperatePlan {
    position: Position,
    is_new: bool,
    realized: RealizedPosition,
    new_col: u128,
    new_net_debt: u128,
    new_tick: i32,
    new_gross_debt: u128,
    col_amount: i128,
    debt_amount: i128,
    signer: Address,
}

impl Vault {
    /// Apply collateral and debt deltas (token units) to a position.
    ///
    /// `position_id == 0` opens a new position owned by `signer`.
    /// `i128::MIN` withdraws all collateral or pays back all debt.
    pub fn operate(
        &mut self,
        position_id: u32,
        signer: Address,
        delta_col: i128,
        delta_debt: i128,
        market: &Market<'_>,
    ) -> VaultResult<PositionSnapshot> {
        let snapshot = market.snapshot()?;
        let plan = self.plan_operate(position_id, signer, delta_col, delta_debt, &snapshot)?;
        self.commit_operate(plan)
    }

    fn plan_operate(
        &self,
        position_id: u32,
        signer: Address,
        delta_col: i128,
        delta_debt: i128,
        market: &MarketSnapshot,
    ) -> VaultResult<OperatePlan> {
        if delta_col == 0 && delta_debt == 0 {
            return Err(VaultError::InvalidOperateAmount);
        }

        let is_new = position_id == NEW_POSITION_ID;
        let (position, realized) = if is_new {
            if delta_col <= 0 {
                return Err(VaultError::InvalidOperateAmount);
            }
            (Position::new(self.state.next_position_id, signer), RealizedPosition::default())
        } else {
            let position = self.positions.get(position_id)?.clone();
            let realized = position.realize(&self.ticks)?;
            (position, realized)
        };

        let risk_increasing = delta_col < 0 || delta_debt > 0;
        if risk_increasing && position.owner != signer {
            return Err(VaultError::InvalidPositionAuthority);
        }

        let min_amount = self.config.min_operate_amount as u128;
        let prices = market.prices;

        // Collateral leg
        let col = match delta_col {
            0 => Leg::default(),
            i128::MIN => Leg {
                raw: realized.collateral,
                tokens: prices.supply_from_raw(realized.collateral, Rounding::Down)?,
            },
            d if d > 0 => {
                let tokens = abs_i128(d);
                Leg { raw: prices.supply_to_raw(tokens, Rounding::Down)?, tokens }
            }
            d => {
                let tokens = abs_i128(d);
                let raw = prices.supply_to_raw(tokens, Rounding::Up)?;
                if raw > realized.collateral {
                    return Err(VaultError::InsufficientCollateral);
                }
                Leg { raw, tokens }
            }
        };
        if delta_col != 0 && delta_col != i128::MIN && col.raw < min_amount {
            return Err(VaultError::AmountInsufficient);
        }

        // Debt leg
        let net_debt = realized.net_debt();
        let debt = match delta_debt {
            0 => Leg::default(),
            i128::MIN => Leg {
                raw: net_debt,
                tokens: prices.borrow_from_raw(net_debt, Rounding::Up)?,
            },
            d if d > 0 => {
                let tokens = abs_i128(d);
                let fee = mul_div(tokens, self.config.borrow_fee_bps as u128, FOUR_DECIMALS, Rounding::Up)?;
                Leg {
                    raw: prices.borrow_to_raw(add_u128(tokens, fee)?, Rounding::Up)?,
                    tokens,
                }
            }
            d => {
                let tokens = abs_i128(d);
                let raw = prices.borrow_to_raw(tokens, Rounding::Down)?;
                if raw > net_debt {
                    return Err(VaultError::InsufficientDebt);
                }
                Leg { raw, tokens }
            }
        };
        if delta_debt != 0 && delta_debt != i128::MIN && debt.raw < min_amount {
            return Err(VaultError::AmountInsufficient);
        }

        let new_col = if delta_col > 0 {
            add_u128(realized.collateral, col.raw)?
        } else {
            sub_u128(realized.collateral, col.raw).map_err(|_| VaultError::InsufficientCollateral)?
        };
        let new_net_debt = if delta_debt > 0 {
            add_u128(net_debt, debt.raw)?
        } else {
            sub_u128(net_debt, debt.raw).map_err(|_| VaultError::InsufficientDebt)?
        };
        if delta_debt < 0 && new_net_debt > net_debt {
            return Err(VaultError::InvalidPaybackOrDeposit);
        }

        let (new_tick, new_gross_debt) = place(new_col, new_net_debt)?;

        // deposit/payback alone must never move a position to a riskier tick
        if !risk_increasing && realized.live && new_tick > position.tick {
            return Err(VaultError::InvalidPaybackOrDeposit);
        }

        if new_net_debt > 0 {
            let thresholds = ThresholdTicks::from_market(&self.config, market)?;
            if new_tick > thresholds.liquidation_tick
                || (risk_increasing && new_tick > thresholds.collateral_factor_tick)
            {
                log::debug!(
                    "position {} rejected at tick {} (cf {}, lt {})",
                    position.id, new_tick, thresholds.collateral_factor_tick, thresholds.liquidation_tick
                );
                return Err(VaultError::PositionAboveCollateralFactor);
            }
        }

        if delta_debt > 0 {
            let old_in_tick = if realized.live {
                min_u128(realized.debt, self.ticks.raw_debt(position.tick))
            } else {
                0
            };
            let total_raw = add_u128(sat_sub_u128(self.state.total_borrow, old_in_tick), new_gross_debt)?;
            let total_tokens = prices.borrow_from_raw(total_raw, Rounding::Up)?;
            if let Some(limit) = self.config.borrow_limit {
                if total_tokens > limit as u128 {
                    return Err(VaultError::BorrowLimitReached);
                }
            }
            let cap = mul_div(
                market.debt_liquidity,
                self.config.max_utilization_bps as u128,
                FOUR_DECIMALS,
                Rounding::Down,
            )?;
            if total_tokens > cap {
                return Err(VaultError::MaxUtilizationReached);
            }
        }

        let signed = |tokens: u128, negative: bool| -> VaultResult<i128> {
            let v = u128_to_i128(tokens)?;
            Ok(if negative { -v } else { v })
        };

        Ok(OperatePlan {
            col_amount: signed(col.tokens, delta_col < 0)?,
            debt_amount: signed(debt.tokens, delta_debt < 0)?,
            position,
            is_new,
            realized,
            new_col,
            new_net_debt,
            new_tick,
            new_gross_debt,
            signer,
        })
    }

    fn commit_operate(&mut self, plan: OperatePlan) -> VaultResult<PositionSnapshot> {
        let OperatePlan { mut position, realized, .. } = plan.clone();
        let old_tick = position.tick;

        // Take the old contribution out of its tick
        let mut old_debt_out = 0u128;
        if realized.live {
            let t = self.ticks.get(old_tick).ok_or(VaultError::Underflow)?;
            old_debt_out = min_u128(realized.debt, t.raw_debt);
            let old_col_out = min_u128(realized.collateral, t.raw_col);
            self.ticks.remove_debt(old_tick, old_debt_out, old_col_out)?;
        }

        let stays = realized.live && plan.new_net_debt > 0 && plan.new_tick == old_tick;
        if realized.live && !stays && self.ticks.raw_debt(old_tick) == 0 {
            let closure = self.ticks.close_epoch(old_tick, ClosureKind::Drained)?;
            self.branches.release_tick(closure.branch_id, false)?;
        }

        if plan.new_net_debt == 0 {
            position.tick = COLD_TICK;
            position.tick_slot = 0;
            position.branch_id = 0;
            position.debt = 0;
            position.dust_debt = 0;
            position.entry_debt_factor = FACTOR_ONE;
            position.entry_col_factor = FACTOR_ONE;
        } else {
            let current = self.state.current_branch_id;
            let opened = self.ticks.add_debt(plan.new_tick, plan.new_gross_debt, plan.new_col, current)?;
            if opened {
                self.branches.track_tick(current, plan.new_tick)?;
            }
            if !stays {
                position.tick_slot = self.ticks.allocate_slot(plan.new_tick)?;
            }
            let t = self.ticks.get(plan.new_tick).ok_or(VaultError::Underflow)?;
            position.tick = plan.new_tick;
            position.branch_id = t.branch_id;
            position.entry_debt_factor = t.debt_factor;
            position.entry_col_factor = t.col_factor;
            position.debt = plan.new_gross_debt;
            position.dust_debt = plan.new_gross_debt - plan.new_net_debt;
        }
        position.collateral = plan.new_col;

        // Totals
        self.state.total_borrow = add_u128(sub_u128(self.state.total_borrow, old_debt_out)?, position.debt)?;
        self.state.total_supply = add_u128(sub_u128(self.state.total_supply, realized.collateral)?, plan.new_col)?;

        if position.tick != COLD_TICK && position.tick > self.state.topmost_tick {
            self.state.topmost_tick = position.tick;
        }
        if realized.live {
            self.refresh_topmost_from(old_tick);
        }

        if plan.is_new {
            self.state.next_position_id = self.state.next_position_id.checked_add(1).ok_or(VaultError::MathOverflow)?;
            self.state.total_positions = self.state.total_positions.saturating_add(1);
        }

        let transfers = operate_transfers(plan.signer, plan.col_amount, plan.debt_amount);

        self.emit(VaultEvent::Operate {
            position_id: position.id,
            signer: plan.signer,
            col_amount: plan.col_amount,
            debt_amount: plan.debt_amount,
        });
        self.emit(VaultEvent::UserPosition {
            position_id: position.id,
            owner: position.owner,
            tick: position.tick,
            tick_slot: position.tick_slot,
            collateral: position.collateral,
            debt: position.debt,
        });
        log::debug!(
            "position {} at tick {} slot {}: col {} debt {} (dust {})",
            position.id, position.tick, position.tick_slot,
            position.collateral, position.debt, position.dust_debt
        );

        let snapshot = PositionSnapshot {
            position_id: position.id,
            owner: position.owner,
            tick: position.tick,
            tick_slot: position.tick_slot,
            collateral: position.collateral,
            debt: position.debt,
            dust_debt: position.dust_debt,
            col_amount: plan.col_amount,
            debt_amount: plan.debt_amount,
            transfers,
        };
        self.positions.insert(position);
        Ok(snapshot)
    }
}

/// Tick and gross debt for a position, COLD_TICK when it has no debt
fn place(col: u128, net_debt: u128) -> VaultResult<(i32, u128)> {
    if net_debt == 0 {
        return Ok((COLD_TICK, 0));
    }
    if col == 0 {
        return Err(VaultError::PositionAboveCollateralFactor);
    }
    let ratio = mul_div(net_debt, ZERO_TICK_SCALED_RATIO, col, Rounding::Up)
        .map_err(|_| VaultError::PositionAboveCollateralFactor)?;
    let tick = TickMath::tick_covering_ratio(ratio)?;
    let gross = mul_div(col, TickMath::ratio_at_tick(tick)?, ZERO_TICK_SCALED_RATIO, Rounding::Up)?;
    Ok((tick, gross.max(net_debt)))
}

fn operate_transfers(signer: Address, col_amount: i128, debt_amount: i128) -> Vec<Transfer> {
    let user = Party::Account(signer);
    let mut transfers = Vec::with_capacity(2);
    if col_amount > 0 {
        transfers.push(Transfer { from: user, to: Party::Vault, asset: Asset::Collateral, amount: abs_i128(col_amount) });
    } else if col_amount < 0 {
        transfers.push(Transfer { from: Party::Vault, to: user, asset: Asset::Collateral, amount: abs_i128(col_amount) });
    }
    if debt_amount > 0 {
        transfers.push(Transfer { from: Party::Vault, to: user, asset: Asset::Debt, amount: abs_i128(debt_amount) });
    } else if debt_amount < 0 {
        transfers.push(Transfer { from: user, to: Party::Vault, asset: Asset::Debt, amount: abs_i128(debt_amount) });
    }
    transfers
}
