//! Position records and their realization against the tick ledger

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{COLD_TICK, FACTOR_ONE};
use crate::error::{VaultError, VaultResult};
use crate::math::{min_u128, mul_div, Rounding};
use crate::state::tick::{ClosureKind, TickLedger};

/// 32-byte account identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `b`, handy for fixtures
    pub const fn repeat(b: u8) -> Self {
        Self([b; 32])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: u32,
    pub owner: Address,
    pub collateral: u128,
    /// Gross (tick-rounded) debt contributed to the tick
    pub debt: u128,
    /// Part of `debt` added by tick rounding; net debt is `debt - dust_debt`
    pub dust_debt: u128,
    /// COLD_TICK when the position has no debt
    pub tick: i32,
    pub tick_slot: u32,
    pub branch_id: u32,
    pub entry_debt_factor: u128,
    pub entry_col_factor: u128,
}

impl Position {
    pub fn new(id: u32, owner: Address) -> Self {
        Self {
            id,
            owner,
            collateral: 0,
            debt: 0,
            dust_debt: 0,
            tick: COLD_TICK,
            tick_slot: 0,
            branch_id: 0,
            entry_debt_factor: FACTOR_ONE,
            entry_col_factor: FACTOR_ONE,
        }
    }

    pub fn is_supply_only(&self) -> bool {
        self.tick == COLD_TICK
    }

    /// Current amounts after applying tick liquidations since the last write
    pub fn realize(&self, ticks: &TickLedger) -> VaultResult<RealizedPosition> {
        if self.is_supply_only() {
            return Ok(RealizedPosition {
                collateral: self.collateral,
                debt: 0,
                dust_debt: 0,
                live: false,
            });
        }

        let tick = ticks.get(self.tick).ok_or(VaultError::Underflow)?;
        if tick.is_live_slot(self.tick_slot) {
            let debt = mul_div(self.debt, tick.debt_factor, self.entry_debt_factor, Rounding::Up)?;
            let collateral = mul_div(self.collateral, tick.col_factor, self.entry_col_factor, Rounding::Down)?;
            let dust = mul_div(self.dust_debt, tick.debt_factor, self.entry_debt_factor, Rounding::Down)?;
            return Ok(RealizedPosition {
                collateral,
                debt,
                dust_debt: min_u128(dust, debt),
                live: true,
            });
        }

        let closure = ticks
            .closure_for(self.tick, self.tick_slot)
            .ok_or(VaultError::Underflow)?;
        log::debug!(
            "position {} resolved from closed epoch at tick {} ({:?})",
            self.id, self.tick, closure.kind
        );
        match closure.kind {
            ClosureKind::Liquidated | ClosureKind::Absorbed => Ok(RealizedPosition::default()),
            ClosureKind::Drained => Ok(RealizedPosition {
                collateral: mul_div(self.collateral, closure.col_factor, self.entry_col_factor, Rounding::Down)?,
                debt: 0,
                dust_debt: 0,
                live: false,
            }),
        }
    }
}

/// Position amounts as of now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealizedPosition {
    pub collateral: u128,
    pub debt: u128,
    pub dust_debt: u128,
    /// Amounts are still counted in the position's tick
    pub live: bool,
}

impl RealizedPosition {
    pub fn net_debt(&self) -> u128 {
        self.debt.saturating_sub(self.dust_debt)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRegistry {
    positions: BTreeMap<u32, Position>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> VaultResult<&Position> {
        self.positions.get(&id).ok_or(VaultError::PositionNotFound(id))
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }
}
