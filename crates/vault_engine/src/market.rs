//! Collaborators the vault reads from: price oracle, liquidity layer and
//! compute budget, plus the transfer descriptors handed back to the caller

use serde::{Deserialize, Serialize};

use crate::constants::{EXCHANGE_PRICES_PRECISION, COL_PER_DEBT_PRECISION};
use crate::error::{VaultError, VaultResult};
use crate::math::{mul_div, Rounding};
use crate::state::Address;

/// Collateral per unit of debt (1e15 precision)
pub trait Oracle {
    fn col_per_debt(&self) -> u128;
}

/// Token <-> raw exchange prices (1e12 precision)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePrices {
    pub supply: u128,
    pub borrow: u128,
}

impl Default for ExchangePrices {
    fn default() -> Self {
        Self {
            supply: EXCHANGE_PRICES_PRECISION,
            borrow: EXCHANGE_PRICES_PRECISION,
        }
    }
}

impl ExchangePrices {
    pub fn supply_to_raw(&self, amount: u128, rounding: Rounding) -> VaultResult<u128> {
        mul_div(amount, EXCHANGE_PRICES_PRECISION, self.supply, rounding)
    }

    pub fn supply_from_raw(&self, raw: u128, rounding: Rounding) -> VaultResult<u128> {
        mul_div(raw, self.supply, EXCHANGE_PRICES_PRECISION, rounding)
    }

    pub fn borrow_to_raw(&self, amount: u128, rounding: Rounding) -> VaultResult<u128> {
        mul_div(amount, EXCHANGE_PRICES_PRECISION, self.borrow, rounding)
    }

    pub fn borrow_from_raw(&self, raw: u128, rounding: Rounding) -> VaultResult<u128> {
        mul_div(raw, self.borrow, EXCHANGE_PRICES_PRECISION, rounding)
    }
}

/// Lending pool the vault supplies collateral to and borrows debt from
pub trait LiquidityLayer {
    fn exchange_prices(&self) -> ExchangePrices;

    /// Total debt-token liquidity available to borrowers
    fn debt_liquidity(&self) -> u128;
}

/// Per-call work allowance; each tick visited by liquidation costs one unit
pub trait ComputeBudget {
    /// Consume `units`, returning false once the budget is spent
    fn charge(&mut self, units: u32) -> bool;
}

/// Budget that never runs out
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl ComputeBudget for Unmetered {
    fn charge(&mut self, _units: u32) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MeteredBudget {
    remaining: u32,
}

impl MeteredBudget {
    pub fn new(units: u32) -> Self {
        Self { remaining: units }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl ComputeBudget for MeteredBudget {
    fn charge(&mut self, units: u32) -> bool {
        match self.remaining.checked_sub(units) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }
}

/// Fixed oracle price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPrice(pub u128);

impl FixedPrice {
    /// 1 debt unit == 1 collateral unit
    pub const PARITY: FixedPrice = FixedPrice(COL_PER_DEBT_PRECISION);
}

impl Oracle for FixedPrice {
    fn col_per_debt(&self) -> u128 {
        self.0
    }
}

/// Liquidity layer with fixed prices and liquidity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticLiquidity {
    pub prices: ExchangePrices,
    pub debt_liquidity: u128,
}

impl Default for StaticLiquidity {
    fn default() -> Self {
        Self {
            prices: ExchangePrices::default(),
            debt_liquidity: u128::MAX,
        }
    }
}

impl LiquidityLayer for StaticLiquidity {
    fn exchange_prices(&self) -> ExchangePrices {
        self.prices
    }

    fn debt_liquidity(&self) -> u128 {
        self.debt_liquidity
    }
}

/// The collaborators for one call
#[derive(Clone, Copy)]
pub struct Market<'a> {
    pub oracle: &'a dyn Oracle,
    pub liquidity: &'a dyn LiquidityLayer,
}

impl<'a> Market<'a> {
    pub fn new(oracle: &'a dyn Oracle, liquidity: &'a dyn LiquidityLayer) -> Self {
        Self { oracle, liquidity }
    }

    /// Read every collaborator once; the call works off this copy
    pub fn snapshot(&self) -> VaultResult<MarketSnapshot> {
        let prices = self.liquidity.exchange_prices();
        let col_per_debt = self.oracle.col_per_debt();

        if prices.supply == 0 || prices.borrow == 0 {
            return Err(VaultError::InvalidConfig("zero exchange price".to_string()));
        }
        if col_per_debt == 0 {
            return Err(VaultError::InvalidConfig("zero oracle price".to_string()));
        }

        Ok(MarketSnapshot {
            col_per_debt,
            prices,
            debt_liquidity: self.liquidity.debt_liquidity(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    /// Oracle collateral per debt, token terms (1e15)
    pub col_per_debt: u128,
    pub prices: ExchangePrices,
    pub debt_liquidity: u128,
}

impl MarketSnapshot {
    /// Oracle price restated in raw units: raw collateral per raw debt (1e15)
    pub fn raw_col_per_debt(&self) -> VaultResult<u128> {
        mul_div(self.col_per_debt, self.prices.borrow, self.prices.supply, Rounding::Down)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    Collateral,
    Debt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// The vault's account at the liquidity layer
    Vault,
    Account(Address),
}

/// Token movement the executor must carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Party,
    pub to: Party,
    pub asset: Asset,
    pub amount: u128,
}
