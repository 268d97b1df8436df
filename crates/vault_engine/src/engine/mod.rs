//! Vault engine: one vault's ledgers plus the operations that mutate them
//!
//! Every mutating call builds a plan against the current state, validates it
//! completely, then commits. Business errors surface before the first write;
//! only invariant violations can interrupt a commit.

pub mod liquidate;
pub mod operate;

pub use liquidate::{LiquidationPlan, LiquidationReceipt, TickFill};
pub use operate::PositionSnapshot;

use serde::{Deserialize, Serialize};

use crate::config::VaultConfig;
use crate::constants::*;
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::market::MarketSnapshot;
use crate::math::{mul_div, Rounding, TickMath};
use crate::state::*;

/// Ticks derived from the oracle price for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdTicks {
    /// Highest tick a withdraw or borrow may leave a position at
    pub collateral_factor_tick: i32,
    /// Ticks above this are liquidatable
    pub liquidation_tick: i32,
    /// Ticks above this are bad debt and get absorbed
    pub absorb_tick: i32,
}

impl ThresholdTicks {
    pub fn from_market(config: &VaultConfig, market: &MarketSnapshot) -> VaultResult<Self> {
        let cpd_raw = market.raw_col_per_debt()?;
        if cpd_raw == 0 {
            return Err(VaultError::InvalidConfig("oracle price rounds to zero".to_string()));
        }
        Ok(Self {
            collateral_factor_tick: threshold_tick(config.collateral_factor_bps, cpd_raw)?,
            liquidation_tick: threshold_tick(config.liquidation_threshold_bps, cpd_raw)?,
            absorb_tick: threshold_tick(config.liquidation_max_limit_bps, cpd_raw)?,
        })
    }
}

/// Floor tick of the debt/collateral ratio at which a position's debt is
/// worth `bps` of its collateral
///
/// # Arguments
/// * `bps` - Threshold in basis points
/// * `raw_col_per_debt` - Raw collateral per raw debt (1e15)
///
/// # Returns
/// * `MIN_TICK - 1` when even the lowest tick is above the threshold
fn threshold_tick(bps: u16, raw_col_per_debt: u128) -> VaultResult<i32> {
    let numerator = (bps as u128) * COL_PER_DEBT_PRECISION;
    let denominator = FOUR_DECIMALS
        .checked_mul(raw_col_per_debt)
        .ok_or(VaultError::InvalidConfig("oracle price too large".to_string()))?;
    let ratio = match mul_div(numerator, ZERO_TICK_SCALED_RATIO, denominator, Rounding::Down) {
        Ok(r) => r,
        Err(_) => return Ok(MAX_TICK),
    };
    if ratio < TickMath::MIN_RATIO {
        return Ok(MIN_TICK - 1);
    }
    Ok(TickMath::tick_at_ratio(ratio))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    config: VaultConfig,
    state: VaultState,
    ticks: TickLedger,
    branches: BranchLedger,
    positions: PositionRegistry,
    #[serde(skip)]
    events: Vec<VaultEvent>,
}

impl Vault {
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        log::info!(
            "vault {} created: cf {} lt {} max {}",
            config.vault_id,
            config.collateral_factor_bps,
            config.liquidation_threshold_bps,
            config.liquidation_max_limit_bps
        );
        Ok(Self {
            state: VaultState::new(config.vault_id),
            config,
            ticks: TickLedger::new(),
            branches: BranchLedger::new(),
            positions: PositionRegistry::new(),
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> u16 {
        self.state.vault_id
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn ticks(&self) -> &TickLedger {
        &self.ticks
    }

    pub fn branches(&self) -> &BranchLedger {
        &self.branches
    }

    pub fn positions(&self) -> &PositionRegistry {
        &self.positions
    }

    pub fn topmost_tick(&self) -> i32 {
        self.state.topmost_tick
    }

    /// Current amounts of a position, without touching state
    pub fn position(&self, position_id: u32) -> VaultResult<RealizedPosition> {
        self.positions.get(position_id)?.realize(&self.ticks)
    }

    /// Take the events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn thresholds(&self, market: &MarketSnapshot) -> VaultResult<ThresholdTicks> {
        ThresholdTicks::from_market(&self.config, market)
    }

    fn emit(&mut self, event: VaultEvent) {
        log::debug!("vault {} event {:?}", self.state.vault_id, event);
        self.events.push(event);
    }

    /// Re-point topmost after `tick` may have lost its debt
    fn refresh_topmost_from(&mut self, tick: i32) {
        if tick == self.state.topmost_tick && self.ticks.raw_debt(tick) == 0 {
            self.state.topmost_tick = self.ticks.bitmap().find_next_tick_with_debt(tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ExchangePrices, FixedPrice, Market, StaticLiquidity};

    #[test]
    fn test_threshold_ticks_at_parity() {
        let vault = Vault::new(VaultConfig::default()).unwrap();
        let liquidity = StaticLiquidity::default();
        let oracle = FixedPrice::PARITY;
        let snap = Market::new(&oracle, &liquidity).snapshot().unwrap();
        let t = vault.thresholds(&snap).unwrap();
        assert_eq!(t.collateral_factor_tick, -149);
        assert_eq!(t.liquidation_tick, -141);
        assert_eq!(t.absorb_tick, -71);
    }

    #[test]
    fn test_threshold_ticks_after_price_drop() {
        let vault = Vault::new(VaultConfig::default()).unwrap();
        let liquidity = StaticLiquidity::default();
        // debt now worth 1/0.98 collateral
        let oracle = FixedPrice(1_020_408_163_265_306);
        let snap = Market::new(&oracle, &liquidity).snapshot().unwrap();
        let t = vault.thresholds(&snap).unwrap();
        assert_eq!(t.collateral_factor_tick, -163);
        assert_eq!(t.liquidation_tick, -155);
        assert_eq!(t.absorb_tick, -84);
    }

    #[test]
    fn test_threshold_tick_extremes() {
        // collateral worthless against debt: nothing can be placed
        assert_eq!(threshold_tick(8_000, u128::MAX / 10_000).unwrap(), MIN_TICK - 1);
        assert_eq!(threshold_tick(8_000, 1).unwrap(), MAX_TICK);
    }

    #[test]
    fn test_raw_price_follows_exchange_prices() {
        let liquidity = StaticLiquidity {
            prices: ExchangePrices { supply: 2_000_000_000_000, borrow: 1_000_000_000_000 },
            debt_liquidity: u128::MAX,
        };
        let oracle = FixedPrice::PARITY;
        let snap = Market::new(&oracle, &liquidity).snapshot().unwrap();
        // one raw collateral unit is worth two tokens
        assert_eq!(snap.raw_col_per_debt().unwrap(), COL_PER_DEBT_PRECISION / 2);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = VaultConfig { liquidation_max_limit_bps: 9_999, ..VaultConfig::default() };
        assert!(matches!(Vault::new(config), Err(VaultError::InvalidConfig(_))));
    }
}
