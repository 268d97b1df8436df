//! Protocol constants

/// Lowest tick a position can occupy
pub const MIN_TICK: i32 = -16383;

/// Highest tick a position can occupy
pub const MAX_TICK: i32 = 16383;

/// Sentinel for "no debt" (supply-only position, empty vault)
pub const COLD_TICK: i32 = i32::MIN;

/// Ratio scale: ratio = debt * 2^48 / collateral, tick 0 == ratio 1.0
pub const ZERO_TICK_SCALED_RATIO: u128 = 1 << 48;

/// Scale of tick epoch and branch factors (1e27)
pub const FACTOR_ONE: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Exchange price precision of the liquidity layer (1e12)
pub const EXCHANGE_PRICES_PRECISION: u128 = 1_000_000_000_000;

/// Decimals of collateral-per-debt prices (oracle and slippage bound)
pub const RATE_OUTPUT_DECIMALS: u32 = 15;

/// 1e15
pub const COL_PER_DEBT_PRECISION: u128 = 1_000_000_000_000_000;

/// Basis points denominator
pub const FOUR_DECIMALS: u128 = 10_000;

/// Liquidation must repay at least total_borrow / BILLION
pub const BILLION: u128 = 1_000_000_000;

/// Upper bound for liquidation_max_limit_bps (99.7%)
pub const MAX_LIQUIDATION_MAX_LIMIT_BPS: u16 = 9_970;

/// Maximum ticks touched by a single liquidate call (plan capacity)
pub const MAX_LIQUIDATION_TICKS: usize = 64;

/// Root sentinel branch, never liquidated
pub const ROOT_BRANCH_ID: u32 = 0;

/// Branch every vault starts on
pub const FIRST_BRANCH_ID: u32 = 1;

/// Position id 0 requests a new position
pub const NEW_POSITION_ID: u32 = 0;

// Bitmap geometry: 16 arrays x 8 maps x 32 bytes
pub const BITMAP_ARRAYS: usize = 16;
pub const MAPS_PER_ARRAY: usize = 8;
pub const BYTES_PER_MAP: usize = 32;
pub const TICKS_PER_MAP: i32 = 256;
pub const TICKS_PER_ARRAY: i32 = 2048;

/// Tick stored at bitmap offset 0 (offset = tick - BITMAP_BASE_TICK)
pub const BITMAP_BASE_TICK: i32 = MIN_TICK - 1;
