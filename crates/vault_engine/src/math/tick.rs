//! Ratio <-> tick conversion
//!
//! Tick `t` stands for the ratio `1.0015^t` scaled by `ZERO_TICK_SCALED_RATIO`
//! (2^48). Ratios are computed by multiplying precomputed Q64 constants
//! `floor(2^64 / 1.0015^(2^i))` for each set bit of `|t|`, which keeps the
//! result strictly increasing in `t` across the whole tick range.

use crate::constants::{MAX_TICK, MIN_TICK, ZERO_TICK_SCALED_RATIO};
use crate::error::{VaultError, VaultResult};

/// floor(2^64 / 1.0015^(2^i)), i = 0..14
const INV_FACTOR_POW2_Q64: [u128; 14] = [
    0xff9dd7de423466c2,
    0xff3bd55f4488ad27,
    0xfe78410fd6498b73,
    0xfcf2d9987c9be178,
    0xf9ef02c4529258b0,
    0xf402d288133a85a1,
    0xe895615b5beb6386,
    0xd34f17a00ffa00a8,
    0xae6b7961714e2054,
    0x76d6461f27082d74,
    0x372a3bfe0745d8b6,
    0x0be32cbee4897976,
    0x008d4f70c9ff4924,
    0x00004e009ae55193,
];

const Q64_ONE: u128 = 1 << 64;

pub struct TickMath;

impl TickMath {
    /// Ratio of tick 0
    pub const ZERO_TICK_SCALED_RATIO: u128 = ZERO_TICK_SCALED_RATIO;

    /// ratio_at_tick(MIN_TICK)
    pub const MIN_RATIO: u128 = 6_093;

    /// ratio_at_tick(MAX_TICK)
    pub const MAX_RATIO: u128 = 13_002_088_162_051_014_298_412_981;

    /// 2^48 * 1.0015^tick
    pub fn ratio_at_tick(tick: i32) -> VaultResult<u128> {
        if !(MIN_TICK..=MAX_TICK).contains(&tick) {
            return Err(VaultError::TickOutOfRange(tick));
        }

        let abs = tick.unsigned_abs();
        let mut factor = Q64_ONE;
        for (i, c) in INV_FACTOR_POW2_Q64.iter().enumerate() {
            if abs & (1 << i) != 0 {
                // factor <= 2^64 and c < 2^64, the product fits in u128
                factor = (factor * c) >> 64;
            }
        }

        if tick >= 0 {
            Ok((1u128 << 112) / factor)
        } else {
            Ok(factor >> 16)
        }
    }

    /// Floor tick: the largest tick whose ratio is <= `ratio`, clamped to
    /// [MIN_TICK, MAX_TICK]
    pub fn tick_at_ratio(ratio: u128) -> i32 {
        if ratio <= Self::MIN_RATIO {
            return MIN_TICK;
        }
        if ratio >= Self::MAX_RATIO {
            return MAX_TICK;
        }

        let mut lo = MIN_TICK;
        let mut hi = MAX_TICK;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            // mid is always in range here
            let mid_ratio = Self::ratio_at_tick(mid).unwrap_or(u128::MAX);
            if mid_ratio <= ratio {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }

    /// Placement tick: the smallest tick whose ratio is >= `ratio`.
    ///
    /// Storing a position here rounds its debt up to the tick boundary, so a
    /// tick's aggregated debt never understates the real exposure.
    pub fn tick_covering_ratio(ratio: u128) -> VaultResult<i32> {
        if ratio > Self::MAX_RATIO {
            return Err(VaultError::PositionAboveCollateralFactor);
        }
        let tick = Self::tick_at_ratio(ratio);
        if Self::ratio_at_tick(tick)? < ratio {
            Ok(tick + 1)
        } else {
            Ok(tick)
        }
    }
}
