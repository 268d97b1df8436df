//! Safe arithmetic helpers - checked where the ledger depends on the result,
//! saturating where a value only feeds a comparison or an audit sum

use primitive_types::U256;

use crate::error::{VaultError, VaultResult};

/// Rounding direction for divisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Add u128, failing on overflow
pub fn add_u128(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_add(b).ok_or(VaultError::MathOverflow)
}

/// Subtract u128, failing on underflow
pub fn sub_u128(a: u128, b: u128) -> VaultResult<u128> {
    a.checked_sub(b).ok_or(VaultError::Underflow)
}

/// Subtract u128 with saturation at 0
pub fn sat_sub_u128(a: u128, b: u128) -> u128 {
    a.saturating_sub(b)
}

/// Minimum of two u128
pub fn min_u128(a: u128, b: u128) -> u128 {
    if a < b { a } else { b }
}

/// Magnitude of a signed delta
pub fn abs_i128(x: i128) -> u128 {
    x.unsigned_abs()
}

/// Convert u128 to i128, failing above i128::MAX
pub fn u128_to_i128(x: u128) -> VaultResult<i128> {
    i128::try_from(x).map_err(|_| VaultError::MathOverflow)
}

/// a * b / denominator with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> VaultResult<u128> {
    if denominator == 0 {
        return Err(VaultError::MathOverflow);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && !(product % denominator).is_zero() {
        quotient = quotient + U256::one();
    }
    u256_to_u128(quotient)
}

fn u256_to_u128(x: U256) -> VaultResult<u128> {
    if x.bits() > 128 {
        return Err(VaultError::MathOverflow);
    }
    Ok(x.low_u128())
}
