//! Generators for arbitrary vault inputs (for Kani)

#[cfg(kani)]
use kani::any;
use arrayvec::ArrayVec;
use vault_engine::{FixedPrice, COL_PER_DEBT_PRECISION};

use crate::sanitizer::{OperateInput, MAX_STEPS};

pub type Steps = ArrayVec<OperateInput, { MAX_STEPS as usize }>;

/// Oracle price at most `max_drop_pct` percent below parity
pub fn crashed_price(drop_pct: u8, max_drop_pct: u8) -> FixedPrice {
    let drop = (drop_pct % (max_drop_pct + 1)) as u128;
    FixedPrice(COL_PER_DEBT_PRECISION * 100 / (100 - drop))
}

#[cfg(kani)]
pub fn any_tick() -> crate::sanitizer::TickInput {
    crate::sanitizer::TickInput(any())
}

#[cfg(kani)]
pub fn any_operate() -> OperateInput {
    // narrow raw inputs keep the solver fast
    let user: u8 = any();
    let col: i32 = any();
    let debt: i32 = any();
    OperateInput { user, delta_col: col as i128, delta_debt: debt as i128 }
}

#[cfg(kani)]
pub fn any_steps() -> Steps {
    let mut steps = Steps::new();
    let n: u8 = any();
    for _ in 0..(n % MAX_STEPS) + 1 {
        let _ = steps.try_push(any_operate());
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crashed_price_bounds() {
        assert_eq!(crashed_price(0, 20), FixedPrice::PARITY);
        assert_eq!(crashed_price(21, 20), FixedPrice::PARITY);
        assert_eq!(crashed_price(20, 20), FixedPrice(1_250_000_000_000_000));
    }
}
