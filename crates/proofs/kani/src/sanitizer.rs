//! Input sanitizer - bounds values for Kani exploration

use vault_engine::{MAX_TICK, MIN_TICK};

pub const N_USERS: usize = 3;
pub const MAX_STEPS: u8 = 4;

/// Bounds for tractable verification
const MAX_AMOUNT: i128 = 1_000_000_000;
const MIN_AMOUNT: i128 = 1_000;
const MAX_BORROW_PCT: i128 = 79;

pub trait Sanitize {
    fn sanitize(self) -> Self;
}

/// One operate call as raw solver input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperateInput {
    pub user: u8,
    pub delta_col: i128,
    pub delta_debt: i128,
}

/// Fold an amount into [MIN_AMOUNT, MAX_AMOUNT) keeping its sign; the
/// "everything" sentinel and zero pass through
fn clamp_amount(amount: i128) -> i128 {
    if amount == i128::MIN || amount == 0 {
        return amount;
    }
    let magnitude = (amount.unsigned_abs() % (MAX_AMOUNT - MIN_AMOUNT) as u128) as i128 + MIN_AMOUNT;
    if amount < 0 {
        -magnitude
    } else {
        magnitude
    }
}

impl Sanitize for OperateInput {
    fn sanitize(self) -> Self {
        let delta_col = clamp_amount(self.delta_col);
        let mut delta_debt = clamp_amount(self.delta_debt);

        // Opening borrows stay under the collateral factor
        if delta_col > 0 && delta_debt > 0 {
            delta_debt = (delta_debt % (delta_col * MAX_BORROW_PCT / 100)).max(MIN_AMOUNT);
        }

        Self {
            user: self.user % N_USERS as u8,
            delta_col,
            delta_debt,
        }
    }
}

/// A tick inside the bitmap range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInput(pub i32);

impl Sanitize for TickInput {
    fn sanitize(self) -> Self {
        let span = (MAX_TICK - MIN_TICK + 1) as i64;
        let offset = (self.0 as i64).rem_euclid(span);
        TickInput(MIN_TICK + offset as i32)
    }
}
