//! Vault error taxonomy

use thiserror::Error;

/// How a failure should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-correctable input problem
    Input,
    /// Operation rejected by vault policy
    Policy,
    /// Ledger is inconsistent; the vault must stop serving calls
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // Input errors
    #[error("withdrawal exceeds position collateral")]
    InsufficientCollateral,
    #[error("payback exceeds position debt")]
    InsufficientDebt,
    #[error("liquidation collateral per debt below the requested minimum")]
    SlippageExceeded,
    #[error("amount below the dust threshold")]
    AmountInsufficient,
    #[error("operate needs a non-zero collateral or debt change")]
    InvalidOperateAmount,
    #[error("payback or deposit would make the position riskier")]
    InvalidPaybackOrDeposit,
    #[error("position {0} not found")]
    PositionNotFound(u32),
    #[error("vault {0} not found")]
    VaultNotFound(u16),
    #[error("no tick above the liquidation threshold holds debt")]
    NothingToLiquidate,

    // Policy violations
    #[error("position ratio above the allowed collateral factor")]
    PositionAboveCollateralFactor,
    #[error("borrow would exceed the liquidity utilization cap")]
    MaxUtilizationReached,
    #[error("borrow would exceed the vault borrow limit")]
    BorrowLimitReached,
    #[error("signer is not the position owner")]
    InvalidPositionAuthority,
    #[error("invalid vault config: {0}")]
    InvalidConfig(String),

    // Invariant violations
    #[error("branch {0} revisited while walking branch connections")]
    BranchCycle(u32),
    #[error("branch {0} does not exist")]
    BranchNotFound(u32),
    #[error("bitmap bit for tick {0} disagrees with tick debt")]
    BitmapDesync(i32),
    #[error("tick {0} outside the supported range")]
    TickOutOfRange(i32),
    #[error("tick ledger underflow")]
    Underflow,
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("vault {0} halted after an invariant violation")]
    VaultPoisoned(u16),
}

impl VaultError {
    pub fn class(&self) -> ErrorClass {
        use VaultError::*;
        match self {
            InsufficientCollateral
            | InsufficientDebt
            | SlippageExceeded
            | AmountInsufficient
            | InvalidOperateAmount
            | InvalidPaybackOrDeposit
            | PositionNotFound(_)
            | VaultNotFound(_)
            | NothingToLiquidate => ErrorClass::Input,
            PositionAboveCollateralFactor
            | MaxUtilizationReached
            | BorrowLimitReached
            | InvalidPositionAuthority
            | InvalidConfig(_) => ErrorClass::Policy,
            BranchCycle(_)
            | BranchNotFound(_)
            | BitmapDesync(_)
            | TickOutOfRange(_)
            | Underflow
            | MathOverflow
            | VaultPoisoned(_) => ErrorClass::Invariant,
        }
    }

    /// Fatal errors halt the vault instead of being returned to a retrying caller
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Invariant
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
