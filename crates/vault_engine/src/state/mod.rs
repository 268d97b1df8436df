//! Vault ledgers

pub mod bitmap;
pub mod branch;
pub mod position;
pub mod tick;
pub mod vault_state;

pub use bitmap::TickHasDebtBitmap;
pub use branch::{Branch, BranchLedger, BranchStatus};
pub use position::{Address, Position, PositionRegistry, RealizedPosition};
pub use tick::{ClosureKind, EpochClosure, FillFractions, Tick, TickLedger};
pub use vault_state::VaultState;
