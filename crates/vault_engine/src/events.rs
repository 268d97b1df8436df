//! Audit events emitted by operate and liquidate

use serde::{Deserialize, Serialize};

use crate::state::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// Token-level deltas applied by operate
    Operate {
        position_id: u32,
        signer: Address,
        col_amount: i128,
        debt_amount: i128,
    },
    /// Position state after operate
    UserPosition {
        position_id: u32,
        owner: Address,
        tick: i32,
        tick_slot: u32,
        collateral: u128,
        debt: u128,
    },
    /// Liquidator paid `debt_amount` debt tokens for `col_amount` collateral tokens
    Liquidate {
        col_amount: u128,
        debt_amount: u128,
        signer: Address,
        recipient: Address,
    },
    /// Raw debt and collateral moved into the vault's absorbed totals
    Absorb {
        debt_absorbed: u128,
        col_absorbed: u128,
    },
    /// Tick range a liquidation walked
    LiquidateInfo {
        start_tick: i32,
        end_tick: i32,
    },
    /// Branch bookkeeping after a liquidation
    BranchUpdate {
        from_branch: u32,
        to_branch: u32,
        created: bool,
    },
}
