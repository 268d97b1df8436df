//! Tick-bucketed collateralized-debt vault engine
//!
//! Positions are grouped into ticks by their debt/collateral ratio. A
//! hierarchical bitmap finds the riskiest tick that still holds debt, and
//! liquidation walks ticks downward from there, closing tick epochs and
//! retiring branches as it goes. Everything here is in-memory; custody,
//! pricing and persistence belong to the caller.

pub mod constants;
pub mod error;
pub mod config;
pub mod math;
pub mod state;
pub mod market;
pub mod events;
pub mod engine;
pub mod registry;
pub mod invariants;

// Re-export commonly used types
pub use constants::*;
pub use error::*;
pub use config::VaultConfig;
pub use state::*;
pub use market::*;
pub use events::*;
pub use engine::*;
pub use registry::VaultRegistry;
