//! Fixed-point math used by the ledgers

pub mod safe;
pub mod tick;

pub use safe::*;
pub use tick::TickMath;
