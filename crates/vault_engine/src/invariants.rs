//! Invariant checking helpers

use crate::constants::{COLD_TICK, ROOT_BRANCH_ID};
use crate::engine::Vault;
use crate::error::{VaultError, VaultResult};
use crate::math::add_u128;

/// Vault borrow equals the debt held across ticks
pub fn conservation_ok(v: &Vault) -> bool {
    v.state().total_borrow == v.ticks().total_debt()
}

/// Realized position collateral never exceeds what the vault holds
pub fn supply_covers_positions(v: &Vault) -> bool {
    let mut sum = 0u128;
    for p in v.positions().iter() {
        let realized = match p.realize(v.ticks()) {
            Ok(r) => r,
            Err(_) => return false,
        };
        sum = match add_u128(sum, realized.collateral) {
            Ok(s) => s,
            Err(_) => return false,
        };
    }
    sum <= v.state().total_supply
}

/// First tick whose bitmap bit disagrees with its debt, if any
pub fn bitmap_desync(v: &Vault) -> Option<i32> {
    let bitmap = v.ticks().bitmap();
    let mut with_debt = 0u32;
    for t in v.ticks().iter() {
        let has_debt = t.raw_debt > 0;
        if bitmap.is_set(t.tick) != has_debt {
            return Some(t.tick);
        }
        if has_debt {
            with_debt += 1;
        }
    }
    if bitmap.count() != with_debt {
        // a bit set for a tick the ledger never saw
        return bitmap.iter_desc().find(|tick| v.ticks().get(*tick).is_none());
    }
    if !bitmap.masks_consistent() {
        return Some(COLD_TICK);
    }
    None
}

pub fn bitmap_in_sync(v: &Vault) -> bool {
    bitmap_desync(v).is_none()
}

/// Topmost tick is the highest tick with debt
pub fn topmost_consistent(v: &Vault) -> bool {
    v.state().topmost_tick == v.ticks().bitmap().highest_tick_with_debt()
}

/// Every branch's lineage reaches the root
pub fn branches_acyclic(v: &Vault) -> bool {
    v.branches().iter().all(|b| v.branches().merge_walk(b.branch_id).is_ok())
}

/// Tick epochs only stay open under the current branch; every other
/// non-root branch is retired
pub fn only_current_branch_owns_ticks(v: &Vault) -> bool {
    let current = v.state().current_branch_id;
    v.branches()
        .iter()
        .filter(|b| b.branch_id != current)
        .all(|b| b.open_ticks == 0 && (b.branch_id == ROOT_BRANCH_ID || !b.is_active()))
}

/// Run every check, reporting the first violation as an invariant error
pub fn check_invariants(v: &Vault) -> VaultResult<()> {
    if let Some(tick) = bitmap_desync(v) {
        return Err(VaultError::BitmapDesync(tick));
    }
    if !topmost_consistent(v) {
        return Err(VaultError::BitmapDesync(v.state().topmost_tick));
    }
    for b in v.branches().iter() {
        v.branches().merge_walk(b.branch_id)?;
    }
    if !only_current_branch_owns_ticks(v) {
        return Err(VaultError::Underflow);
    }
    if !conservation_ok(v) || !supply_covers_positions(v) {
        return Err(VaultError::Underflow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use crate::market::{FixedPrice, Market, StaticLiquidity};
    use crate::state::Address;

    #[test]
    fn test_fresh_vault_passes() {
        let v = Vault::new(VaultConfig::default()).unwrap();
        assert!(check_invariants(&v).is_ok());
        assert!(branches_acyclic(&v));
        assert!(only_current_branch_owns_ticks(&v));
    }

    #[test]
    fn test_operated_vault_passes() {
        let mut v = Vault::new(VaultConfig::default()).unwrap();
        let (oracle, liq) = (FixedPrice::PARITY, StaticLiquidity::default());
        let market = Market::new(&oracle, &liq);
        v.operate(0, Address::repeat(1), 1_000_000_000, 400_000_000, &market).unwrap();
        v.operate(0, Address::repeat(2), 1_000_000_000, 700_000_000, &market).unwrap();
        v.operate(1, Address::repeat(1), 0, i128::MIN, &market).unwrap();

        assert!(conservation_ok(&v));
        assert!(bitmap_in_sync(&v));
        assert!(topmost_consistent(&v));
        assert!(supply_covers_positions(&v));
        assert!(check_invariants(&v).is_ok());
    }
}
