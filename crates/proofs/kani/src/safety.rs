//! Kani safety proofs for tick math, the bitmap and the operate flow

use kani::{any, assume};
use vault_engine::invariants::{bitmap_in_sync, conservation_ok, supply_covers_positions, topmost_consistent};
use vault_engine::{TickHasDebtBitmap, TickMath, COLD_TICK, FixedPrice};

use crate::{adversary::*, generators::*, sanitizer::*};

/// Ratio grows strictly with tick
#[kani::proof]
fn tick_ratio_strictly_monotonic() {
    let TickInput(t) = any_tick().sanitize();
    assume(t < vault_engine::MAX_TICK);
    let lo = TickMath::ratio_at_tick(t);
    let hi = TickMath::ratio_at_tick(t + 1);
    kani::assert(lo.is_ok() && hi.is_ok(), "ticks in range must price");
    if let (Ok(lo), Ok(hi)) = (lo, hi) {
        kani::assert(lo < hi, "ratio must grow with tick");
    }
}

/// Floor tick of a tick's own ratio is that tick
#[kani::proof]
fn tick_at_ratio_inverts_ratio_at_tick() {
    let TickInput(t) = any_tick().sanitize();
    if let Ok(r) = TickMath::ratio_at_tick(t) {
        kani::assert(TickMath::tick_at_ratio(r) == t, "floor tick must round-trip");
        kani::assert(TickMath::tick_covering_ratio(r) == Ok(t), "ceil tick must round-trip");
    }
}

/// Setting a bit makes it the next tick found from just above it
#[kani::proof]
fn bitmap_set_then_find() {
    let TickInput(t) = any_tick().sanitize();
    let mut bitmap = TickHasDebtBitmap::new();
    kani::assert(bitmap.set_bit(t).is_ok(), "in-range set must succeed");
    kani::assert(bitmap.is_set(t), "bit must read back");
    kani::assert(bitmap.find_next_tick_with_debt(t + 1) == t, "walk must find the tick");
    kani::assert(bitmap.find_next_tick_with_debt(t) == COLD_TICK, "nothing below the only tick");
    kani::assert(bitmap.highest_tick_with_debt() == t, "single tick is the highest");
}

/// Clearing restores an empty bitmap with consistent masks
#[kani::proof]
fn bitmap_clear_restores_empty() {
    let TickInput(a) = any_tick().sanitize();
    let TickInput(b) = any_tick().sanitize();
    let mut bitmap = TickHasDebtBitmap::new();
    let _ = bitmap.set_bit(a);
    let _ = bitmap.set_bit(b);
    let _ = bitmap.clear_bit(a);
    kani::assert(bitmap.is_set(b) == (a != b), "other tick untouched");
    let _ = bitmap.clear_bit(b);
    kani::assert(bitmap.count() == 0, "bitmap must be empty");
    kani::assert(bitmap.masks_consistent(), "summary masks must follow the leaves");
    kani::assert(bitmap.highest_tick_with_debt() == COLD_TICK, "empty bitmap has no top");
}

/// Short operate sequences keep every ledger in agreement, and rejected
/// calls leave the vault untouched
#[kani::proof]
#[kani::unwind(8)]
fn operate_sequences_preserve_ledgers() {
    let mut h = match Harness::new() {
        Ok(h) => h,
        Err(_) => return,
    };
    let steps = any_steps();
    for input in steps {
        let before = h.vault.clone();
        if let Err(e) = h.step(input, FixedPrice::PARITY) {
            kani::assert(!e.is_fatal(), "operate must not hit invariant errors");
            kani::assert(h.vault == before, "failed operate must not mutate");
        }
        kani::assert(conservation_ok(&h.vault), "borrow must equal tick debt");
        kani::assert(supply_covers_positions(&h.vault), "supply must cover positions");
        kani::assert(bitmap_in_sync(&h.vault), "bitmap must follow tick debt");
        kani::assert(topmost_consistent(&h.vault), "topmost must be the highest tick");
    }
}

/// Liquidation after a bounded crash never breaks the ledgers
#[kani::proof]
#[kani::unwind(8)]
fn liquidation_preserves_ledgers() {
    let mut h = match Harness::new() {
        Ok(h) => h,
        Err(_) => return,
    };
    for input in any_steps() {
        let _ = h.step(input, FixedPrice::PARITY);
    }

    let oracle = crashed_price(any(), 20);
    let liq = vault_engine::StaticLiquidity::default();
    let market = vault_engine::Market::new(&oracle, &liq);
    let keeper = Harness::user(9);
    let top_before = h.vault.topmost_tick();
    let amount: u32 = any();
    let absorb: bool = any();

    match h.vault.liquidate(keeper, keeper, amount as u128, 0, absorb, &market, &mut vault_engine::Unmetered) {
        Ok(_) => kani::assert(h.vault.topmost_tick() <= top_before, "topmost must not rise"),
        Err(e) => kani::assert(!e.is_fatal(), "liquidate must not hit invariant errors"),
    }
    kani::assert(conservation_ok(&h.vault), "borrow must equal tick debt");
    kani::assert(bitmap_in_sync(&h.vault), "bitmap must follow tick debt");
    kani::assert(topmost_consistent(&h.vault), "topmost must be the highest tick");
}
