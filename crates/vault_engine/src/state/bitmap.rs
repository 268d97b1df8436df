//! Hierarchical "tick has debt" bitmap
//!
//! One bit per tick, 16 arrays x 8 maps x 32 bytes. Each array keeps a `u8`
//! mask of its non-empty maps and the root keeps a `u16` mask of non-empty
//! arrays, so a downward search skips empty regions without touching them.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{VaultError, VaultResult};

const TOTAL_BITS: i32 = (BITMAP_ARRAYS * MAPS_PER_ARRAY * BYTES_PER_MAP * 8) as i32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickHasDebtBitmap {
    arrays: [[[u8; BYTES_PER_MAP]; MAPS_PER_ARRAY]; BITMAP_ARRAYS],
    /// Bit m set when map m of the array holds any set bit
    map_masks: [u8; BITMAP_ARRAYS],
    /// Bit a set when array a holds any set bit
    root_mask: u16,
}

/// (array, map, byte, bit) of a bitmap offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitPos {
    array: usize,
    map: usize,
    byte: usize,
    bit: u32,
}

impl BitPos {
    fn from_offset(offset: i32) -> Self {
        Self {
            array: (offset >> 11) as usize,
            map: ((offset >> 8) & 7) as usize,
            byte: ((offset >> 3) & 31) as usize,
            bit: (offset & 7) as u32,
        }
    }

    fn offset(array: usize, map: usize, byte: usize, bit: u32) -> i32 {
        ((array as i32) << 11) | ((map as i32) << 8) | ((byte as i32) << 3) | bit as i32
    }
}

fn highest_bit_u8(x: u8) -> u32 {
    7 - x.leading_zeros()
}

impl Default for TickHasDebtBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHasDebtBitmap {
    pub fn new() -> Self {
        Self {
            arrays: [[[0u8; BYTES_PER_MAP]; MAPS_PER_ARRAY]; BITMAP_ARRAYS],
            map_masks: [0u8; BITMAP_ARRAYS],
            root_mask: 0,
        }
    }

    fn position(tick: i32) -> VaultResult<BitPos> {
        if !(MIN_TICK..=MAX_TICK).contains(&tick) {
            return Err(VaultError::TickOutOfRange(tick));
        }
        Ok(BitPos::from_offset(tick - BITMAP_BASE_TICK))
    }

    /// Mark `tick` as holding debt. Idempotent.
    pub fn set_bit(&mut self, tick: i32) -> VaultResult<()> {
        let p = Self::position(tick)?;
        self.arrays[p.array][p.map][p.byte] |= 1 << p.bit;
        self.map_masks[p.array] |= 1 << p.map;
        self.root_mask |= 1 << p.array;
        Ok(())
    }

    /// Clear `tick`, dropping the map and array mask bits once they go empty.
    /// Idempotent.
    pub fn clear_bit(&mut self, tick: i32) -> VaultResult<()> {
        let p = Self::position(tick)?;
        self.arrays[p.array][p.map][p.byte] &= !(1 << p.bit);

        if self.arrays[p.array][p.map].iter().all(|b| *b == 0) {
            self.map_masks[p.array] &= !(1 << p.map);
            if self.map_masks[p.array] == 0 {
                self.root_mask &= !(1 << p.array);
            }
        }
        Ok(())
    }

    pub fn is_set(&self, tick: i32) -> bool {
        match Self::position(tick) {
            Ok(p) => self.arrays[p.array][p.map][p.byte] & (1 << p.bit) != 0,
            Err(_) => false,
        }
    }

    /// Number of set bits
    pub fn count(&self) -> u32 {
        self.arrays
            .iter()
            .flat_map(|a| a.iter())
            .flat_map(|m| m.iter())
            .map(|b| b.count_ones())
            .sum()
    }

    /// Highest set tick strictly below `from_exclusive`, or `COLD_TICK`.
    ///
    /// Any cursor above `MAX_TICK` searches the whole index.
    pub fn find_next_tick_with_debt(&self, from_exclusive: i32) -> i32 {
        if from_exclusive <= MIN_TICK {
            return COLD_TICK;
        }
        let cursor = if from_exclusive > MAX_TICK {
            TOTAL_BITS - 1
        } else {
            from_exclusive - BITMAP_BASE_TICK - 1
        };
        let p = BitPos::from_offset(cursor);

        // Current byte, bits at or below the cursor
        let keep: u8 = if p.bit == 7 { 0xFF } else { (1u8 << (p.bit + 1)) - 1 };
        let byte = self.arrays[p.array][p.map][p.byte] & keep;
        if byte != 0 {
            return self.to_tick(BitPos::offset(p.array, p.map, p.byte, highest_bit_u8(byte)));
        }

        // Lower bytes of the same map
        for b in (0..p.byte).rev() {
            let byte = self.arrays[p.array][p.map][b];
            if byte != 0 {
                return self.to_tick(BitPos::offset(p.array, p.map, b, highest_bit_u8(byte)));
            }
        }

        // Lower maps of the same array
        let lower_maps = self.map_masks[p.array] & (((1u16 << p.map) - 1) as u8);
        if lower_maps != 0 {
            return self.highest_in_map(p.array, highest_bit_u8(lower_maps) as usize);
        }

        // Lower arrays
        let lower_arrays = self.root_mask & (((1u32 << p.array) - 1) as u16);
        if lower_arrays != 0 {
            let array = (15 - lower_arrays.leading_zeros()) as usize;
            let map = highest_bit_u8(self.map_masks[array]) as usize;
            return self.highest_in_map(array, map);
        }

        COLD_TICK
    }

    /// Highest tick with debt anywhere in the index
    pub fn highest_tick_with_debt(&self) -> i32 {
        self.find_next_tick_with_debt(MAX_TICK + 1)
    }

    fn highest_in_map(&self, array: usize, map: usize) -> i32 {
        for b in (0..BYTES_PER_MAP).rev() {
            let byte = self.arrays[array][map][b];
            if byte != 0 {
                return self.to_tick(BitPos::offset(array, map, b, highest_bit_u8(byte)));
            }
        }
        // mask bit set on an empty map
        COLD_TICK
    }

    fn to_tick(&self, offset: i32) -> i32 {
        offset + BITMAP_BASE_TICK
    }

    /// Every set tick, highest first
    pub fn iter_desc(&self) -> impl Iterator<Item = i32> + '_ {
        let mut cursor = MAX_TICK + 1;
        std::iter::from_fn(move || {
            let next = self.find_next_tick_with_debt(cursor);
            if next == COLD_TICK {
                None
            } else {
                cursor = next;
                Some(next)
            }
        })
    }

    /// Map and root masks agree with the bits they summarize
    pub fn masks_consistent(&self) -> bool {
        for (a, array) in self.arrays.iter().enumerate() {
            let mut expect_maps = 0u8;
            for (m, map) in array.iter().enumerate() {
                if map.iter().any(|b| *b != 0) {
                    expect_maps |= 1 << m;
                }
            }
            if self.map_masks[a] != expect_maps {
                return false;
            }
            let root_bit = self.root_mask & (1 << a) != 0;
            if root_bit != (expect_maps != 0) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_empty_bitmap() {
        let bm = TickHasDebtBitmap::new();
        assert_eq!(bm.highest_tick_with_debt(), COLD_TICK);
        assert_eq!(bm.count(), 0);
        assert!(!bm.is_set(0));
    }

    #[test]
    fn test_set_clear_idempotent() {
        let mut bm = TickHasDebtBitmap::new();
        bm.set_bit(-611).unwrap();
        bm.set_bit(-611).unwrap();
        assert!(bm.is_set(-611));
        assert_eq!(bm.count(), 1);

        bm.clear_bit(-611).unwrap();
        bm.clear_bit(-611).unwrap();
        assert!(!bm.is_set(-611));
        assert_eq!(bm, TickHasDebtBitmap::new());
    }

    #[test]
    fn test_out_of_range() {
        let mut bm = TickHasDebtBitmap::new();
        assert_eq!(bm.set_bit(MAX_TICK + 1), Err(VaultError::TickOutOfRange(MAX_TICK + 1)));
        assert!(bm.clear_bit(MIN_TICK - 1).is_err());
        assert!(!bm.is_set(COLD_TICK));
    }

    #[test]
    fn test_find_next_within_byte_is_exclusive() {
        let mut bm = TickHasDebtBitmap::new();
        bm.set_bit(100).unwrap();
        bm.set_bit(101).unwrap();
        assert_eq!(bm.find_next_tick_with_debt(102), 101);
        assert_eq!(bm.find_next_tick_with_debt(101), 100);
        assert_eq!(bm.find_next_tick_with_debt(100), COLD_TICK);
    }

    #[test]
    fn test_find_next_crosses_maps_and_arrays() {
        let mut bm = TickHasDebtBitmap::new();
        bm.set_bit(MIN_TICK).unwrap();
        bm.set_bit(-5000).unwrap();
        bm.set_bit(0).unwrap();
        bm.set_bit(MAX_TICK).unwrap();

        assert_eq!(bm.highest_tick_with_debt(), MAX_TICK);
        assert_eq!(bm.find_next_tick_with_debt(MAX_TICK), 0);
        assert_eq!(bm.find_next_tick_with_debt(0), -5000);
        assert_eq!(bm.find_next_tick_with_debt(-5000), MIN_TICK);
        assert_eq!(bm.find_next_tick_with_debt(MIN_TICK), COLD_TICK);
        assert_eq!(bm.iter_desc().collect::<Vec<_>>(), vec![MAX_TICK, 0, -5000, MIN_TICK]);
    }

    #[test]
    fn test_masks_follow_clears() {
        let mut bm = TickHasDebtBitmap::new();
        bm.set_bit(10).unwrap();
        bm.set_bit(11).unwrap();
        bm.set_bit(3000).unwrap();
        assert!(bm.masks_consistent());

        bm.clear_bit(10).unwrap();
        assert!(bm.masks_consistent());
        assert_eq!(bm.find_next_tick_with_debt(3000), 11);

        bm.clear_bit(11).unwrap();
        bm.clear_bit(3000).unwrap();
        assert!(bm.masks_consistent());
        assert_eq!(bm.root_mask, 0);
    }

    proptest! {
        #[test]
        fn prop_find_next_matches_reference(
            ticks in proptest::collection::vec(MIN_TICK..=MAX_TICK, 0..40),
            cursors in proptest::collection::vec(MIN_TICK - 5..=MAX_TICK + 5, 1..20),
        ) {
            let mut bm = TickHasDebtBitmap::new();
            let mut reference = BTreeSet::new();
            for t in &ticks {
                bm.set_bit(*t).unwrap();
                reference.insert(*t);
            }
            // drop every third tick again
            for t in ticks.iter().step_by(3) {
                bm.clear_bit(*t).unwrap();
                reference.remove(t);
            }
            prop_assert!(bm.masks_consistent());
            prop_assert_eq!(bm.count() as usize, reference.len());

            for c in cursors {
                let expected = reference.range(..c).next_back().copied().unwrap_or(COLD_TICK);
                prop_assert_eq!(bm.find_next_tick_with_debt(c), expected);
            }
        }
    }
}
