//! Seeded pseudo-random number generator.

use std::num::Wrapping;

use glam::DVec3;


const MULTIPLIER: Wrapping<i64> = Wrapping(0x5DEECE66D);
const ADDEND: Wrapping<i64> = Wrapping(0xB);
const MASK: Wrapping<i64> = Wrapping((1 << 48) - 1);

const DOUBLE_DIV: f64 = (1u64 << 53) as f64;


/// A 48-bit linear congruential generator. The whole sequence is determined by the
/// seed given at construction, this is what makes noise tables reproducible.
#[derive(Debug, Clone)]
pub struct SeedRandom {
    state: Wrapping<i64>,
}

impl SeedRandom {

    #[inline]
    pub fn new(seed: i64) -> Self {
        Self { state: (Wrapping(seed) ^ MULTIPLIER) & MASK }
    }

    #[inline]
    fn next(&mut self, bits: u8) -> i32 {
        self.state = (self.state * MULTIPLIER + ADDEND) & MASK;
        (self.state.0 as u64 >> (48 - bits)) as i32
    }

    /// Get the next integer in range `0..bound`, the bound must be positive.
    pub fn next_int_bounded(&mut self, bound: i32) -> i32 {

        debug_assert!(bound > 0, "bound must be positive");

        if (bound & -bound) == bound {
            return (((bound as i64).wrapping_mul(self.next(31) as i64)) >> 31) as i32;
        }

        loop {
            let bits = self.next(31);
            let val = bits.rem_euclid(bound);
            if bits - val + (bound - 1) >= 0 {
                return val;
            }
        }

    }

    pub fn next_long(&mut self) -> i64 {
        ((self.next(32) as i64) << 32).wrapping_add(self.next(32) as i64)
    }

    /// Get the next pseudo-random double in range `0.0..1.0`.
    pub fn next_double(&mut self) -> f64 {
        let high = (self.next(26) as i64) << 27;
        let low = self.next(27) as i64;
        (high.wrapping_add(low) as f64) / DOUBLE_DIV
    }

    /// Get a vector of three pseudo-random doubles in range `0.0..1.0`.
    pub fn next_dvec3(&mut self) -> DVec3 {
        DVec3 {
            x: self.next_double(),
            y: self.next_double(),
            z: self.next_double(),
        }
    }

}
