//! Inline linear congruential generator shared by the tick functions.
//!
//! Callers keep a `u64` state word and advance it in place. Not suitable for
//! anything but musical randomness.

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub fn next_u32(rng_state: &mut u64) -> u32 {
    *rng_state = rng_state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*rng_state >> 33) as u32
}

/// Uniform index in `0..len`. `len` must be non-zero.
#[inline]
pub fn next_index(rng_state: &mut u64, len: usize) -> usize {
    (next_u32(rng_state) as usize) % len
}

/// Uniform value in `[0, 1)`.
#[inline]
pub fn next_unit(rng_state: &mut u64) -> f64 {
    next_u32(rng_state) as f64 / (1u64 << 31) as f64
}

/// Uniform value in `[lo, hi)`.
pub fn next_range(rng_state: &mut u64, lo: f64, hi: f64) -> f64 {
    lo + (hi - lo) * next_unit(rng_state)
}

/// Seed derived from the wall clock.
pub fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x853c_49e6_748f_ea9b)
        | 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_stays_in_range() {
        let mut state = 42;
        for _ in 0..1000 {
            let v = next_unit(&mut state);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn index_stays_below_len() {
        let mut state = 7;
        for _ in 0..1000 {
            assert!(next_index(&mut state, 5) < 5);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let (mut a, mut b) = (99, 99);
        for _ in 0..10 {
            assert_eq!(next_u32(&mut a), next_u32(&mut b));
        }
    }
}
