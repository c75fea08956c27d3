//! Scramble permutation: a fixed bijection over `0..smax`.
//!
//! Applied to table values before they are xored into `a`, so that nearby
//! `tab[b]` values land far apart in the output range.

use crate::util::ceil_log2;

const ROUNDS: usize = 20;

/// A permutation of `0..1 << nbits`. `permute(0, _) == 0`.
pub fn permute(x: u32, nbits: u32) -> u32 {
    let mask = if nbits >= 32 { u32::MAX } else { (1u32 << nbits) - 1 };
    let (c2, c3, c4, c5) = (1 + nbits / 2, 1 + nbits / 3, 1 + nbits / 4, 1 + nbits / 5);
    let mut x = x & mask;
    for _ in 0..ROUNDS {
        x = x.wrapping_add(x << c2) & mask;
        x ^= x >> c3;
        x = x.wrapping_add(x << c4) & mask;
        x ^= x >> c5;
    }
    x
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scramble {
    values: Vec<u32>,
}

impl Scramble {
    /// `smax` distinct values in `0..smax`; `smax` must be a power of two.
    pub fn new(smax: u32) -> Self {
        let nbits = ceil_log2(smax);
        Self { values: (0..smax).map(|i| permute(i, nbits)).collect() }
    }

    #[inline]
    pub fn get(&self, i: u32) -> u32 {
        self.values[i as usize]
    }

    pub fn into_vec(self) -> Vec<u32> {
        self.values
    }
}
