/// Ceiling of log2, with `ceil_log2(0) == ceil_log2(1) == 0`.
#[inline]
pub fn ceil_log2(val: u32) -> u32 {
    let mut i = 0;
    while i < 32 && (1u32 << i) < val {
        i += 1;
    }
    i
}

/// `x >> n`, yielding 0 once every bit has been shifted out.
#[inline]
pub fn shr(x: u32, n: u32) -> u32 {
    x.checked_shr(n).unwrap_or(0)
}

/// `x << n`, yielding 0 once every bit has been shifted out.
#[inline]
pub fn shl(x: u32, n: u32) -> u32 {
    x.checked_shl(n).unwrap_or(0)
}

#[derive(Debug)]
pub struct BitSet {
    bits: Vec<u64>,
    n: usize,
}

impl BitSet {
    pub fn new(n: usize) -> Self {
        let words = n.div_ceil(64);
        Self { bits: vec![0; words], n }
    }

    #[inline]
    pub fn test(&self, idx: usize) -> bool {
        debug_assert!(idx < self.n);
        let (w, b) = (idx / 64, idx % 64);
        (self.bits[w] >> b) & 1 == 1
    }

    #[inline]
    pub fn set(&mut self, idx: usize) {
        debug_assert!(idx < self.n);
        let (w, b) = (idx / 64, idx % 64);
        self.bits[w] |= 1u64 << b;
    }

    /// Sets `idx` and reports whether it was already set.
    #[inline]
    pub fn test_and_set(&mut self, idx: usize) -> bool {
        let was = self.test(idx);
        self.set(idx);
        was
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_log2_matches_powers() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4096), 12);
        assert_eq!(ceil_log2(4097), 13);
        assert_eq!(ceil_log2(u32::MAX), 32);
    }

    #[test]
    fn shifts_saturate_to_zero() {
        assert_eq!(shr(0xffff_ffff, 32), 0);
        assert_eq!(shl(0xffff_ffff, 40), 0);
        assert_eq!(shr(0x8000_0000, 31), 1);
        assert_eq!(shl(1, 0), 1);
    }

    #[test]
    fn bitset_tracks_members() {
        let mut s = BitSet::new(130);
        assert!(!s.test_and_set(129));
        assert!(s.test_and_set(129));
        assert!(!s.test(0));
        s.set(64);
        assert!(s.test(64));
    }
}
