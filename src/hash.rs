//! Initial hashes: turn a raw key into a reproducible (a, b) pair.
//!
//! All of these are 32-bit, salt-driven and non-cryptographic. Their quality only
//! changes how many salts the builder burns before the (a, b) pairs come out distinct.

use crate::util::{ceil_log2, shr};

/// Golden ratio, the multiplier that turns a small salt into a hash level.
pub const GOLDEN: u32 = 0x9e37_79b9;

/// Number of 32-bit words of state in [`checksum`].
pub const CHECKSTATE: usize = 8;

/// Hash level for a salt, as it appears in emitted code.
#[inline]
pub const fn salt_level(salt: u32) -> u32 {
    salt.wrapping_mul(GOLDEN)
}

#[inline]
fn word(k: &[u8]) -> u32 {
    u32::from(k[0]) | (u32::from(k[1]) << 8) | (u32::from(k[2]) << 16) | (u32::from(k[3]) << 24)
}

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 13);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 8);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 13);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 12);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 16);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 5);
    *a = a.wrapping_sub(*b).wrapping_sub(*c) ^ (*c >> 3);
    *b = b.wrapping_sub(*c).wrapping_sub(*a) ^ (*a << 10);
    *c = c.wrapping_sub(*a).wrapping_sub(*b) ^ (*b >> 15);
}

/// Hash a variable-length key into 32 bits.
///
/// Consumes the key in 12-byte blocks through three accumulators, then folds the
/// tail in byte by byte. The low byte of `c` is reserved for the length.
pub fn lookup(key: &[u8], level: u32) -> u32 {
    let mut a = GOLDEN;
    let mut b = GOLDEN;
    let mut c = level;

    let mut blocks = key.chunks_exact(12);
    for block in &mut blocks {
        a = a.wrapping_add(word(&block[0..4]));
        b = b.wrapping_add(word(&block[4..8]));
        c = c.wrapping_add(word(&block[8..12]));
        mix(&mut a, &mut b, &mut c);
    }

    c = c.wrapping_add(key.len() as u32);
    for (i, &byte) in blocks.remainder().iter().enumerate() {
        let byte = u32::from(byte);
        match i {
            0..=3 => a = a.wrapping_add(byte << (8 * i)),
            4..=7 => b = b.wrapping_add(byte << (8 * (i - 4))),
            _ => c = c.wrapping_add(byte << (8 * (i - 7))),
        }
    }
    mix(&mut a, &mut b, &mut c);
    c
}

#[inline]
#[rustfmt::skip]
fn mixc(s: &mut [u32; CHECKSTATE]) {
    let [a, b, c, d, e, f, g, h] = s;
    *a ^= *b << 11; *d = d.wrapping_add(*a); *b = b.wrapping_add(*c);
    *b ^= *c >> 2;  *e = e.wrapping_add(*b); *c = c.wrapping_add(*d);
    *c ^= *d << 8;  *f = f.wrapping_add(*c); *d = d.wrapping_add(*e);
    *d ^= *e >> 16; *g = g.wrapping_add(*d); *e = e.wrapping_add(*f);
    *e ^= *f << 10; *h = h.wrapping_add(*e); *f = f.wrapping_add(*g);
    *f ^= *g >> 4;  *a = a.wrapping_add(*f); *g = g.wrapping_add(*h);
    *g ^= *h << 8;  *b = b.wrapping_add(*g); *h = h.wrapping_add(*a);
    *h ^= *a >> 9;  *c = c.wrapping_add(*h); *a = a.wrapping_add(*b);
}

#[inline]
fn mixc4(s: &mut [u32; CHECKSTATE]) {
    for _ in 0..4 {
        mixc(s);
    }
}

/// Hash a variable-length key into 256 bits of `state`.
///
/// Used when `a` and `b` together need more than 32 bits.
pub fn checksum(key: &[u8], state: &mut [u32; CHECKSTATE]) {
    let mut blocks = key.chunks_exact(32);
    for block in &mut blocks {
        for (w, chunk) in state.iter_mut().zip(block.chunks_exact(4)) {
            *w = w.wrapping_add(word(chunk));
        }
        mixc4(state);
    }

    state[7] = state[7].wrapping_add(key.len() as u32);
    for (i, &byte) in blocks.remainder().iter().enumerate() {
        let byte = u32::from(byte);
        if i < 28 {
            state[i / 4] = state[i / 4].wrapping_add(byte << (8 * (i % 4)));
        } else {
            state[7] = state[7].wrapping_add(byte << (8 * (i - 27)));
        }
    }
    mixc4(state);
}

/// [`checksum`] with every word of state set to `level`.
pub fn checksum_from(key: &[u8], level: u32) -> [u32; CHECKSTATE] {
    let mut state = [level; CHECKSTATE];
    checksum(key, &mut state);
    state
}

/// Per-byte rolling hash meant to be inlined into a caller's own scanning loop.
pub fn inline_hash(key: &[u8], level: u32) -> u32 {
    key.iter().fold(level, |hash, &byte| {
        (u32::from(byte) ^ hash).wrapping_add((hash << 26).wrapping_add(hash >> 6))
    })
}

/// The (a, b) pair a key maps to under one salt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyHash {
    pub a: u32, // 0..alen
    pub b: u32, // 0..blen
}

impl KeyHash {
    /// Whether the generic string hash needs the 256-bit checksum for these sizes.
    #[inline]
    pub fn needs_checksum(alen: u32, blen: u32) -> bool {
        ceil_log2(alen) + ceil_log2(blen) > 32
    }

    /// Generic string mode: `a` is the top bits, `b` the bottom bits.
    pub fn generic(key: &[u8], salt: u32, alen: u32, blen: u32) -> Self {
        let level = salt_level(salt);
        if Self::needs_checksum(alen, blen) {
            let state = checksum_from(key, level);
            return Self {
                a: state[0] & (alen - 1),
                b: state[1] & (blen - 1),
            };
        }
        let hash = lookup(key, level);
        let loga = ceil_log2(alen);
        Self {
            a: if loga > 0 { shr(hash, 32 - loga) } else { 0 },
            b: if blen > 1 { hash & (blen - 1) } else { 0 },
        }
    }

    /// Inline string mode: `b` gets the top bits, it matters more that `b` is uniform.
    pub fn inline(key: &[u8], salt: u32, alen: u32, blen: u32) -> Self {
        let hash = inline_hash(key, salt_level(salt));
        Self {
            a: if alen > 1 { hash & (alen - 1) } else { 0 },
            b: if blen > 1 { shr(hash, 32 - ceil_log2(blen)) } else { 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_deterministic_and_salted() {
        let k = b"then";
        assert_eq!(lookup(k, 1), lookup(k, 1));
        assert_ne!(lookup(k, salt_level(1)), lookup(k, salt_level(2)));
        assert_ne!(lookup(b"if", 0), lookup(b"fi", 0));
    }

    #[test]
    fn lookup_reads_every_tail_byte() {
        // Flip each byte of keys straddling the 12-byte block boundary.
        for len in [1usize, 4, 8, 11, 12, 13, 23, 24, 25] {
            let base: Vec<u8> = (0..len as u8).collect();
            let h = lookup(&base, 7);
            for i in 0..len {
                let mut k = base.clone();
                k[i] ^= 0x40;
                assert_ne!(lookup(&k, 7), h, "len {len} byte {i}");
            }
        }
    }

    #[test]
    fn lookup_length_matters() {
        assert_ne!(lookup(&[0u8; 3], 0), lookup(&[0u8; 4], 0));
        assert_ne!(lookup(&[], 0), lookup(&[0u8], 0));
    }

    #[test]
    fn checksum_reads_every_tail_byte() {
        for len in [1usize, 27, 28, 31, 32, 33, 63] {
            let base: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let s = checksum_from(&base, 3);
            for i in 0..len {
                let mut k = base.clone();
                k[i] ^= 1;
                assert_ne!(checksum_from(&k, 3), s, "len {len} byte {i}");
            }
        }
    }

    #[test]
    fn inline_hash_matches_the_documented_recurrence() {
        let level = salt_level(5);
        let mut h = level;
        for &c in b"else" {
            h = (u32::from(c) ^ h).wrapping_add((h << 26).wrapping_add(h >> 6));
        }
        assert_eq!(inline_hash(b"else", level), h);
        assert_eq!(inline_hash(b"", level), level);
    }

    #[test]
    fn key_hash_stays_in_range() {
        for (alen, blen) in [(1u32, 1u32), (2, 1), (1, 8), (64, 16), (1 << 20, 1 << 14)] {
            for salt in 1..20u32 {
                for k in [&b"if"[..], b"then", b"a much longer key than twelve bytes"] {
                    let g = KeyHash::generic(k, salt, alen, blen);
                    assert!(g.a < alen && g.b < blen);
                    let i = KeyHash::inline(k, salt, alen, blen);
                    assert!(i.a < alen && i.b < blen);
                }
            }
        }
    }

    #[test]
    fn wide_tables_switch_to_checksum() {
        assert!(!KeyHash::needs_checksum(1 << 16, 1 << 16));
        assert!(KeyHash::needs_checksum(1 << 17, 1 << 16));
        let k = KeyHash::generic(b"key", 1, 1 << 17, 1 << 16);
        let state = checksum_from(b"key", salt_level(1));
        assert_eq!(k, KeyHash { a: state[0] & ((1 << 17) - 1), b: state[1] & 0xffff });
    }
}
