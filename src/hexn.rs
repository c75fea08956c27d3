//! (a, b) for integer keys, when no closed form was found.
//!
//! Integer keys get no initial hash, so a new salt does not reshuffle them by
//! itself. Instead each attempt takes the next strategy from a fixed sequence:
//! raw bit windows of the key first (cheapest to evaluate), then windows at
//! every pair of offsets, and finally a salted mix that is retried forever.

use crate::gencode::{BitRange, Env, Expr, Stmt, Var};
use crate::hash::salt_level;
use crate::util::{ceil_log2, shl, shr};

/// Statements computing `a` and `b` from `val`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mixing {
    pub stmts: Vec<Stmt>,
}

impl Mixing {
    fn new(mut stmts: Vec<Stmt>, b: Expr, a: Expr) -> Self {
        stmts.push(Stmt::Let(Var::B, b));
        stmts.push(Stmt::Let(Var::A, a));
        Self { stmts }
    }

    pub fn ab(&self, val: u32) -> Option<(u32, u32)> {
        let mut env = Env::bare().with(Var::Val, val);
        for s in &self.stmts {
            s.exec(&mut env)?;
        }
        Some((env.get(Var::A)?, env.get(Var::B)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// a from the top of the varying bits, b from the bottom
    HighA,
    /// the other way round
    LowA,
    /// b at offset j, a ending at bit k
    Window,
    NextWindowK,
    SaltedStart,
    /// b at offset j of a salted mix, a from its top bits plus `val << k`
    Salted,
    NextSaltedK,
}

/// The sequence of (a, b) strategies for one key set.
#[derive(Debug, Clone)]
pub(crate) struct HexStrategies {
    bits: BitRange,
    stage: Stage,
    j: u32,
    k: u32,
}

fn v() -> Expr {
    Expr::val()
}

impl HexStrategies {
    pub fn new(bits: BitRange) -> Self {
        Self { bits, stage: Stage::HighA, j: 0, k: 0 }
    }

    /// The next strategy for tables of `alen` by `blen`.
    pub fn next(&mut self, salt: u32, alen: u32, blen: u32) -> Mixing {
        let BitRange { lowbit: lo, highbit: hi, diffbits: d } = self.bits;
        let (alog, blog) = (ceil_log2(alen), ceil_log2(blen));
        let (amask, bmask) = (alen.wrapping_sub(1), blen.wrapping_sub(1));

        loop {
            match self.stage {
                Stage::HighA => {
                    self.stage = Stage::LowA;
                    return Mixing::new(vec![], v().shr(lo).and(bmask), v().shl(31 - hi).shr(32 - alog));
                }
                Stage::LowA => {
                    (self.stage, self.j, self.k) = (Stage::Window, lo, lo);
                    return Mixing::new(vec![], v().shl(31 - hi).shr(32 - blog), v().shr(lo).and(amask));
                }
                Stage::Window => {
                    if self.j >= hi {
                        self.stage = Stage::NextWindowK;
                        continue;
                    }
                    let m = Mixing::new(vec![], v().shr(self.j).and(bmask), v().shl(31 - self.k).shr(32 - alog));
                    // skip offsets where b would see almost nothing vary
                    self.j += 1;
                    while self.j < hi && shr(d, self.j) & bmask <= 2 {
                        self.j += 1;
                    }
                    return m;
                }
                Stage::NextWindowK => {
                    self.k += 1;
                    while self.k < hi && shr(shl(d, 31 - self.k), alog) & amask == 0 {
                        self.k += 1;
                    }
                    if self.k >= hi {
                        self.stage = Stage::SaltedStart;
                    } else {
                        (self.stage, self.j) = (Stage::Window, lo);
                    }
                }
                Stage::SaltedStart => {
                    (self.stage, self.j, self.k) = (Stage::Salted, 0, 0);
                }
                Stage::Salted => {
                    if self.j > 32 - blog {
                        self.stage = Stage::NextSaltedK;
                        continue;
                    }
                    let width = self.bits.width();
                    let mut pre = vec![Stmt::Let(Var::Val, v().add(salt_level(salt)))];
                    if width > 16 {
                        pre.push(Stmt::Let(Var::Val, v().xor(v().shr(16))));
                    }
                    if width > 8 {
                        pre.push(Stmt::Let(Var::Val, v().add(v().shl(8))));
                    }
                    pre.push(Stmt::Let(Var::Val, v().xor(v().shr(4))));
                    let a = if self.k == 0 { v() } else { v().add(v().shl(self.k)) };
                    let m = Mixing::new(pre, v().shr(self.j).and(bmask), a.shr(32 - alog));
                    self.j += 1;
                    return m;
                }
                Stage::NextSaltedK => {
                    self.k += 1;
                    if self.k > 32 - alog {
                        self.stage = Stage::SaltedStart;
                    } else {
                        (self.stage, self.j) = (Stage::Salted, 0);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::GOLDEN;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn lines(m: &Mixing) -> Vec<String> {
        m.stmts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn starts_with_raw_windows() {
        let mut s = HexStrategies::new(BitRange::of(&[0x00, 0xf0]));
        let m = s.next(1, 4, 4);
        assert_eq!(lines(&m), vec!["let b = (val >> 4) & 3;", "let a = (val << 24) >> 30;"]);
        assert_eq!(m.ab(0xf0), Some((3, 3)));
        assert_eq!(m.ab(0x00), Some((0, 0)));

        let m = s.next(2, 4, 4);
        assert_eq!(lines(&m), vec!["let b = (val << 24) >> 30;", "let a = (val >> 4) & 3;"]);
    }

    #[test]
    fn ends_in_salted_mixing_forever() {
        let mut s = HexStrategies::new(BitRange::of(&[0x1, 0x2, 0x40_0000, 0x8000_0001]));
        let mut salted = 0;
        for salt in 1..3000u32 {
            let m = s.next(salt, 16, 8);
            if let Some(Stmt::Let(Var::Val, e)) = m.stmts.first() {
                assert_eq!(*e, Expr::val().add(salt.wrapping_mul(GOLDEN)));
                salted += 1;
            }
        }
        assert!(salted > 2000);
    }

    #[test]
    fn a_and_b_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let vals: Vec<u32> = (0..40).map(|_| rng.r#gen()).collect();
        let mut s = HexStrategies::new(BitRange::of(&vals));
        for salt in 1..2000u32 {
            let (alen, blen) = (1u32 << rng.gen_range(0..8u32), 1u32 << rng.gen_range(0..8u32));
            let m = s.next(salt, alen, blen);
            for &x in &vals {
                let (a, b) = m.ab(x).unwrap();
                assert!(a < alen && b < blen, "{:?}", lines(&m));
            }
        }
    }
}
