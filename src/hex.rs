//! Closed-form hashes for up to eight integer keys.
//!
//! Integers are hashed as they are, with no initial mixing, so for a handful of
//! keys there is often a formula of a few shifts and masks that is already a
//! perfect hash. Up to four keys one always exists and is found; for five to
//! eight keys the search is a gamble. Every candidate is tested by evaluating
//! it, cheapest first.

use crate::gencode::{BitRange, Env, Expr, GenCode, Var};

/// A table-free formula for a few distinct integers, if one is found.
pub(crate) fn closed_form(vals: &[u32], minimal: bool) -> Option<GenCode> {
    let bits = BitRange::of(vals);
    let code = match *vals {
        [] | [_] => hexone(),
        [a, b] => hextwo(a, b),
        [a, b, c] => hexthree([a, b, c], bits, minimal)?,
        [a, b, c, d] => hexfour([a, b, c, d], bits)?,
        _ if vals.len() <= 8 => hexeight(vals, bits, minimal)?,
        _ => return None,
    };
    Some(GenCode { bits, ..code })
}

fn v() -> Expr {
    Expr::val()
}

fn distinct(out: &[u32]) -> bool {
    out.iter().enumerate().all(|(i, x)| !out[..i].contains(x))
}

/// Whether `out` is a permutation of `0..out.len()`.
fn permutation(out: &[u32]) -> bool {
    distinct(out) && out.iter().all(|&x| (x as usize) < out.len())
}

/// The first candidate whose outputs on `vals` satisfy `accept`.
fn first(
    vals: &[u32],
    candidates: impl IntoIterator<Item = Expr>,
    accept: impl Fn(&[u32]) -> bool,
) -> Option<(Expr, Vec<u32>)> {
    candidates.into_iter().find_map(|e| {
        let out = vals
            .iter()
            .map(|&x| e.eval(&Env::bare().with(Var::Val, x)))
            .collect::<Option<Vec<_>>>()?;
        accept(&out).then_some((e, out))
    })
}

fn solved(found: Option<(Expr, Vec<u32>)>) -> Option<GenCode> {
    found.map(|(e, _)| GenCode::result(e))
}

/// One key: always 0.
fn hexone() -> GenCode {
    GenCode::result(Expr::Const(0))
}

/// Two keys: test a bit where they differ.
fn hextwo(a: u32, b: u32) -> GenCode {
    GenCode::result(v().shr((a ^ b).trailing_zeros()).and(1))
}

/// Constant to xor onto three distinct 2-bit values so that none of them is 3.
fn find_adder(x: u32, y: u32, z: u32) -> u32 {
    x ^ y ^ z ^ 3
}

/// Three keys: find two bits that tell them apart.
///
/// Two distinct bits always do, and the pair closest together gives a xor
/// window with nothing in between, so the last stage cannot fail.
fn hexthree(vals: [u32; 3], bits: BitRange, minimal: bool) -> Option<GenCode> {
    let BitRange { lowbit: lo, highbit: hi, .. } = bits;
    let candidates = [v().and(3), v().shr(30)]
        .into_iter()
        .chain((0..hi).map(|i| v().shr(i).and(3)))
        .chain((0..=hi).map(|i| v().add(v().shr(i)).and(3)))
        .chain((lo..=hi).flat_map(|i| (i..=hi).map(move |j| v().shr(i).xor(v().shr(j)).and(3))));

    let (e, out) = first(&vals, candidates, distinct)?;
    if !minimal || !out.contains(&3) {
        return Some(GenCode::result(e));
    }
    Some(GenCode::result(e.xor(find_adder(out[0], out[1], out[2]))))
}

/// Four keys: search growing formulas, then fall back on three bits that
/// distinguish the keys. For bits m < n and o, one of
/// `bit_m ^ bit_n << 1 ^ q * bit_o` with q in 0..4 is always a permutation.
fn hexfour(vals: [u32; 4], bits: BitRange) -> Option<GenCode> {
    let BitRange { lowbit: lo, highbit: hi, diffbits: d } = bits;

    let one = [(d & 3 == 3).then(|| v().and(3)), ((d >> 30) & 3 == 3).then(|| v().shr(30))];

    let two = (lo..hi).filter(move |&i| (d >> i) & 3 == 3).map(|i| v().shr(i).and(3));

    let three = (lo..=hi).filter(move |&i| d & 3 != 0 && (d >> i) & 3 != 0).flat_map(|i| {
        [
            v().add(v().shr(i)).and(3),
            v().sub(v().shr(i)).and(3),
            v().xor(v().shr(i)).and(3),
        ]
    });

    let four = (lo..=hi).filter(move |_| d & 3 != 0).flat_map(move |i| {
        let mut c = Vec::new();
        if (d >> i) & 1 != 0 && d & 2 != 0 {
            c.push(v().and(3).xor(v().shr(i).and(1)));
            c.push(v().and(2).xor(v().shr(i).and(1)));
        }
        if (d >> i) & 2 != 0 && d & 1 != 0 {
            c.push(v().and(3).xor(v().shr(i).and(2)));
            c.push(v().and(1).xor(v().shr(i).and(2)));
        }
        c
    });

    let pairs = move || (lo..=hi).filter(move |&i| (d >> i) & 1 != 0).flat_map(move |i| (lo..=hi).map(move |j| (i, j)));

    let quadratic = pairs().filter(move |&(_, j)| (d >> j) & 3 != 0).flat_map(|(i, j)| {
        [
            v().shr(i).add(v().shr(j)).and(3),
            v().shr(i).sub(v().shr(j)).and(3),
            v().shr(i).xor(v().shr(j)).and(3),
        ]
    });

    let five = pairs().flat_map(move |(i, j)| {
        let mut c = Vec::new();
        if (d >> j) & 3 != 0 {
            c.push(v().shr(j).and(3).xor(v().shr(i).and(1)));
            c.push(v().shr(j).and(2).xor(v().shr(i).and(1)));
        }
        c.push(if i == 0 {
            v().shr(j).xor(v().shl(1)).and(3)
        } else {
            v().shr(j).and(3).xor(v().shr(i - 1).and(2))
        });
        c.push(v().shr(j).and(1).xor(v().shr(i).and(2)));
        c
    });

    let candidates = one.into_iter().flatten().chain(two).chain(three).chain(four).chain(quadratic).chain(five);
    solved(first(&vals, candidates, permutation)).or_else(|| three_bits(vals, lo))
}

fn bit(x: u32, i: u32) -> u32 {
    (x >> i) & 1
}

fn three_bits(vals: [u32; 4], lo: u32) -> Option<GenCode> {
    let [_, b, c, d] = vals;

    // i splits c from d, (i, j) splits b, c and d, (i, j, k) splits all four
    let i = (lo..32).find(|&i| bit(c, i) != bit(d, i))?;
    let pair = |x: u32, j: u32| bit(x, i) ^ (bit(x, j) << 1);
    let j = (lo..32).find(|&j| distinct(&[pair(b, j), pair(c, j), pair(d, j)]))?;

    let two = v().shr(i).and(1).xor(v().shr(j).and(1).shl(1));
    if let Some(code) = solved(first(&vals, [two], permutation)) {
        return Some(code);
    }

    let k = (lo..32).find(|&k| {
        let out = vals.map(|x| pair(x, j) ^ (bit(x, k) << 2));
        distinct(&out)
    })?;

    // a bit that is not split two against two goes in o
    let ones = |at: u32| vals.iter().map(|&x| bit(x, at)).sum::<u32>();
    let (m, n, o) = if ones(i) != 2 {
        (j, k, i)
    } else if ones(j) != 2 {
        (i, k, j)
    } else {
        (i, j, k)
    };
    let (m, n) = (m.min(n), m.max(n));

    let low = || v().shr(m).and(1);
    let high = || v().shr(n - 1).and(2);
    let candidates = [
        v().shr(m).xor(v().shr(o)).and(1).xor(high()),
        low().xor(v().shr(n).xor(v().shr(o)).and(1).shl(1)),
    ];
    if let Some(code) = solved(first(&vals, candidates, permutation)) {
        return Some(code);
    }

    let mut times3 = GenCode::default();
    times3.push(Var::Bit, v().shr(o).and(1));
    times3.push(Var::Rsl, low().xor(high()).xor(Var::Bit).xor(Expr::Var(Var::Bit).shl(1)));
    if times3.eval_ints(&vals).is_some_and(|out| permutation(&out)) {
        return Some(times3);
    }

    solved(first(&vals, [low().xor(high())], permutation))
}

/// Five to eight keys: look for three bits of some cheap mix that are
/// distinct, and in minimal mode below the key count.
fn hexeight(vals: &[u32], bits: BitRange, minimal: bool) -> Option<GenCode> {
    let BitRange { lowbit: lo, highbit: hi, .. } = bits;
    let limit = if minimal { vals.len() as u32 } else { 8 };
    let accept = |out: &[u32]| distinct(out) && out.iter().all(|&x| x < limit);

    let windows = (lo..=hi.saturating_sub(2)).map(|i| v().shr(i).and(7));
    let sums = (lo..=hi).flat_map(move |i| {
        (i + 1..=hi).flat_map(move |j| {
            [
                v().shr(i).add(v().shr(j)).and(7),
                v().shr(i).xor(v().shr(j)).and(7),
                v().shr(i).sub(v().shr(j)).and(7),
            ]
        })
    });
    let triples = (lo..=hi).flat_map(move |i| {
        (i + 1..=hi).flat_map(move |j| (j + 1..=hi).map(move |k| v().shr(i).add(v().shr(j)).add(v().shr(k)).and(7)))
    });

    let candidates = std::iter::once(v().and(7)).chain(windows).chain(sums).chain(triples);
    solved(first(vals, candidates, accept))
}
