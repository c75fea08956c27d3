//! The final-hash formula: a handful of `let` statements over a tiny
//! expression language.
//!
//! A formula is built once, then either evaluated against a key (that is how
//! candidates get tested, and how [`crate::PerfectHash::hash`] answers) or
//! rendered to Rust source lines. Both walk the same tree, so the emitted text
//! always computes what was tested.

use crate::hash::{CHECKSTATE, checksum_from, inline_hash, lookup};
use crate::key::KeyData;
use crate::util::{shl, shr};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit variable of the generated code.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    /// The integer key, or the initial hash of a byte key.
    Val,
    A,
    B,
    /// Scratch bit used by some four-key formulas.
    Bit,
    /// The result.
    Rsl,
}

impl Var {
    const COUNT: usize = 5;

    pub fn name(self) -> &'static str {
        match self {
            Var::Val => "val",
            Var::A => "a",
            Var::B => "b",
            Var::Bit => "bit",
            Var::Rsl => "rsl",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Xor,
    And,
}

impl Op {
    #[inline]
    fn apply(self, l: u32, r: u32) -> u32 {
        match self {
            Op::Add => l.wrapping_add(r),
            Op::Sub => l.wrapping_sub(r),
            Op::Xor => l ^ r,
            Op::And => l & r,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Var(Var),
    Const(u32),
    Shr(Box<Expr>, u32),
    Shl(Box<Expr>, u32),
    Bin(Op, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    /// `tab[e]`
    Tab(Box<Expr>),
    /// `scramble[e]`
    Scramble(Box<Expr>),
    /// `lookup(key, level)`
    Lookup(u32),
    /// `inline_hash(key, level)`
    Inline(u32),
    /// One word of the state set by [`Stmt::Checksum`].
    State(usize),
}

impl From<Var> for Expr {
    fn from(v: Var) -> Self {
        Expr::Var(v)
    }
}

impl From<u32> for Expr {
    fn from(c: u32) -> Self {
        Expr::Const(c)
    }
}

// Builders fold the trivial cases, so formulas built from loop counters
// (a shift by 0, a mask of 0) render the way a person would write them.
impl Expr {
    pub fn val() -> Self {
        Expr::Var(Var::Val)
    }

    pub fn shr(self, n: u32) -> Self {
        match self {
            _ if n == 0 => self,
            _ if n >= 32 => Expr::Const(0),
            Expr::Const(c) => Expr::Const(c >> n),
            e => Expr::Shr(Box::new(e), n),
        }
    }

    pub fn shl(self, n: u32) -> Self {
        match self {
            _ if n == 0 => self,
            _ if n >= 32 => Expr::Const(0),
            Expr::Const(c) => Expr::Const(c << n),
            e => Expr::Shl(Box::new(e), n),
        }
    }

    fn bin(op: Op, l: Expr, r: Expr) -> Self {
        match (op, l, r) {
            (op, Expr::Const(l), Expr::Const(r)) => Expr::Const(op.apply(l, r)),
            (Op::And, Expr::Const(0), _) | (Op::And, _, Expr::Const(0)) => Expr::Const(0),
            (Op::And, e, Expr::Const(u32::MAX)) => e,
            (Op::Xor | Op::Add, Expr::Const(0), e) => e,
            (Op::Xor | Op::Add | Op::Sub, e, Expr::Const(0)) => e,
            (op, l, r) => Expr::Bin(op, Box::new(l), Box::new(r)),
        }
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Self {
        Self::bin(Op::And, self, rhs.into())
    }

    pub fn xor(self, rhs: impl Into<Expr>) -> Self {
        Self::bin(Op::Xor, self, rhs.into())
    }

    pub fn add(self, rhs: impl Into<Expr>) -> Self {
        Self::bin(Op::Add, self, rhs.into())
    }

    pub fn sub(self, rhs: impl Into<Expr>) -> Self {
        Self::bin(Op::Sub, self, rhs.into())
    }

    pub fn neg(self) -> Self {
        match self {
            Expr::Const(c) => Expr::Const(c.wrapping_neg()),
            e => Expr::Neg(Box::new(e)),
        }
    }

    pub fn tab(self) -> Self {
        Expr::Tab(Box::new(self))
    }

    pub fn scramble(self) -> Self {
        Expr::Scramble(Box::new(self))
    }

    pub fn eval(&self, env: &Env<'_>) -> Option<u32> {
        Some(match self {
            Expr::Var(v) => env.get(*v)?,
            Expr::Const(c) => *c,
            Expr::Shr(e, n) => shr(e.eval(env)?, *n),
            Expr::Shl(e, n) => shl(e.eval(env)?, *n),
            Expr::Bin(op, l, r) => op.apply(l.eval(env)?, r.eval(env)?),
            Expr::Neg(e) => e.eval(env)?.wrapping_neg(),
            Expr::Tab(e) => *env.tab.get(e.eval(env)? as usize)?,
            Expr::Scramble(e) => *env.scramble.get(e.eval(env)? as usize)?,
            Expr::Lookup(level) => lookup(env.key?, *level),
            Expr::Inline(level) => inline_hash(env.key?, *level),
            Expr::State(w) => *env.state.as_ref()?.get(*w)?,
        })
    }

    /// Operators executed, counting a table read or a hash call as one.
    pub fn instructions(&self) -> usize {
        match self {
            Expr::Var(_) | Expr::Const(_) | Expr::State(_) => 0,
            Expr::Lookup(_) | Expr::Inline(_) => 1,
            Expr::Shr(e, _) | Expr::Shl(e, _) | Expr::Neg(e) | Expr::Tab(e) | Expr::Scramble(e) => {
                1 + e.instructions()
            }
            Expr::Bin(_, l, r) => 1 + l.instructions() + r.instructions(),
        }
    }

    /// Render without the outermost parentheses.
    fn fmt_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Shr(e, n) => write!(f, "{e} >> {n}"),
            Expr::Shl(e, n) => write!(f, "{e} << {n}"),
            Expr::Bin(Op::And, l, r) => write!(f, "{l} & {r}"),
            Expr::Bin(Op::Xor, l, r) => write!(f, "{l} ^ {r}"),
            e => write!(f, "{e}"),
        }
    }
}

/// `self` in method-call position: literals need a type suffix there.
struct Receiver<'a>(&'a Expr);

impl fmt::Display for Receiver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Const(c) => write!(f, "{}u32", Hex(*c)),
            e => write!(f, "{e}"),
        }
    }
}

/// A method argument: already delimited, so no outer parens.
struct Bare<'a>(&'a Expr);

impl fmt::Display for Bare<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_bare(f)
    }
}

/// Small numbers in decimal, the rest in hex.
struct Hex(u32);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 10 { write!(f, "{}", self.0) } else { write!(f, "0x{:x}", self.0) }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(v) => f.write_str(v.name()),
            Expr::Const(c) => write!(f, "{}", Hex(*c)),
            Expr::Shr(e, n) => write!(f, "({e} >> {n})"),
            Expr::Shl(e, n) => write!(f, "({e} << {n})"),
            Expr::Bin(Op::And, l, r) => write!(f, "({l} & {r})"),
            Expr::Bin(Op::Xor, l, r) => write!(f, "({l} ^ {r})"),
            Expr::Bin(Op::Add, l, r) => write!(f, "{}.wrapping_add({})", Receiver(l), Bare(r)),
            Expr::Bin(Op::Sub, l, r) => write!(f, "{}.wrapping_sub({})", Receiver(l), Bare(r)),
            Expr::Neg(e) => write!(f, "{}.wrapping_neg()", Receiver(e)),
            Expr::Tab(e) => write!(f, "u32::from(TAB[{e} as usize])"),
            Expr::Scramble(e) => write!(f, "u32::from(SCRAMBLE[{e} as usize])"),
            Expr::Lookup(level) => write!(f, "lookup(key, {})", Hex(*level)),
            Expr::Inline(level) => write!(f, "inline_hash(key, {})", Hex(*level)),
            Expr::State(w) => write!(f, "state[{w}]"),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// `let var = expr;`
    Let(Var, Expr),
    /// `let state = checksum_from(key, level);`
    Checksum(u32),
}

impl Stmt {
    pub fn exec(&self, env: &mut Env<'_>) -> Option<()> {
        match self {
            Stmt::Let(var, e) => {
                let v = e.eval(env)?;
                env.bind(*var, v);
            }
            Stmt::Checksum(level) => env.state = Some(checksum_from(env.key?, *level)),
        }
        Some(())
    }

    pub fn instructions(&self) -> usize {
        match self {
            Stmt::Let(_, e) => e.instructions(),
            Stmt::Checksum(_) => 1,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let(var, e) => {
                write!(f, "let {} = ", var.name())?;
                e.fmt_bare(f)?;
                f.write_str(";")
            }
            Stmt::Checksum(level) => write!(f, "let state = checksum_from(key, {});", Hex(*level)),
        }
    }
}

/// Where a set of integers differ: the lowest and highest varying bit and the
/// mask of every bit that varies at all.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitRange {
    pub lowbit: u32,
    pub highbit: u32,
    pub diffbits: u32,
}

impl BitRange {
    pub fn of(vals: &[u32]) -> Self {
        let first = vals.first().copied().unwrap_or(0);
        let diffbits = vals.iter().fold(0, |acc, &v| acc | (first ^ v));
        Self {
            lowbit: diffbits.trailing_zeros(),
            highbit: if diffbits == 0 { 0 } else { 31 - diffbits.leading_zeros() },
            diffbits,
        }
    }

    /// Number of bits between `lowbit` and `highbit`, inclusive.
    #[inline]
    pub fn width(&self) -> u32 {
        (self.highbit + 1).saturating_sub(self.lowbit)
    }
}

/// Bindings for one evaluation of a formula.
#[derive(Debug, Clone)]
pub struct Env<'a> {
    key: Option<&'a [u8]>,
    vars: [Option<u32>; Var::COUNT],
    state: Option<[u32; CHECKSTATE]>,
    tab: &'a [u32],
    scramble: &'a [u32],
}

impl<'a> Env<'a> {
    pub fn new(tab: &'a [u32], scramble: &'a [u32]) -> Self {
        Self { key: None, vars: [None; Var::COUNT], state: None, tab, scramble }
    }

    /// An environment with no tables, for formulas that do not read them.
    pub fn bare() -> Self {
        Self::new(&[], &[])
    }

    /// Bind the inputs a key provides: its bytes, `val`, or `a` and `b`.
    pub fn with_key(mut self, key: &'a KeyData) -> Self {
        match key {
            KeyData::Bytes(bytes) => self.key = Some(bytes),
            KeyData::Int(v) => self.bind(Var::Val, *v),
            KeyData::Pair { a, b } => {
                self.bind(Var::A, *a);
                self.bind(Var::B, *b);
            }
        }
        self
    }

    pub fn with(mut self, var: Var, v: u32) -> Self {
        self.bind(var, v);
        self
    }

    #[inline]
    pub fn bind(&mut self, var: Var, v: u32) {
        self.vars[var.slot()] = Some(v);
    }

    #[inline]
    pub fn get(&self, var: Var) -> Option<u32> {
        self.vars[var.slot()]
    }
}

/// The generated code for the final hash.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenCode {
    pub stmts: Vec<Stmt>,
    pub bits: BitRange,
}

impl GenCode {
    /// `rsl = expr`
    pub fn result(expr: Expr) -> Self {
        Self { stmts: vec![Stmt::Let(Var::Rsl, expr)], bits: BitRange::default() }
    }

    pub fn push(&mut self, var: Var, expr: Expr) -> &mut Self {
        self.stmts.push(Stmt::Let(var, expr));
        self
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.stmts.as_slice(), [Stmt::Let(Var::Rsl, Expr::Const(_))])
    }

    /// Run every statement and return `rsl`.
    pub fn eval(&self, mut env: Env<'_>) -> Option<u32> {
        for s in &self.stmts {
            s.exec(&mut env)?;
        }
        env.get(Var::Rsl)
    }

    /// `rsl` for each integer in `vals`, without tables.
    pub fn eval_ints(&self, vals: &[u32]) -> Option<Vec<u32>> {
        vals.iter().map(|&v| self.eval(Env::bare().with(Var::Val, v))).collect()
    }

    pub fn instructions(&self) -> usize {
        self.stmts.iter().map(Stmt::instructions).sum()
    }

    /// One Rust statement per line.
    pub fn lines(&self) -> Vec<String> {
        self.stmts.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for GenCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.stmts {
            writeln!(f, "{s}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fold_trivial_operations() {
        assert_eq!(Expr::val().shr(0), Expr::val());
        assert_eq!(Expr::val().shr(32), Expr::Const(0));
        assert_eq!(Expr::val().shl(40), Expr::Const(0));
        assert_eq!(Expr::val().and(0), Expr::Const(0));
        assert_eq!(Expr::val().xor(0), Expr::val());
        assert_eq!(Expr::Const(0).add(Expr::val()), Expr::val());
        assert_eq!(Expr::Const(6).xor(3), Expr::Const(5));
        assert_eq!(Expr::Const(1).neg(), Expr::Const(u32::MAX));
    }

    #[test]
    fn renders_rust_statements() {
        let code = GenCode::result(Expr::val().shr(4).and(3).xor(2));
        assert_eq!(code.lines(), vec!["let rsl = ((val >> 4) & 3) ^ 2;"]);

        let code = GenCode::result(Expr::val().add(Expr::val().shr(3)).and(7));
        assert_eq!(code.lines(), vec!["let rsl = val.wrapping_add(val >> 3) & 7;"]);

        let code = GenCode::result(Expr::Var(Var::A).xor(Expr::Var(Var::B).tab().scramble()));
        assert_eq!(
            code.lines(),
            vec!["let rsl = a ^ u32::from(SCRAMBLE[u32::from(TAB[b as usize]) as usize]);"]
        );

        let code = GenCode::result(Expr::Const(0x9e37_79b9).sub(Expr::val()));
        assert_eq!(code.lines(), vec!["let rsl = 0x9e3779b9u32.wrapping_sub(val);"]);
    }

    #[test]
    fn method_arguments_have_no_extra_parens() {
        assert_eq!(Expr::val().add(Expr::val().shr(3)).to_string(), "val.wrapping_add(val >> 3)");
        assert_eq!(Expr::val().sub(Expr::val().xor(5)).to_string(), "val.wrapping_sub(val ^ 5)");
        assert_eq!(
            Expr::val().add(Expr::val().shl(2).and(0xff)).to_string(),
            "val.wrapping_add((val << 2) & 0xff)"
        );
    }

    #[test]
    fn evaluation_follows_statement_order() {
        let mut code = GenCode::default();
        code.push(Var::Bit, Expr::val().shr(2).and(1));
        code.push(Var::Rsl, Expr::val().and(3).xor(Var::Bit).xor(Expr::Var(Var::Bit).shl(1)));
        assert_eq!(code.eval_ints(&[0b000, 0b100, 0b101]), Some(vec![0, 3, 2]));
        assert_eq!(code.instructions(), 6);
    }

    #[test]
    fn table_reads_out_of_range_yield_none() {
        let code = GenCode::result(Expr::val().tab());
        let tab = [5u32, 6];
        assert_eq!(code.eval(Env::new(&tab, &[]).with(Var::Val, 1)), Some(6));
        assert_eq!(code.eval(Env::new(&tab, &[]).with(Var::Val, 2)), None);
    }

    #[test]
    fn byte_keys_feed_the_initial_hash() {
        let key = KeyData::from("else");
        let mut code = GenCode::default();
        code.push(Var::Val, Expr::Lookup(7));
        code.push(Var::Rsl, Expr::val());
        assert_eq!(code.eval(Env::bare().with_key(&key)), Some(lookup(b"else", 7)));

        let code = GenCode {
            stmts: vec![Stmt::Checksum(3), Stmt::Let(Var::Rsl, Expr::State(1))],
            bits: BitRange::default(),
        };
        assert_eq!(code.eval(Env::bare().with_key(&key)), Some(checksum_from(b"else", 3)[1]));
        // an integer key has no bytes to hash
        assert_eq!(code.eval(Env::bare().with_key(&KeyData::Int(1))), None);
    }

    #[test]
    fn bit_range_spans_the_differing_bits() {
        let r = BitRange::of(&[0x10, 0x30, 0x110]);
        assert_eq!(r, BitRange { lowbit: 5, highbit: 8, diffbits: 0x120 });
        assert_eq!(r.width(), 4);
        assert_eq!(BitRange::of(&[7]).diffbits, 0);
    }
}
