use crate::bucket::{BucketTable, Fill};
use crate::config::{BuildConfig, Effort, HashForm, KeyKind, Mode, USE_SCRAMBLE};
use crate::gencode::{BitRange, Expr, GenCode, Stmt, Var};
use crate::hash::{KeyHash, salt_level};
use crate::hex;
use crate::hexn::{HexStrategies, Mixing};
use crate::key::{Key, KeyData};
use crate::perfect::{Limits, perfect};
use crate::phash::PerfectHash;
use crate::scramble::Scramble;
use crate::util::ceil_log2;
use log::{debug, info, warn};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhashError {
    #[error("duplicate key: {0}")]
    DuplicateKey(KeyData),
    #[error("cannot perfect hash: {0}")]
    CapacityExceeded(Capacity),
    #[error("key {index} does not fit mode {mode}")]
    KeyKind { index: usize, mode: Mode },
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serde(#[from] Box<bincode::ErrorKind>),
}

/// Which limit a build ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Some keys share (a, b) under every salt tried at the largest sizes.
    DistinctPairs,
    /// `tab[]` could not be filled even with `blen == smax`.
    Table,
    /// A given `a` is at least twice the hash range, or a given `b` needs more than 2^31 buckets.
    PairRange,
    /// Given (a, b) pairs that no table can make perfect.
    PairTable,
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capacity::DistinctPairs => "cannot find distinct (A,B)",
            Capacity::Table => "cannot build tab[]",
            Capacity::PairRange => "(A,B) out of range for the number of keys",
            Capacity::PairTable => "cannot find a perfect hash for the given (A,B) pairs",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Builder {
    cfg: BuildConfig,
}

impl Builder {
    pub fn new() -> Self {
        Self { cfg: BuildConfig::default() }
    }

    pub fn with_config(mut self, cfg: BuildConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Build a perfect hash for `keys`, which must all be of the kind the mode takes.
    pub fn build<K, I>(self, keys: I) -> Result<PerfectHash, PhashError>
    where
        K: Into<KeyData>,
        I: IntoIterator<Item = K>,
    {
        let form = self.cfg.form;
        let keys: Vec<Key> = keys.into_iter().map(|k| Key::new(k.into())).collect();
        if let Some(index) = keys.iter().position(|k| k.data.kind() != form.kind()) {
            return Err(PhashError::KeyKind { index, mode: form.mode });
        }

        let result = find(&self.cfg, keys);
        match &result {
            Ok(ph) => info!(
                "found a perfect hash for {} keys ({}): salt {} alen {} blen {} smax {}, {} instructions",
                ph.nkeys,
                ph.form.mode,
                ph.salt,
                ph.alen,
                ph.blen,
                ph.smax,
                ph.code.instructions()
            ),
            Err(e) => warn!("{e}"),
        }
        result
    }
}

/// Pick the cheapest path that applies to this key set.
fn find(cfg: &BuildConfig, keys: Vec<Key>) -> Result<PerfectHash, PhashError> {
    let form = cfg.form;
    if keys.len() <= 1 {
        return Ok(constant(form, keys.len() as u32));
    }
    match form.kind() {
        KeyKind::Pair => hash_ab(form, keys),
        KeyKind::Int => match closed_form(form, &keys)? {
            Some(found) => Ok(found),
            None => Session::new(cfg, keys).search(),
        },
        KeyKind::Bytes => Session::new(cfg, keys).search(),
    }
}

#[inline]
fn smax_for(nkeys: u32) -> u32 {
    1 << ceil_log2(nkeys)
}

/// `rsl = 0`, for zero keys or one.
fn constant(form: HashForm, nkeys: u32) -> PerfectHash {
    PerfectHash {
        form,
        nkeys,
        salt: 1,
        alen: 0,
        blen: 0,
        smax: smax_for(nkeys),
        tab: Vec::new(),
        scramble: None,
        code: GenCode::result(Expr::Const(0)),
        hashes: vec![0; nkeys as usize],
    }
}

/// A table-free formula for up to eight integers.
fn closed_form(form: HashForm, keys: &[Key]) -> Result<Option<PerfectHash>, PhashError> {
    let vals: Vec<u32> = keys.iter().map(|k| k.hash).collect();
    // up to four keys the formulas are guaranteed, so duplicates must be ruled out first
    if vals.len() <= 4 {
        for (i, v) in vals.iter().enumerate() {
            if vals[..i].contains(v) {
                return Err(PhashError::DuplicateKey(KeyData::Int(*v)));
            }
        }
    }
    let Some(code) = hex::closed_form(&vals, form.minimal()) else {
        return Ok(None);
    };
    let Some(hashes) = code.eval_ints(&vals) else {
        return Ok(None);
    };
    let nkeys = vals.len() as u32;
    Ok(Some(PerfectHash {
        form,
        nkeys,
        salt: 1,
        alen: 0,
        blen: 0,
        smax: smax_for(nkeys),
        tab: Vec::new(),
        scramble: None,
        code,
        hashes,
    }))
}

/// Initial `alen`, `blen`, and maybe a doubled `smax`. The thresholds are empirical.
fn initalen(form: &HashForm, nkeys: u32, smax: &mut u32) -> (u32, u32) {
    let n = f64::from(nkeys);
    let fast = form.effort == Effort::Fast;
    let int = form.kind() == KeyKind::Int;

    let (alen, blen) = if !form.minimal() {
        if fast && n > f64::from(*smax) * 0.8 {
            *smax *= 2;
        }
        let s = *smax;
        let sf = f64::from(s);
        let mut blen = if int && s < 32 {
            s // speed over space
        } else if s / 4 <= 1 << 14 {
            if n <= sf * 0.56 {
                s / 32
            } else if n <= sf * 0.74 {
                s / 16
            } else {
                s / 8
            }
        } else if n <= sf * 0.6 {
            s / 16
        } else if n <= sf * 0.8 {
            s / 8
        } else {
            s / 4
        };
        if fast && blen < s / 8 {
            blen = s / 8;
        }
        // distinct integers already give distinct (a, b) with a this wide
        let alen = if int && s > 131_072 { 1u32 << (32 - ceil_log2(blen.max(1))).min(31) } else { s };
        (alen, blen)
    } else {
        let s = *smax;
        let sf = f64::from(s);
        let five_eighths = n <= sf * (5.0 / 8.0);
        match ceil_log2(s) {
            0..=8 => (s / 2, s / 2),
            9..=17 => {
                if fast {
                    (s / 2, s / 4)
                } else if s / 4 < USE_SCRAMBLE {
                    let x = if n <= sf * 0.52 { s / 8 } else { s / 4 };
                    (x, x)
                } else {
                    let alen = if five_eighths {
                        s / 8
                    } else if n <= sf * 0.75 {
                        s / 4
                    } else {
                        s / 2
                    };
                    (alen, s / 4)
                }
            }
            18 if fast => (s / 2, s / 2),
            18 => (s / 8, if five_eighths { s / 4 } else { s / 2 }),
            19 | 20 => {
                if five_eighths {
                    (s / 8, s / 4)
                } else {
                    (s / 2, s / 2)
                }
            }
            _ => (s / 2, s / 2),
        }
    };
    (alen.max(1), blen.max(1))
}

/// `a ^ tab[b]`, through `scramble[]` once the table is large.
fn combine(blen: u32, a: Expr, b: Expr) -> Expr {
    let t = if blen < USE_SCRAMBLE { b.tab() } else { b.tab().scramble() };
    a.xor(t)
}

/// The emitted `tab[]` and `scramble[]` for a solved bucket table.
fn output_tables(table: &BucketTable, scramble: Scramble) -> (Vec<u32>, Option<Vec<u32>>) {
    if table.len() < USE_SCRAMBLE {
        (table.buckets.iter().map(|b| scramble.get(b.val)).collect(), None)
    } else {
        (table.buckets.iter().map(|b| b.val).collect(), Some(scramble.into_vec()))
    }
}

/// Caller-supplied (a, b): no salt to retry with, only `smax` may grow.
fn hash_ab(form: HashForm, keys: Vec<Key>) -> Result<PerfectHash, PhashError> {
    let nkeys = keys.len() as u32;
    let mut smax = smax_for(nkeys);

    let span = |x: u32| (u64::from(x) + 1).next_power_of_two();
    let alen = keys.iter().map(|k| span(k.a)).max().unwrap_or(1);
    let blen = keys.iter().map(|k| span(k.b)).max().unwrap_or(1);
    if alen > 2 * u64::from(smax) || blen > 1 << 31 {
        return Err(PhashError::CapacityExceeded(Capacity::PairRange));
    }
    let (alen, blen) = (alen as u32, blen as u32);

    let mut table = BucketTable::new(blen);
    if table.fill(&keys, false)? == Fill::Collision {
        return Err(PhashError::CapacityExceeded(Capacity::DistinctPairs));
    }

    let mut scramble = Scramble::new(smax);
    let mut hashes = perfect(&keys, &mut table, &scramble, Limits::new(&form, nkeys, blen, smax));
    if hashes.is_none() && !form.minimal() {
        debug!("user (A,B) pairs do not fit smax {smax}, trying {}", smax * 2);
        smax *= 2;
        scramble = Scramble::new(smax);
        table.fill(&keys, false)?;
        hashes = perfect(&keys, &mut table, &scramble, Limits::new(&form, nkeys, blen, smax));
    }
    let hashes = hashes.ok_or(PhashError::CapacityExceeded(Capacity::PairTable))?;

    // permute(0) == 0, so an all-zero table adds nothing to a
    let used_tab = table.buckets.iter().any(|b| b.val != 0);
    let a = Expr::Var(Var::A);
    let rsl = if used_tab { combine(blen, a, Expr::Var(Var::B)) } else { a };
    let (tab, scramble) = output_tables(&table, scramble);

    Ok(PerfectHash {
        form,
        nkeys,
        salt: 1,
        alen,
        blen,
        smax,
        tab,
        scramble,
        code: GenCode::result(rsl),
        hashes,
    })
}

enum State {
    SearchDistinctAB { salt: u32 },
    SearchPerfection { salt: u32 },
    Done { salt: u32, hashes: Vec<u32> },
    Fatal(PhashError),
}

/// Everything one build owns while searching: the keys, the current sizes and
/// the tables sized by them.
struct Session<'c> {
    cfg: &'c BuildConfig,
    keys: Vec<Key>,
    nkeys: u32,
    alen: u32,
    blen: u32,
    smax: u32,
    maxalen: u32,
    scramble: Scramble,
    table: BucketTable,
    bits: BitRange,
    /// Integer keys only.
    strategies: Option<HexStrategies>,
    mixing: Option<Mixing>,
}

impl<'c> Session<'c> {
    fn new(cfg: &'c BuildConfig, keys: Vec<Key>) -> Self {
        let form = &cfg.form;
        let nkeys = keys.len() as u32;
        let mut smax = smax_for(nkeys);
        let (alen, blen) = initalen(form, nkeys, &mut smax);

        let (bits, strategies) = if form.kind() == KeyKind::Int {
            let vals: Vec<u32> = keys.iter().map(|k| k.hash).collect();
            let bits = BitRange::of(&vals);
            (bits, Some(HexStrategies::new(bits)))
        } else {
            (BitRange::default(), None)
        };

        Self {
            cfg,
            keys,
            nkeys,
            alen,
            blen,
            smax,
            maxalen: if form.minimal() { smax / 2 } else { smax },
            scramble: Scramble::new(smax),
            table: BucketTable::new(blen),
            bits,
            strategies,
            mixing: None,
        }
    }

    fn form(&self) -> &HashForm {
        &self.cfg.form
    }

    /// Hash every key to (a, b) under `salt` and bucket them.
    fn initkey(&mut self, salt: u32) -> Result<Fill, PhashError> {
        let (alen, blen) = (self.alen, self.blen);
        match self.cfg.form.mode {
            Mode::Generic | Mode::Inline => {
                let inline = self.cfg.form.mode == Mode::Inline;
                for k in &mut self.keys {
                    if let Some(bytes) = k.data.as_bytes() {
                        let h = if inline {
                            KeyHash::inline(bytes, salt, alen, blen)
                        } else {
                            KeyHash::generic(bytes, salt, alen, blen)
                        };
                        (k.a, k.b) = (h.a, h.b);
                    }
                }
            }
            Mode::Hex | Mode::Decimal | Mode::HexPair | Mode::DecimalPair => {
                if let Some(strategies) = &mut self.strategies {
                    let m = strategies.next(salt, alen, blen);
                    for k in &mut self.keys {
                        (k.a, k.b) = m.ab(k.hash).unwrap_or_default();
                    }
                    self.mixing = Some(m);
                }
            }
        }
        self.table.fill(&self.keys, false)
    }

    fn grow_blen(&mut self) {
        self.blen *= 2;
        self.table = BucketTable::new(self.blen);
    }

    /// Run the retry state machine to a perfect hash or a fatal error.
    fn search(mut self) -> Result<PerfectHash, PhashError> {
        let retry_perfect = if self.form().kind() == KeyKind::Int {
            self.cfg.retry_hex
        } else {
            self.cfg.retry_perfect
        };
        let mut bad_initkey = 0;
        let mut bad_perfect = 0;
        let mut state = State::SearchDistinctAB { salt: 1 };

        let (salt, hashes) = loop {
            state = match state {
                State::SearchDistinctAB { salt } => match self.initkey(salt)? {
                    Fill::Distinct => State::SearchPerfection { salt },
                    Fill::Collision => {
                        bad_initkey += 1;
                        if bad_initkey < self.cfg.retry_initkey {
                            State::SearchDistinctAB { salt: salt.wrapping_add(1) }
                        } else {
                            // more bits in (a, b) make distinct pairs likelier
                            (bad_initkey, bad_perfect) = (0, 0);
                            if self.alen < self.maxalen {
                                self.alen *= 2;
                                debug!("no distinct (A,B) after salt {salt}, alen now {}", self.alen);
                                State::SearchDistinctAB { salt: salt.wrapping_add(1) }
                            } else if self.blen < self.smax {
                                self.grow_blen();
                                debug!("no distinct (A,B) after salt {salt}, blen now {}", self.blen);
                                State::SearchDistinctAB { salt: salt.wrapping_add(1) }
                            } else {
                                // a duplicate key explains this better than the sizes do
                                self.table.fill(&self.keys, true)?;
                                State::Fatal(PhashError::CapacityExceeded(Capacity::DistinctPairs))
                            }
                        }
                    }
                },
                State::SearchPerfection { salt } => {
                    let limits = Limits::new(self.form(), self.nkeys, self.blen, self.smax);
                    match perfect(&self.keys, &mut self.table, &self.scramble, limits) {
                        Some(hashes) => State::Done { salt, hashes },
                        None => {
                            bad_perfect += 1;
                            if bad_perfect < retry_perfect {
                                State::SearchDistinctAB { salt: salt.wrapping_add(1) }
                            } else if self.blen < self.smax {
                                bad_perfect = 0;
                                self.grow_blen();
                                debug!("tab[] failed with salt {salt}, blen now {}", self.blen);
                                // this salt is known to give distinct (a, b)
                                State::SearchDistinctAB { salt }
                            } else {
                                State::Fatal(PhashError::CapacityExceeded(Capacity::Table))
                            }
                        }
                    }
                }
                State::Done { salt, hashes } => break (salt, hashes),
                State::Fatal(e) => return Err(e),
            };
        };

        Ok(self.finish(salt, hashes))
    }

    fn finish(self, salt: u32, hashes: Vec<u32>) -> PerfectHash {
        let Session { cfg, nkeys, alen, blen, smax, scramble, table, bits, mixing, .. } = self;
        let form = cfg.form;
        let level = salt_level(salt);

        let mut stmts = Vec::new();
        let (a, b) = match form.mode {
            Mode::Generic if KeyHash::needs_checksum(alen, blen) => {
                stmts.push(Stmt::Checksum(level));
                (Expr::State(0).and(alen - 1), Expr::State(1).and(blen - 1))
            }
            Mode::Generic => {
                stmts.push(Stmt::Let(Var::Val, Expr::Lookup(level)));
                (Expr::val().shr(32 - ceil_log2(alen)), Expr::val().and(blen - 1))
            }
            Mode::Inline => {
                stmts.push(Stmt::Let(Var::Val, Expr::Inline(level)));
                (Expr::val().and(alen - 1), Expr::val().shr(32 - ceil_log2(blen)))
            }
            Mode::Hex | Mode::Decimal | Mode::HexPair | Mode::DecimalPair => {
                stmts.extend(mixing.map(|m| m.stmts).unwrap_or_default());
                (Expr::Var(Var::A), Expr::Var(Var::B))
            }
        };
        stmts.push(Stmt::Let(Var::Rsl, combine(blen, a, b)));

        let (tab, scramble) = output_tables(&table, scramble);
        PerfectHash {
            form,
            nkeys,
            salt,
            alen,
            blen,
            smax,
            tab,
            scramble,
            code: GenCode { stmts, bits },
            hashes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Minimality;

    fn form(mode: Mode, minimality: Minimality, effort: Effort) -> HashForm {
        HashForm { mode, minimality, effort }
    }

    #[test]
    fn initalen_minimal_small_sets() {
        let f = form(Mode::Inline, Minimality::Minimal, Effort::Slow);
        let mut smax = 8;
        assert_eq!(initalen(&f, 5, &mut smax), (4, 4));
        assert_eq!(smax, 8);
        let mut smax = 2;
        assert_eq!(initalen(&f, 2, &mut smax), (1, 1));
    }

    #[test]
    fn initalen_minimal_large_sets() {
        let f = form(Mode::Generic, Minimality::Minimal, Effort::Slow);
        // 5000 keys: smax 8192, blen/4 below the scramble threshold
        let mut smax = 8192;
        assert_eq!(initalen(&f, 5000, &mut smax), (2048, 2048));
        let mut smax = 1 << 16;
        assert_eq!(initalen(&f, 40_000, &mut smax), (1 << 13, 1 << 14));
        let mut smax = 1 << 18;
        assert_eq!(initalen(&f, 200_000, &mut smax), (1 << 15, 1 << 17));
    }

    #[test]
    fn initalen_fast_perfect_may_double_smax() {
        let f = form(Mode::Generic, Minimality::Perfect, Effort::Fast);
        let mut smax = 1024;
        let (alen, blen) = initalen(&f, 900, &mut smax);
        assert_eq!(smax, 2048);
        assert_eq!((alen, blen), (2048, 256));
    }

    #[test]
    fn initalen_perfect_integers_prefer_speed() {
        let f = form(Mode::Hex, Minimality::Perfect, Effort::Slow);
        let mut smax = 16;
        assert_eq!(initalen(&f, 10, &mut smax), (16, 16));
        let mut smax = 1 << 18;
        let (alen, blen) = initalen(&f, 200_000, &mut smax);
        assert_eq!(blen, 1 << 15);
        assert_eq!(alen, 1 << 17);
    }

    #[test]
    fn capacity_messages() {
        let e = PhashError::CapacityExceeded(Capacity::Table);
        assert_eq!(e.to_string(), "cannot perfect hash: cannot build tab[]");
        let e = PhashError::DuplicateKey(KeyData::Int(7));
        assert_eq!(e.to_string(), "duplicate key: 00000007");
    }
}
