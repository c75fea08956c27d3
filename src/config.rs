#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Use `scramble[]` once `blen` reaches this size; below it `tab[]` holds scrambled values.
pub const USE_SCRAMBLE: u32 = 4096;

/// Table values searched per bucket once `scramble[]` is in use (they must fit a byte).
pub const SCRAMBLED_TAB_VALUES: u32 = 256;

/// How keys are presented and which initial hash applies.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Arbitrary byte strings through `lookup` (or `checksum` for very wide tables).
    Generic,
    /// Byte strings through the per-byte inline hash.
    Inline,
    /// 32-bit integers, read as hex.
    Hex,
    /// 32-bit integers, read as decimal.
    Decimal,
    /// Caller-supplied (a, b) pairs, read as hex.
    HexPair,
    /// Caller-supplied (a, b) pairs, read as decimal.
    DecimalPair,
}

/// What kind of key a mode hashes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Bytes,
    Int,
    Pair,
}

impl Mode {
    #[inline]
    pub fn kind(self) -> KeyKind {
        match self {
            Mode::Generic | Mode::Inline => KeyKind::Bytes,
            Mode::Hex | Mode::Decimal => KeyKind::Int,
            Mode::HexPair | Mode::DecimalPair => KeyKind::Pair,
        }
    }

    /// Radix numeric keys are written in, if any.
    #[inline]
    pub fn radix(self) -> Option<u32> {
        match self {
            Mode::Hex | Mode::HexPair => Some(16),
            Mode::Decimal | Mode::DecimalPair => Some(10),
            Mode::Generic | Mode::Inline => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Generic => "generic-string",
            Mode::Inline => "inline-string",
            Mode::Hex => "hex-integer",
            Mode::Decimal => "decimal-integer",
            Mode::HexPair => "hex-pair",
            Mode::DecimalPair => "decimal-pair",
        };
        f.write_str(s)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Minimality {
    /// Hash values are exactly `0..nkeys`.
    Minimal,
    /// Hash values are distinct within `0..smax`, `smax` a power of two.
    Perfect,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effort {
    /// Only try direct table values for each bucket, bigger tables.
    Fast,
    /// Follow augmenting paths through the whole graph.
    Slow,
}

/// User directives for one build.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashForm {
    pub mode: Mode,
    pub minimality: Minimality,
    pub effort: Effort,
}

impl HashForm {
    #[inline]
    pub fn minimal(&self) -> bool {
        self.minimality == Minimality::Minimal
    }

    #[inline]
    pub fn kind(&self) -> KeyKind {
        self.mode.kind()
    }
}

impl Default for HashForm {
    fn default() -> Self {
        Self {
            mode: Mode::Inline,
            minimality: Minimality::Minimal,
            effort: Effort::Slow,
        }
    }
}

/// Build parameters.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub form: HashForm,
    /// Failed salts tolerated before `alen` or `blen` grows.
    pub retry_initkey: u32,
    /// Failed perfect() runs tolerated before `blen` grows, string keys.
    pub retry_perfect: u32,
    /// Same as `retry_perfect` for integer keys, where a new salt is cheap.
    pub retry_hex: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            form: HashForm::default(),
            retry_initkey: 2048,
            retry_perfect: 1,
            retry_hex: 200,
        }
    }
}

impl BuildConfig {
    pub fn with_form(form: HashForm) -> Self {
        Self { form, ..Default::default() }
    }

    pub fn mode(mode: Mode) -> Self {
        Self::with_form(HashForm { mode, ..Default::default() })
    }
}
