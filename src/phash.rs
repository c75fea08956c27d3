#[cfg(feature = "serde")]
use crate::builder::PhashError;
use crate::config::HashForm;
use crate::gencode::{Env, GenCode};
use crate::hash::salt_level;
use crate::key::KeyData;
use crate::util::BitSet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A finished perfect hash: the formula, the tables it reads, and the hash
/// every input key got.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfectHash {
    pub form: HashForm,
    pub nkeys: u32,
    /// Salt of the successful attempt; the formula uses `salt * GOLDEN`.
    pub salt: u32,
    pub alen: u32,
    /// Length of `tab`, 0 for closed forms.
    pub blen: u32,
    /// Power of two at least `nkeys`.
    pub smax: u32,
    pub tab: Vec<u32>,
    /// Present once `blen` is large enough that `tab` holds indices into it.
    pub scramble: Option<Vec<u32>>,
    pub code: GenCode,
    /// Final hash of each key, in input order.
    pub hashes: Vec<u32>,
}

/// Narrowest unsigned type an emitted table fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Width {
    U8,
    U16,
    U32,
}

impl Width {
    pub fn for_max(max: u32) -> Self {
        if max <= u32::from(u8::MAX) {
            Width::U8
        } else if max <= u32::from(u16::MAX) {
            Width::U16
        } else {
            Width::U32
        }
    }
}

impl PerfectHash {
    /// Run the formula on `key`. `None` if the key is of the wrong kind for the mode.
    ///
    /// For keys outside the build set the result is some value, not necessarily in range.
    #[inline]
    pub fn hash(&self, key: &KeyData) -> Option<u32> {
        if key.kind() != self.form.kind() {
            return None;
        }
        let scramble = self.scramble.as_deref().unwrap_or(&[]);
        self.code.eval(Env::new(&self.tab, scramble).with_key(key))
    }

    #[inline]
    pub fn hash_bytes(&self, key: &[u8]) -> Option<u32> {
        self.hash(&KeyData::Bytes(key.to_vec()))
    }

    #[inline]
    pub fn hash_int(&self, key: u32) -> Option<u32> {
        self.hash(&KeyData::Int(key))
    }

    /// Hashes fall in `0..range()`.
    pub fn range(&self) -> u32 {
        if self.form.minimal() { self.nkeys } else { self.smax }
    }

    /// The level constant the formula starts from.
    pub fn salt_constant(&self) -> u32 {
        salt_level(self.salt)
    }

    pub fn tab_width(&self) -> Width {
        if self.scramble.is_some() {
            Width::U8
        } else {
            Width::for_max(self.smax.saturating_sub(1))
        }
    }

    pub fn scramble_width(&self) -> Option<Width> {
        self.scramble.as_ref().map(|_| Width::for_max(self.smax.saturating_sub(1)))
    }

    /// The formula as Rust statements, one per line.
    pub fn lines(&self) -> Vec<String> {
        self.code.lines()
    }

    /// Whether `keys` all hash into range with no two alike.
    pub fn verify<'k, I>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = &'k KeyData>,
    {
        let range = self.range();
        let mut seen = BitSet::new(range as usize);
        keys.into_iter().all(|k| match self.hash(k) {
            Some(h) if h < range => !seen.test_and_set(h as usize),
            _ => false,
        })
    }

    #[cfg(feature = "serde")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, PhashError> {
        Ok(bincode::serialize(self)?)
    }

    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PhashError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
