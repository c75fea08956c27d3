use crate::config::KeyKind;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// One input key.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyData {
    Bytes(Vec<u8>),
    Int(u32),
    /// An (a, b) pair chosen by the caller; no hashing happens.
    Pair { a: u32, b: u32 },
}

impl KeyData {
    #[inline]
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyData::Bytes(_) => KeyKind::Bytes,
            KeyData::Int(_) => KeyKind::Int,
            KeyData::Pair { .. } => KeyKind::Pair,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            KeyData::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for KeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyData::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            KeyData::Int(v) => write!(f, "{v:08x}"),
            KeyData::Pair { a, b } => write!(f, "{a:08x} {b:08x}"),
        }
    }
}

impl From<&str> for KeyData {
    fn from(s: &str) -> Self {
        KeyData::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for KeyData {
    fn from(s: String) -> Self {
        KeyData::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for KeyData {
    fn from(b: &[u8]) -> Self {
        KeyData::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for KeyData {
    fn from(b: &[u8; N]) -> Self {
        KeyData::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for KeyData {
    fn from(b: Vec<u8>) -> Self {
        KeyData::Bytes(b)
    }
}

impl From<u32> for KeyData {
    fn from(v: u32) -> Self {
        KeyData::Int(v)
    }
}

impl From<(u32, u32)> for KeyData {
    fn from((a, b): (u32, u32)) -> Self {
        KeyData::Pair { a, b }
    }
}

/// Working record for one key during a build.
#[derive(Debug, Clone)]
pub(crate) struct Key {
    pub data: KeyData,
    pub hash: u32, // the integer itself for integer keys
    pub a: u32,
    pub b: u32,
}

impl Key {
    pub fn new(data: KeyData) -> Self {
        let (hash, a, b) = match data {
            KeyData::Bytes(_) => (0, 0, 0),
            KeyData::Int(v) => (v, 0, 0),
            KeyData::Pair { a, b } => (0, a, b),
        };
        Self { data, hash, a, b }
    }

    /// Whether two keys that already share (a, b) are the same input.
    ///
    /// Pairs are compared by (a, b) alone, so two pairs sharing it always count.
    pub fn same_input(&self, other: &Key) -> bool {
        match (&self.data, &other.data) {
            (KeyData::Bytes(x), KeyData::Bytes(y)) => x == y,
            (KeyData::Int(_), KeyData::Int(_)) => self.hash == other.hash,
            (KeyData::Pair { .. }, KeyData::Pair { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_the_right_kind() {
        assert_eq!(KeyData::from("if").kind(), KeyKind::Bytes);
        assert_eq!(KeyData::from(b"if").kind(), KeyKind::Bytes);
        assert_eq!(KeyData::from(7u32).kind(), KeyKind::Int);
        assert_eq!(KeyData::from((1u32, 2u32)).kind(), KeyKind::Pair);
    }

    #[test]
    fn only_strings_have_bytes() {
        assert_eq!(KeyData::from("do").as_bytes(), Some(&b"do"[..]));
        assert_eq!(KeyData::Int(7).as_bytes(), None);
        assert_eq!(KeyData::Pair { a: 1, b: 2 }.as_bytes(), None);
    }

    #[test]
    fn display_formats_like_diagnostics() {
        assert_eq!(KeyData::from("then").to_string(), "then");
        assert_eq!(KeyData::Int(0x1f).to_string(), "0000001f");
        assert_eq!(KeyData::Pair { a: 1, b: 0xab }.to_string(), "00000001 000000ab");
    }

    #[test]
    fn same_input_compares_the_raw_key() {
        let a = Key::new("end".into());
        let b = Key::new("end".into());
        let c = Key::new("else".into());
        assert!(a.same_input(&b));
        assert!(!a.same_input(&c));
        assert!(Key::new(7u32.into()).same_input(&Key::new(7u32.into())));
        assert!(!Key::new(7u32.into()).same_input(&Key::new(8u32.into())));
        assert!(Key::new((1, 2).into()).same_input(&Key::new((1, 2).into())));
    }
}
