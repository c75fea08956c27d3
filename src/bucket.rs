//! Keys grouped by `b`.

use crate::builder::PhashError;
use crate::key::Key;

#[derive(Debug, Clone, Default)]
pub(crate) struct Bucket {
    /// Table value; the keys here hash to `a ^ scramble[val]`.
    pub val: u32,
    /// Indices into the key array, in insertion order.
    pub keys: Vec<u32>,
    /// Search that last visited this bucket.
    pub water: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    /// Every key has a distinct (a, b).
    Distinct,
    /// Two different keys share (a, b); another salt is needed.
    Collision,
}

#[derive(Debug)]
pub(crate) struct BucketTable {
    pub buckets: Vec<Bucket>,
}

impl BucketTable {
    pub fn new(blen: u32) -> Self {
        Self { buckets: vec![Bucket::default(); blen as usize] }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.buckets.len() as u32
    }

    /// Distribute `keys` by their `b`, checking (a, b) as they go in.
    ///
    /// Stops at the first collision unless `complete` is set. Two identical
    /// inputs colliding is an error either way.
    pub fn fill(&mut self, keys: &[Key], complete: bool) -> Result<Fill, PhashError> {
        for b in &mut self.buckets {
            b.val = 0;
            b.water = 0;
            b.keys.clear();
        }

        let mut fill = Fill::Distinct;
        for (i, key) in keys.iter().enumerate() {
            let bucket = &mut self.buckets[key.b as usize];
            for &j in &bucket.keys {
                let other = &keys[j as usize];
                if other.a != key.a {
                    continue;
                }
                if key.same_input(other) {
                    return Err(PhashError::DuplicateKey(key.data.clone()));
                }
                fill = Fill::Collision;
                if !complete {
                    return Ok(fill);
                }
            }
            bucket.keys.push(i as u32);
        }
        Ok(fill)
    }

    /// Size of the largest bucket.
    pub fn max_keys(&self) -> usize {
        self.buckets.iter().map(|b| b.keys.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyData;

    fn key(data: impl Into<KeyData>, a: u32, b: u32) -> Key {
        let mut k = Key::new(data.into());
        k.a = a;
        k.b = b;
        k
    }

    #[test]
    fn groups_keys_by_b_in_order() {
        let keys = vec![key("x", 0, 1), key("y", 1, 1), key("z", 0, 0)];
        let mut t = BucketTable::new(2);
        assert_eq!(t.fill(&keys, false).unwrap(), Fill::Distinct);
        assert_eq!(t.buckets[0].keys, vec![2]);
        assert_eq!(t.buckets[1].keys, vec![0, 1]);
        assert_eq!(t.max_keys(), 2);
    }

    #[test]
    fn distinct_keys_sharing_a_pair_collide() {
        let keys = vec![key("x", 3, 1), key("y", 3, 1)];
        let mut t = BucketTable::new(2);
        assert_eq!(t.fill(&keys, false).unwrap(), Fill::Collision);
    }

    #[test]
    fn identical_keys_are_duplicates() {
        let keys = vec![key("x", 0, 0), key("end", 2, 1), key("end", 2, 1)];
        let mut t = BucketTable::new(2);
        let err = t.fill(&keys, false).unwrap_err();
        assert!(matches!(err, PhashError::DuplicateKey(KeyData::Bytes(ref b)) if b == b"end"));
    }

    #[test]
    fn complete_fill_finds_a_later_duplicate() {
        // The first collision is between different keys; only a full pass
        // reaches the duplicate pair.
        let keys = vec![key("p", 1, 0), key("q", 1, 0), key(9u32, 5, 1), key(9u32, 5, 1)];
        let mut t = BucketTable::new(2);
        assert_eq!(t.fill(&keys, false).unwrap(), Fill::Collision);
        assert!(matches!(t.fill(&keys, true), Err(PhashError::DuplicateKey(KeyData::Int(9)))));
    }

    #[test]
    fn any_shared_pair_is_a_duplicate_in_pair_mode() {
        let keys = vec![key((4u32, 2u32), 4, 2), key((4u32, 2u32), 4, 2)];
        let mut t = BucketTable::new(4);
        assert!(matches!(t.fill(&keys, false), Err(PhashError::DuplicateKey(KeyData::Pair { a: 4, b: 2 }))));
    }
}
