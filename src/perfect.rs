//! Choose `tab[b]` for every bucket so that `a ^ scramble[tab[b]]` is injective.
//!
//! Buckets are mapped largest first. Mapping a bucket is a breadth-first search
//! over buckets: a candidate value for bucket B that collides with keys of
//! exactly one other bucket C makes C a child of B, and C is then asked to move.
//! The first candidate that collides with nothing ends the search, and the
//! values along the path back to the root are applied together.

use crate::bucket::BucketTable;
use crate::config::{Effort, HashForm, SCRAMBLED_TAB_VALUES, USE_SCRAMBLE};
use crate::key::Key;
use crate::scramble::Scramble;
use log::debug;

/// Bounds for one run of [`perfect`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    /// Final hashes must be below this.
    pub highhash: u32,
    /// Candidate table values are `0..values`.
    pub values: u32,
    /// Follow collisions into other buckets, not just direct hits.
    pub transitive: bool,
}

impl Limits {
    pub fn new(form: &HashForm, nkeys: u32, blen: u32, smax: u32) -> Self {
        Self {
            highhash: if form.minimal() { nkeys } else { smax },
            values: if blen < USE_SCRAMBLE { smax } else { SCRAMBLED_TAB_VALUES.min(smax) },
            transitive: form.effort == Effort::Slow || form.minimal(),
        }
    }
}

/// How a child got into the search tree.
#[derive(Debug, Clone, Copy)]
struct Link {
    parent: usize,
    new_val: u32,
    old_val: u32,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    bucket: u32,
    link: Link,
}

struct Perfector<'a> {
    keys: &'a [Key],
    table: &'a mut BucketTable,
    scramble: &'a Scramble,
    limits: Limits,
    /// Which key owns each final hash.
    slots: Vec<Option<u32>>,
    queue: Vec<Node>,
}

/// Find table values for every bucket of `table`.
///
/// On success the buckets hold their values and the final hash of each key,
/// by key index, is returned. On failure no slot is left half assigned, but
/// the bucket values are meaningless.
pub(crate) fn perfect(
    keys: &[Key],
    table: &mut BucketTable,
    scramble: &Scramble,
    limits: Limits,
) -> Option<Vec<u32>> {
    let blen = table.len();
    let mut p = Perfector {
        keys,
        table,
        scramble,
        limits,
        slots: vec![None; limits.highhash as usize],
        queue: Vec::with_capacity(blen as usize + 1),
    };

    for size in (1..=p.table.max_keys()).rev() {
        for b in 0..blen {
            if p.table.buckets[b as usize].keys.len() != size {
                continue;
            }
            if !p.augment(b, b + 1) {
                debug!("failed to map a bucket of {size} keys with {blen} buckets");
                return None;
            }
        }
    }

    let mut hashes = vec![0; keys.len()];
    let mut placed = 0;
    for (h, slot) in p.slots.iter().enumerate() {
        if let Some(k) = slot {
            hashes[*k as usize] = h as u32;
            placed += 1;
        }
    }
    debug_assert_eq!(placed, keys.len());
    Some(hashes)
}

impl Perfector<'_> {
    #[inline]
    fn hash(&self, key: u32, val: u32) -> u32 {
        self.keys[key as usize].a ^ self.scramble.get(val)
    }

    /// Map every key of bucket `root`, moving other buckets as needed.
    /// `highwater` must differ from every watermark already set.
    fn augment(&mut self, root: u32, highwater: u32) -> bool {
        self.queue.clear();
        self.queue.push(Node { bucket: root, link: Link { parent: 0, new_val: 0, old_val: 0 } });

        let mut q = 0;
        while q < self.queue.len() {
            if !self.limits.transitive && q == 1 {
                break;
            }
            let myb = self.queue[q].bucket as usize;

            'values: for val in 0..self.limits.values {
                let mut child: Option<u32> = None;
                for &k in &self.table.buckets[myb].keys {
                    let hash = self.hash(k, val);
                    if hash >= self.limits.highhash {
                        continue 'values;
                    }
                    let Some(other) = self.slots[hash as usize] else { continue };
                    let hit = self.keys[other as usize].b;
                    match child {
                        Some(c) if c != hit => continue 'values, // hit at most one other bucket
                        Some(_) => {}
                        None => {
                            if self.table.buckets[hit as usize].water == highwater {
                                continue 'values; // already in the tree
                            }
                            child = Some(hit);
                        }
                    }
                }

                let link = Link { parent: q, new_val: val, old_val: self.table.buckets[myb].val };
                match child {
                    Some(c) => {
                        self.table.buckets[c as usize].water = highwater;
                        self.queue.push(Node { bucket: c, link });
                    }
                    None => {
                        if self.apply(link, false) {
                            return true;
                        }
                    }
                }
            }
            q += 1;
        }
        false
    }

    /// Walk from `tip` to the root, giving each bucket on the way its new value
    /// (or back its old one, with `rollback`). A collision undoes the whole path.
    fn apply(&mut self, tip: Link, rollback: bool) -> bool {
        let mut link = tip;
        loop {
            let parent = link.parent;
            let pb = self.queue[parent].bucket as usize;

            // erase the parent's current hashes
            let old = self.table.buckets[pb].val;
            for &k in &self.table.buckets[pb].keys {
                let hash = self.keys[k as usize].a ^ self.scramble.get(old);
                if let Some(slot) = self.slots.get_mut(hash as usize) {
                    if *slot == Some(k) {
                        *slot = None;
                    }
                }
            }

            let val = if rollback { link.old_val } else { link.new_val };
            self.table.buckets[pb].val = val;

            let mut collided = false;
            if !(rollback && parent == 0) {
                // the root had no hashes before this search
                for &k in &self.table.buckets[pb].keys {
                    let hash = self.keys[k as usize].a ^ self.scramble.get(val);
                    match self.slots.get_mut(hash as usize) {
                        Some(slot) if rollback || slot.is_none() => *slot = Some(k),
                        Some(_) | None if rollback => {}
                        _ => {
                            collided = true;
                            break;
                        }
                    }
                }
            }
            if collided {
                self.apply(tip, true);
                return false;
            }

            if parent == 0 {
                return true;
            }
            link = self.queue[parent].link;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Fill;
    use crate::config::{Minimality, Mode};
    use crate::key::KeyData;

    fn keys(pairs: &[(u32, u32)]) -> Vec<Key> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, &(a, b))| {
                let mut k = Key::new(KeyData::Int(i as u32));
                k.a = a;
                k.b = b;
                k
            })
            .collect()
    }

    fn form(minimality: Minimality, effort: Effort) -> HashForm {
        HashForm { mode: Mode::Hex, minimality, effort }
    }

    fn run(pairs: &[(u32, u32)], blen: u32, smax: u32, form: HashForm) -> Option<(Vec<u32>, BucketTable)> {
        let keys = keys(pairs);
        let mut table = BucketTable::new(blen);
        assert_eq!(table.fill(&keys, false).unwrap(), Fill::Distinct);
        let scramble = Scramble::new(smax);
        let limits = Limits::new(&form, keys.len() as u32, blen, smax);
        let hashes = perfect(&keys, &mut table, &scramble, limits)?;
        // every hash is what the table says it is
        for (k, h) in keys.iter().zip(&hashes) {
            assert_eq!(k.a ^ scramble.get(table.buckets[k.b as usize].val), *h);
        }
        Some((hashes, table))
    }

    fn assert_minimal(hashes: &[u32]) {
        let mut sorted = hashes.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..hashes.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn single_key_buckets_always_map() {
        // 16 buckets that all want a = 5: every bucket must land elsewhere.
        let pairs: Vec<_> = (0..16).map(|b| (5, b)).collect();
        let (hashes, _) = run(&pairs, 16, 16, form(Minimality::Minimal, Effort::Slow)).unwrap();
        assert_minimal(&hashes);
    }

    #[test]
    fn paired_buckets_share_slot_pairs() {
        let pairs: Vec<_> = (0..8).flat_map(|b| [(0, b), (1, b)]).collect();
        let (hashes, _) = run(&pairs, 8, 16, form(Minimality::Minimal, Effort::Slow)).unwrap();
        assert_minimal(&hashes);
    }

    #[test]
    fn needs_augmenting_paths() {
        // Buckets of two and one keys over a tight range.
        let pairs = [(0, 0), (3, 0), (1, 1), (2, 1), (0, 2), (0, 3), (1, 4), (2, 5)];
        let (hashes, _) = run(&pairs, 8, 8, form(Minimality::Minimal, Effort::Slow)).unwrap();
        assert_minimal(&hashes);
    }

    #[test]
    fn non_minimal_range_is_smax() {
        let pairs: Vec<_> = (0..5).map(|b| (b * 3 % 8, b)).collect();
        let (hashes, _) = run(&pairs, 8, 8, form(Minimality::Perfect, Effort::Fast)).unwrap();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert!(hashes.iter().all(|&h| h < 8));
    }

    #[test]
    fn impossible_bucket_fails_cleanly() {
        // a = 0 and a = 3 differ in bit 1, but minimal hashes must be 0 or 1.
        assert!(run(&[(0, 0), (3, 0)], 1, 4, form(Minimality::Minimal, Effort::Slow)).is_none());
    }

    #[test]
    fn limits_follow_the_form() {
        let l = Limits::new(&form(Minimality::Minimal, Effort::Fast), 100, 64, 128);
        assert_eq!((l.highhash, l.values, l.transitive), (100, 128, true));
        let l = Limits::new(&form(Minimality::Perfect, Effort::Fast), 5000, 4096, 8192);
        assert_eq!((l.highhash, l.values, l.transitive), (8192, 256, false));
        // caller-given pairs can put b far above smax
        let l = Limits::new(&form(Minimality::Minimal, Effort::Slow), 2, 8192, 2);
        assert_eq!((l.highhash, l.values), (2, 2));
    }
}
