//! Open-addressing probe primitives.
//!
//! Linear probing with an ordered-probe invariant: within any contiguous run
//! of occupied slots, the hashes modded by the bucket count form a
//! non-decreasing sequence, with at most one isolated wrap from the last
//! bucket back to the first. The invariant is what lets a search stop early
//! on "modded hash exceeds target" without losing keys: if no slot with the
//! target modded hash appears before a greater one, none exists.
//!
//! The primitives are coupled to the slot storage only through the
//! [`ProbeSlots`] accessors, so the same algorithms serve both the real slot
//! array and the scratch container a rehash plans its permutation in.

/// Accessor bundle over an indexable slot container.
///
/// `modded_hash` and `key_eq` are only ever called on occupied slots;
/// `transfer` copies a whole slot (marker included) over another.
pub trait ProbeSlots {
    type Key;

    /// True if `index` can be written into without overwriting live data.
    fn is_free(&self, index: usize) -> bool;

    /// Stored hash of the slot at `index`, modded by the bucket count.
    fn modded_hash(&self, index: usize) -> usize;

    /// True if the key stored at `index` compares equal to `key`.
    fn key_eq(&self, index: usize, key: &Self::Key) -> bool;

    /// Put the contents of `from` into `to`.
    fn transfer(&mut self, to: usize, from: usize);

    /// Drop the element at `index` without marking the slot free.
    fn destroy(&mut self, index: usize);
}

#[inline]
pub(crate) fn increment_wrap(index: usize, modulus: usize) -> usize {
    (index + 1) % modulus
}

#[inline]
pub(crate) fn decrement_wrap(index: usize, modulus: usize) -> usize {
    (index + modulus - 1) % modulus
}

/// Search for `key` starting from its natural bucket.
///
/// Returns `(index, true)` when the key is stored at `index`, and
/// `(candidate, false)` when it is absent, where `candidate` is the index an
/// insertion of this key would target.
pub fn probe_find<S: ProbeSlots>(
    slots: &S,
    key: &S::Key,
    key_hash: usize,
    buckets: usize,
) -> (usize, bool) {
    let start = key_hash % buckets;
    let mut index = start;
    let mut iterated = false;

    // Collision overflow wrapped past the last bucket: a tail of an earlier
    // run whose natural bucket lies near the end. The key cannot live here;
    // walk to the end of the overflow.
    while !slots.is_free(index) && slots.modded_hash(index) > index {
        index = increment_wrap(index, buckets);
        iterated = true;
    }

    // No match if the overflow ended on a free slot or looped back around.
    if slots.is_free(index) || (iterated && index == start) {
        return (index, false);
    }

    // The modded hashes are non-decreasing; advance until one reaches the
    // target.
    let mut iterations = 0;
    while !slots.is_free(index) && slots.modded_hash(index) < start && iterations != buckets {
        index = increment_wrap(index, buckets);
        iterations += 1;
    }

    // No match if the walk crossed a free slot, skipped past the target
    // modded hash, or completed a full loop.
    if slots.is_free(index) || slots.modded_hash(index) > start || iterations == buckets {
        return (index, false);
    }

    // Scan the run of equal modded hashes, comparing keys in index order.
    let run_start = index;
    let mut iterations = 0;
    while !slots.is_free(index)
        && slots.modded_hash(index) == slots.modded_hash(run_start)
        && iterations != buckets
    {
        if slots.key_eq(index, key) {
            return (index, true);
        }

        index = increment_wrap(index, buckets);
        iterations += 1;
    }

    (index, false)
}

/// Select the insertion index for `key`, shifting successors forward when
/// the candidate slot is occupied.
///
/// Returns `(index, true)` with `index` free for writing when the key is
/// absent, `(index, false)` when the key already lives at `index`. Requires
/// at least one free slot unless the key is present; the shift preserves the
/// ordered-probe invariant because shifted slots keep their relative order
/// and the vacated gap sits exactly where the new modded hash belongs in the
/// non-decreasing sequence.
pub fn probe_emplace<S: ProbeSlots>(
    slots: &mut S,
    key: &S::Key,
    key_hash: usize,
    buckets: usize,
) -> (usize, bool) {
    let (mut index, found) = probe_find(slots, key, key_hash, buckets);

    if found {
        return (index, false);
    }

    if !slots.is_free(index) {
        let target = index;
        while !slots.is_free(index) {
            index = increment_wrap(index, buckets);
        }
        while index != target {
            let prev = decrement_wrap(index, buckets);
            slots.transfer(index, prev);
            index = prev;
        }
    }

    (index, true)
}

/// Remove `key`, compacting successors backward to restore the
/// ordered-probe invariant.
///
/// Returns the index left vacant (the caller marks it free), or `None` when
/// the key was absent. Compaction terminates at a free slot, at a slot
/// occupying its natural bucket, or after one full cycle.
pub fn probe_erase<S: ProbeSlots>(
    slots: &mut S,
    key: &S::Key,
    key_hash: usize,
    buckets: usize,
) -> Option<usize> {
    let (start_index, found) = probe_find(slots, key, key_hash, buckets);

    if !found {
        return None;
    }

    slots.destroy(start_index);

    let mut index = start_index;
    let mut next = increment_wrap(index, buckets);
    while !slots.is_free(next) && slots.modded_hash(next) != next && next != start_index {
        // Walk one run of equal modded hashes, pulling each element back a
        // step.
        let mut curr = index;
        let run_start = next;
        while !slots.is_free(next)
            && slots.modded_hash(next) == slots.modded_hash(run_start)
            && slots.modded_hash(next) != next
            && next != start_index
        {
            slots.transfer(curr, next);

            curr = next;
            next = increment_wrap(next, buckets);
        }

        index = curr;
    }

    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare in-memory container: `None` is a free slot, `Some((hash, key))`
    /// an occupied one.
    struct Line {
        slots: Vec<Option<(usize, u32)>>,
    }

    impl Line {
        fn new(buckets: usize) -> Self {
            Line {
                slots: vec![None; buckets],
            }
        }

        fn occupied(&self) -> Vec<usize> {
            (0..self.slots.len())
                .filter(|i| self.slots[*i].is_some())
                .collect()
        }
    }

    impl ProbeSlots for Line {
        type Key = u32;

        fn is_free(&self, index: usize) -> bool {
            self.slots[index].is_none()
        }

        fn modded_hash(&self, index: usize) -> usize {
            self.slots[index].map(|(h, _)| h % self.slots.len()).unwrap()
        }

        fn key_eq(&self, index: usize, key: &u32) -> bool {
            self.slots[index].map(|(_, k)| k == *key).unwrap_or(false)
        }

        fn transfer(&mut self, to: usize, from: usize) {
            self.slots[to] = self.slots[from];
        }

        fn destroy(&mut self, _index: usize) {}
    }

    fn place(line: &mut Line, hash: usize, key: u32) -> usize {
        let buckets = line.slots.len();
        let (index, inserted) = probe_emplace(line, &key, hash, buckets);
        assert!(inserted, "key {} already present", key);
        line.slots[index] = Some((hash, key));
        index
    }

    fn erase(line: &mut Line, hash: usize, key: u32) -> Option<usize> {
        let buckets = line.slots.len();
        let vacated = probe_erase(line, &key, hash, buckets)?;
        line.slots[vacated] = None;
        Some(vacated)
    }

    #[test]
    fn colliding_keys_extend_the_run() {
        let mut line = Line::new(7);
        for key in 0..5 {
            place(&mut line, 6, key);
        }
        place(&mut line, 2, 100);

        assert_eq!(line.occupied(), vec![0, 1, 2, 3, 4, 6]);
        for key in 0..5u32 {
            assert!(probe_find(&line, &key, 6, 7).1, "key {} lost", key);
        }
        assert!(probe_find(&line, &100, 2, 7).1);
    }

    #[test]
    fn displacing_insert_shifts_the_tail_forward() {
        let mut line = Line::new(5);
        place(&mut line, 2, 1);
        place(&mut line, 13, 2);
        place(&mut line, 22, 3);
        place(&mut line, 9, 4);
        place(&mut line, 11, 5);

        // 22 displaced 13 from index 3 to 4; 9 wrapped into 0.
        assert_eq!(line.slots[2], Some((2, 1)));
        assert_eq!(line.slots[3], Some((22, 3)));
        assert_eq!(line.slots[4], Some((13, 2)));
        assert_eq!(line.slots[0], Some((9, 4)));
        assert_eq!(line.slots[1], Some((11, 5)));
    }

    #[test]
    fn find_misses_report_the_insertion_candidate() {
        let mut line = Line::new(7);
        place(&mut line, 3, 1);

        let (candidate, found) = probe_find(&line, &9, 3, 7);
        assert!(!found);
        assert_eq!(candidate, 4);
    }

    #[test]
    fn erase_compacts_the_following_run() {
        let mut line = Line::new(7);
        for key in 0..5 {
            place(&mut line, 6, key);
        }
        place(&mut line, 2, 100);

        // the 6-run occupies 6,0,1,2,3; key 1 sits at index 0, and the
        // compaction pulls the 2-key back one step as well
        assert_eq!(erase(&mut line, 6, 1), Some(4));

        for key in [0u32, 2, 3, 4] {
            assert!(probe_find(&line, &key, 6, 7).1, "key {} lost", key);
        }
        assert!(probe_find(&line, &100, 2, 7).1);
        assert!(!probe_find(&line, &1, 6, 7).1);
    }

    #[test]
    fn erase_missing_key_reports_no_change() {
        let mut line = Line::new(3);
        place(&mut line, 0, 1);
        assert_eq!(erase(&mut line, 0, 9), None);
        assert_eq!(line.occupied(), vec![0]);
    }

    #[test]
    fn full_table_of_identical_hashes_drains_cleanly() {
        let mut line = Line::new(6);
        for key in 0..6 {
            place(&mut line, 3, key);
        }
        assert_eq!(line.occupied(), vec![0, 1, 2, 3, 4, 5]);

        for key in [5u32, 2, 0, 4, 1, 3] {
            assert!(erase(&mut line, 3, key).is_some(), "key {} not erased", key);
            let survivors: Vec<u32> = (0..6)
                .filter_map(|i| line.slots[i].map(|(_, k)| k))
                .collect();
            for survivor in survivors {
                assert!(
                    probe_find(&line, &survivor, 3, 6).1,
                    "key {} unreachable after erasing {}",
                    survivor,
                    key
                );
            }
        }
        assert!(line.occupied().is_empty());
    }
}
