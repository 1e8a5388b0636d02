//! Shared test support: keys with scripted hashes and a strict harness that
//! re-verifies every surviving key after each erase.

// Each test binary uses its own slice of this module.
#![allow(dead_code)]

use std::hash::{BuildHasher, Hash, Hasher};

use petek_map::{HeapMap, PersistentMap, Slot};
use petek_region::{HeapRegion, Region};

/// A key whose hash is pinned independently of its identity, so collision
/// patterns can be scripted. Distinct serials make distinct keys that still
/// hash alike.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PinnedKey {
    pub hash: u64,
    pub serial: u64,
}

impl Hash for PinnedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Build hasher that hands the pinned value through untouched.
#[derive(Default, Clone)]
pub struct PassThrough;

pub struct PassThroughHasher(u64);

impl Hasher for PassThroughHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.rotate_left(8) ^ b as u64;
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

impl BuildHasher for PassThrough {
    type Hasher = PassThroughHasher;

    fn build_hasher(&self) -> PassThroughHasher {
        PassThroughHasher(0)
    }
}

pub type ScriptedMap = PersistentMap<PinnedKey, u64, PassThrough, HeapRegion<Slot<PinnedKey, u64>>>;

/// Heap-backed map with a pass-through hasher, fixed to the given choice
/// sequence and sized to `buckets`.
pub fn scripted_map(choices: &[usize], buckets: usize) -> ScriptedMap {
    let mut map = PersistentMap::build(HeapRegion::open(None), 0, false, PassThrough, None)
        .expect("heap map");
    map.set_bucket_choices(choices.to_vec()).expect("choices");
    map.reserve(buckets).expect("reserve");
    map
}

pub fn plain_map() -> HeapMap<u64, u64> {
    HeapMap::new().expect("heap map")
}

/// Harness in the spirit of the original strict-operation tests: every
/// mutation re-checks that each surviving key still resolves and that the
/// table invariants hold.
pub struct Strict {
    pub map: ScriptedMap,
    keys: Vec<PinnedKey>,
    live: Vec<bool>,
    serial: u64,
}

impl Strict {
    pub fn new(map: ScriptedMap) -> Self {
        Strict {
            map,
            keys: Vec::new(),
            live: Vec::new(),
            serial: 0,
        }
    }

    pub fn fresh(&mut self, hash: u64) -> PinnedKey {
        self.serial += 1;
        PinnedKey {
            hash,
            serial: self.serial,
        }
    }

    /// Insert one unique key per listed hash; each must be fresh to the map.
    pub fn insert(&mut self, hashes: &[u64]) {
        for &hash in hashes {
            let key = self.fresh(hash);
            assert!(
                self.map.insert(key, hash).expect("insert"),
                "key {:?} unexpectedly present",
                key
            );
            self.keys.push(key);
            self.live.push(true);
        }
        self.assert_invariants();
    }

    pub fn keys(&self) -> &[PinnedKey] {
        &self.keys
    }

    /// Index (into the insertion order) of the key currently stored at
    /// `slot`.
    pub fn key_at_slot(&self, slot: usize) -> usize {
        for (i, key) in self.keys.iter().enumerate() {
            if self.live[i] && self.map.slot_of(key) == Some(slot) {
                return i;
            }
        }
        panic!("no live key occupies slot {}", slot);
    }

    /// Erase the `index`-th inserted key and re-verify every survivor.
    pub fn erase_and_check(&mut self, index: usize) {
        assert!(self.live[index], "key {} already erased", index);
        self.live[index] = false;

        let key = self.keys[index];
        assert!(
            self.map.remove(&key).is_some(),
            "failed to erase key {:?}",
            key
        );
        assert!(!self.map.contains(&key), "erased key {:?} still found", key);

        for i in 0..self.keys.len() {
            if self.live[i] {
                assert!(
                    self.map.contains(&self.keys[i]),
                    "key {:?} lost while erasing {:?}",
                    self.keys[i],
                    key
                );
            }
        }
        self.assert_invariants();
    }

    /// Occupied slot indices, in slot order.
    pub fn occupied(&self) -> Vec<usize> {
        (0..self.map.bucket_count())
            .filter(|i| self.map.bucket_size(*i) == 1)
            .collect()
    }

    /// Size accounting and the ordered-probe invariant, reconstructed from
    /// the pinned hashes.
    pub fn assert_invariants(&self) {
        let buckets = self.map.bucket_count();
        let mut table: Vec<Option<u64>> = vec![None; buckets];
        let mut live_count = 0;

        for i in 0..self.keys.len() {
            if !self.live[i] {
                continue;
            }
            live_count += 1;
            let slot = self
                .map
                .slot_of(&self.keys[i])
                .unwrap_or_else(|| panic!("key {:?} unreachable", self.keys[i]));
            assert!(
                table[slot].replace(self.keys[i].hash % buckets as u64).is_none(),
                "two keys resolved to slot {}",
                slot
            );
        }

        assert_eq!(self.map.len(), live_count, "size does not match live keys");
        let occupied = (0..buckets).filter(|i| self.map.bucket_size(*i) == 1).count();
        assert_eq!(self.map.len(), occupied, "size does not match occupancy");

        // Within any run of occupied slots the modded hashes are
        // non-decreasing, with at most one wrap.
        if table.iter().all(|slot| slot.is_some()) {
            let descents = (0..buckets)
                .filter(|&i| table[i] > table[(i + 1) % buckets])
                .count();
            assert!(descents <= 1, "probe order broken in full table: {:?}", table);
        } else {
            let mut start = 0;
            while table[start].is_some() {
                start += 1;
            }
            let mut run: Vec<u64> = Vec::new();
            for step in 1..=buckets {
                match table[(start + step) % buckets] {
                    Some(modded) => run.push(modded),
                    None => {
                        let descents =
                            run.windows(2).filter(|w| w[0] > w[1]).count();
                        assert!(descents <= 1, "probe order broken in run {:?}", run);
                        run.clear();
                    }
                }
            }
        }
    }
}
