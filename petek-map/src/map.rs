//! The persistent open-addressing map.

use std::fs;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use foldhash::fast::FixedState;
use petek_region::{FileRegion, HeapRegion, Region};

use crate::block::Slot;
use crate::error::Error;
use crate::iter::{Iter, IterMut};
use crate::probe::{probe_emplace, probe_erase, probe_find, ProbeSlots};

/// Preferred bucket counts consulted by growth and rehash.
pub const DEFAULT_BUCKET_CHOICES: &[usize] = &[
    1, 7, 17, 73, 181, 431, 1777, 4721, 10253, 41017, 140989, 487757, 1028957,
];

/// An unordered key/value map whose slot array lives in a [`Region`],
/// by default a shared file mapping, so the map's contents are the bytes
/// persisted on disk.
///
/// Open addressing with linear probing under an ordered-probe invariant:
/// within any run of occupied slots the stored hashes modded by the bucket
/// count are non-decreasing (with at most one isolated wrap), which bounds
/// every lookup by the length of one run.
///
/// The map is not internally synchronised; every mutating operation takes
/// `&mut self` and cross-thread use requires external exclusion. The hasher
/// must be deterministic across processes when the map is file-backed;
/// hashes are persisted and never recomputed. The default
/// [`FixedState`](foldhash::fast::FixedState) satisfies this.
pub struct PersistentMap<K, V, S = FixedState, R = FileRegion<Slot<K, V>>>
where
    R: Region<Slot<K, V>>,
{
    buckets: usize,
    elems: usize,
    region: R,
    base: NonNull<Slot<K, V>>,
    wipe_on_drop: bool,
    load_max: f64,
    choices: Vec<usize>,
    hasher: S,
    poisoned: bool,
    _marker: PhantomData<Slot<K, V>>,
}

/// The heap-backed instantiation: same behaviour, no file.
pub type HeapMap<K, V, S = FixedState> = PersistentMap<K, V, S, HeapRegion<Slot<K, V>>>;

unsafe impl<K: Send, V: Send, S: Send, R> Send for PersistentMap<K, V, S, R> where
    R: Region<Slot<K, V>> + Send
{
}

/// Accessor view over the live slot array, the coupling point between the
/// map and the probe primitives.
struct TableSlots<K, V> {
    base: *mut Slot<K, V>,
    buckets: usize,
}

impl<K, V> TableSlots<K, V> {
    /// SAFETY: all indices handed to the probe primitives stay below
    /// `buckets`, which is the length of the live array.
    unsafe fn slot(&self, index: usize) -> &Slot<K, V> {
        debug_assert!(index < self.buckets);
        unsafe { &*self.base.add(index) }
    }
}

impl<K: Eq, V> ProbeSlots for TableSlots<K, V> {
    type Key = K;

    fn is_free(&self, index: usize) -> bool {
        unsafe { self.slot(index).is_free() }
    }

    fn modded_hash(&self, index: usize) -> usize {
        unsafe { self.slot(index).hash() % self.buckets }
    }

    fn key_eq(&self, index: usize, key: &K) -> bool {
        unsafe { self.slot(index).pair().0 == *key }
    }

    fn transfer(&mut self, to: usize, from: usize) {
        debug_assert!(to < self.buckets && from < self.buckets && to != from);
        unsafe { ptr::copy_nonoverlapping(self.base.add(from), self.base.add(to), 1) };
    }

    fn destroy(&mut self, _index: usize) {
        // Entries are Copy; erasure runs no destructor.
    }
}

/// Scratch container a rehash plans its permutation in. `to[o]` is the new
/// index old slot `o` will move to; `from[n]` is the old slot occupying new
/// index `n`. Hashes and keys are read through `base` from the still-live
/// old region; nothing is recomputed.
struct Scratch<K, V> {
    to: Vec<Option<usize>>,
    from: Vec<Option<usize>>,
    base: *const Slot<K, V>,
    new_buckets: usize,
}

impl<K, V> Scratch<K, V> {
    fn old_index(&self, index: usize) -> usize {
        match self.from[index] {
            Some(old) => old,
            None => unreachable!("accessor touched a free scratch slot"),
        }
    }
}

impl<K: Eq, V> ProbeSlots for Scratch<K, V> {
    type Key = K;

    fn is_free(&self, index: usize) -> bool {
        self.from[index].is_none()
    }

    fn modded_hash(&self, index: usize) -> usize {
        unsafe { (*self.base.add(self.old_index(index))).hash() % self.new_buckets }
    }

    fn key_eq(&self, index: usize, key: &K) -> bool {
        unsafe { (*self.base.add(self.old_index(index))).pair().0 == *key }
    }

    fn transfer(&mut self, to: usize, from: usize) {
        if let Some(old) = self.from[from] {
            self.to[old] = Some(to);
        }
        self.from.swap(to, from);
    }

    fn destroy(&mut self, _index: usize) {}
}

impl<K, V> PersistentMap<K, V, FixedState, FileRegion<Slot<K, V>>>
where
    K: Hash + Eq + Copy,
    V: Copy,
{
    /// Anonymous file-backed map: a fresh 16-character alphabetic file name
    /// in the working directory, the smallest preferred bucket count.
    pub fn new() -> Result<Self, Error> {
        Self::with_buckets(0)
    }

    /// Anonymous file-backed map sized for at least `buckets` buckets
    /// (snapped up through the choice sequence).
    pub fn with_buckets(buckets: usize) -> Result<Self, Error> {
        Self::build(
            FileRegion::open(None),
            buckets,
            false,
            FixedState::default(),
            None,
        )
    }

    /// Map backed by `name`, created fresh (any previous content of the
    /// file is not adopted; slots are re-initialised free).
    pub fn create(name: impl Into<PathBuf>, buckets: usize) -> Result<Self, Error> {
        Self::build(
            FileRegion::open(Some(name.into())),
            buckets,
            false,
            FixedState::default(),
            None,
        )
    }

    /// Adopt the existing backing file `name`.
    ///
    /// `buckets` must match the number of slots the file holds; the file
    /// size is always `buckets * size_of::<Slot<K, V>>()`. Live elements are
    /// recounted by walking the slots.
    pub fn open(name: impl Into<PathBuf>, buckets: usize) -> Result<Self, Error> {
        let name = name.into();
        let on_disk = fs::metadata(&name).map_err(|_| Error::NotFound)?.len();
        Self::build(
            FileRegion::open(Some(name)),
            buckets,
            true,
            FixedState::default(),
            Some(on_disk),
        )
    }
}

impl<K, V> HeapMap<K, V>
where
    K: Hash + Eq + Copy,
    V: Copy,
{
    /// Heap-backed map with the smallest preferred bucket count.
    pub fn new() -> Result<Self, Error> {
        Self::with_buckets(0)
    }

    /// Heap-backed map sized for at least `buckets` buckets.
    pub fn with_buckets(buckets: usize) -> Result<Self, Error> {
        Self::build(HeapRegion::open(None), buckets, false, FixedState::default(), None)
    }
}

impl<K, V, S, R> PersistentMap<K, V, S, R>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    R: Region<Slot<K, V>>,
{
    /// Build a map over an explicit region and hasher. `adopt` preserves
    /// whatever the region already holds and recounts live elements;
    /// `on_disk` is the backing file length to validate against when
    /// adopting.
    pub fn build(
        region: R,
        buckets: usize,
        adopt: bool,
        hasher: S,
        on_disk: Option<u64>,
    ) -> Result<Self, Error> {
        let mut map = PersistentMap {
            buckets: 0,
            elems: 0,
            region,
            base: NonNull::dangling(),
            wipe_on_drop: false,
            load_max: 1.0,
            choices: DEFAULT_BUCKET_CHOICES.to_vec(),
            hasher,
            poisoned: false,
            _marker: PhantomData,
        };

        let target = map.next_size(buckets, true)?;
        if let Some(len) = on_disk {
            if len != (target * mem::size_of::<Slot<K, V>>()) as u64 {
                return Err(Error::InvalidArgs(
                    "bucket count does not match the backing file",
                ));
            }
        }

        map.base = map.region.allocate(target)?;
        map.buckets = target;
        if adopt {
            for index in 0..target {
                if !unsafe { map.slot(index) }.is_free() {
                    map.elems += 1;
                }
            }
        } else {
            for index in 0..target {
                unsafe { map.slot_mut(index) }.set_free(true);
            }
        }

        Ok(map)
    }

    /// Number of live key/value pairs.
    pub fn len(&self) -> usize {
        self.elems
    }

    pub fn is_empty(&self) -> bool {
        self.elems == 0
    }

    /// Number of slots in the backing array (and, for a file-backed map,
    /// the file length divided by the slot size).
    pub fn bucket_count(&self) -> usize {
        self.buckets
    }

    /// Largest representable bucket count for this slot size.
    pub fn max_bucket_count(&self) -> usize {
        self.max_size()
    }

    /// Natural bucket of `key`.
    pub fn bucket(&self, key: &K) -> usize {
        self.hash_of(key) % self.buckets
    }

    /// 1 if the slot at `index` is occupied, 0 otherwise.
    pub fn bucket_size(&self, index: usize) -> usize {
        if index < self.buckets && !unsafe { self.slot(index) }.is_free() {
            1
        } else {
            0
        }
    }

    /// Index of the slot currently holding `key`, if present.
    pub fn slot_of(&self, key: &K) -> Option<usize> {
        if self.poisoned {
            return None;
        }
        let (index, found) = probe_find(&self.view(), key, self.hash_of(key), self.buckets);
        found.then_some(index)
    }

    pub fn load_factor(&self) -> f64 {
        self.elems as f64 / self.buckets as f64
    }

    pub fn max_load_factor(&self) -> f64 {
        self.load_max
    }

    /// Set the growth threshold. Must lie in `(0, 1]`: open addressing
    /// cannot hold more elements than buckets.
    pub fn set_max_load_factor(&mut self, mlf: f64) -> Result<(), Error> {
        if !(mlf > 0.0 && mlf <= 1.0) {
            return Err(Error::InvalidArgs("max load factor outside (0, 1]"));
        }
        self.load_max = mlf;
        Ok(())
    }

    /// The choice sequence consulted by growth and rehash.
    pub fn bucket_choices(&self) -> &[usize] {
        &self.choices
    }

    /// Replace the choice sequence. Values must be strictly increasing with
    /// a minimum of 1.
    pub fn set_bucket_choices(&mut self, choices: Vec<usize>) -> Result<(), Error> {
        if choices.is_empty() || choices[0] < 1 {
            return Err(Error::InvalidArgs("bucket choices must start at 1 or more"));
        }
        if choices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidArgs("bucket choices must be strictly increasing"));
        }
        self.choices = choices;
        Ok(())
    }

    /// Whether dropping the map also unlinks the backing file.
    pub fn set_wipe_on_drop(&mut self, wipe: bool) {
        self.wipe_on_drop = wipe;
    }

    /// Backing file path, if file-backed.
    pub fn name(&self) -> Option<&Path> {
        self.region.name()
    }

    /// True once a failed region resize has left the slot array in an
    /// unusable state; the map must be discarded.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Look up `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let index = self.slot_of(key)?;
        Some(unsafe { &self.slot(index).pair().1 })
    }

    /// Look up `key`, allowing the value to be rewritten in place.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.slot_of(key)?;
        Some(unsafe { &mut self.slot_mut(index).pair_mut().1 })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slot_of(key).is_some()
    }

    /// Insert `key` if absent. Returns `true` when inserted, `false` when
    /// the key was already present (the stored pair is untouched).
    ///
    /// Growth runs before placement: when the insertion would push the load
    /// factor past the maximum, the table rehashes to the next choice first,
    /// invalidating outstanding iterators.
    pub fn insert(&mut self, key: K, value: V) -> Result<bool, Error> {
        self.ensure_live()?;

        let hash = self.hash_of(&key);
        if (self.elems + 1) as f64 > (self.load_max * self.buckets as f64).floor() {
            self.rehash(self.buckets + 1)?;
        }

        let mut view = self.view();
        let (index, inserted) = probe_emplace(&mut view, &key, hash, self.buckets);
        if !inserted {
            return Ok(false);
        }

        unsafe { self.slot_mut(index) }.write(hash, key, value);
        self.elems += 1;

        Ok(true)
    }

    /// Insert `key` if absent, overwrite its value otherwise. The stored key
    /// is never overwritten. Returns `true` when a fresh insertion happened.
    pub fn insert_or_assign(&mut self, key: K, value: V) -> Result<bool, Error> {
        if let Some(stored) = self.get_mut(&key) {
            *stored = value;
            return Ok(false);
        }
        self.insert(key, value)
    }

    /// Value for `key`, inserting `default()` first when absent.
    pub fn get_or_insert_with(
        &mut self,
        key: K,
        default: impl FnOnce() -> V,
    ) -> Result<&mut V, Error> {
        if !self.contains(&key) {
            self.insert(key, default())?;
        }
        let index = self.slot_of(&key).ok_or(Error::NotFound)?;
        Ok(unsafe { &mut self.slot_mut(index).pair_mut().1 })
    }

    /// Remove `key`, returning its value. Successors of the vacated slot are
    /// compacted backward to keep the probe order intact.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        if self.poisoned {
            return None;
        }

        let hash = self.hash_of(key);
        let index = self.slot_of(key)?;
        let value = unsafe { self.slot(index).pair().1 };

        let mut view = self.view();
        let vacated = probe_erase(&mut view, key, hash, self.buckets)?;
        unsafe { self.slot_mut(vacated) }.set_free(true);
        self.elems -= 1;

        Some(value)
    }

    /// Keep only the pairs the predicate approves of.
    pub fn retain(&mut self, mut pred: impl FnMut(&K, &V) -> bool) {
        let doomed: Vec<K> = self
            .iter()
            .filter(|(key, value)| !pred(key, value))
            .map(|(key, _)| *key)
            .collect();
        for key in doomed {
            self.remove(&key);
        }
    }

    /// Mark every slot free in one linear pass. The bucket count (and the
    /// backing file length) stay as they were.
    pub fn clear(&mut self) {
        if self.poisoned {
            return;
        }
        for index in 0..self.buckets {
            unsafe { self.slot_mut(index) }.set_free(true);
        }
        self.elems = 0;
    }

    /// Ensure capacity for at least `keys` elements. Equivalent to
    /// [`rehash`](PersistentMap::rehash).
    pub fn reserve(&mut self, keys: usize) -> Result<(), Error> {
        self.rehash(keys)
    }

    /// Resize the table to the choice-sequence value fitting `buckets`
    /// (up or down), rebuilding the probe layout at the new size.
    ///
    /// The permutation is planned first in a scratch array against the new
    /// bucket count, then realised on the real slots as chained moves; each
    /// slot moves at most once and keys are preserved bit-for-bit, with
    /// their recorded hashes. All iterators are invalidated.
    pub fn rehash(&mut self, buckets: usize) -> Result<(), Error> {
        self.ensure_live()?;

        let new_buckets = self.next_size(buckets, buckets > self.buckets)?;
        if new_buckets == self.buckets {
            return Ok(());
        }
        if new_buckets < self.elems {
            return Err(Error::InvalidArgs(
                "cannot rehash below the current element count",
            ));
        }

        let old_buckets = self.buckets;
        let mut to = self.plan_permutation(new_buckets);

        // Grow before the moves so every destination index is addressable;
        // the freshly appended range starts out free.
        if new_buckets > old_buckets {
            self.resize_region(new_buckets, false)?;
        }

        self.apply_permutation(&mut to, old_buckets);

        if new_buckets < old_buckets {
            self.resize_region(new_buckets, true)?;
        }

        Ok(())
    }

    /// Shared view of the occupied pairs in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        unsafe { Iter::new(self.base.as_ptr(), self.buckets) }
    }

    /// Mutable view of the occupied pairs in slot order; values only.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        unsafe { IterMut::new(self.base.as_ptr(), self.buckets) }
    }

    fn hash_of(&self, key: &K) -> usize {
        self.hasher.hash_one(key) as usize
    }

    fn max_size(&self) -> usize {
        usize::MAX / mem::size_of::<Slot<K, V>>()
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.poisoned {
            return Err(Error::InvalidArgs("map poisoned by a failed resize"));
        }
        Ok(())
    }

    /// The next preferred bucket count for `wanted` raw buckets: the
    /// smallest choice at or above `wanted / load_max` when growing, the
    /// largest at or below it when shrinking, the raw value when the
    /// sequence is exhausted.
    fn next_size(&self, wanted: usize, larger: bool) -> Result<usize, Error> {
        let max = self.max_size();
        if wanted > max
            || self.elems as f64 > max as f64 * self.load_max
            || wanted as f64 > max as f64 * self.load_max
        {
            return Err(Error::Full);
        }

        let min_buckets = (wanted as f64 / self.load_max).ceil() as usize;
        if larger {
            for &choice in &self.choices {
                if choice >= min_buckets {
                    return Ok(choice);
                }
            }
        } else {
            for &choice in self.choices.iter().rev() {
                if choice <= min_buckets {
                    return Ok(choice);
                }
            }
        }

        Ok(min_buckets)
    }

    /// Resize the region to `new_buckets`, poisoning the map if the region
    /// cannot deliver. Appended slots are initialised free when growing.
    fn resize_region(&mut self, new_buckets: usize, shrinking: bool) -> Result<(), Error> {
        match self.region.reallocate(self.base, self.buckets, new_buckets) {
            Ok(base) => self.base = base,
            Err(err) => {
                self.poisoned = true;
                return Err(err.into());
            }
        }

        let old_buckets = self.buckets;
        self.buckets = new_buckets;
        if !shrinking {
            for index in old_buckets..new_buckets {
                unsafe { self.slot_mut(index) }.set_free(true);
            }
        }
        Ok(())
    }

    /// Run the emplace index selection for every occupied slot against a
    /// scratch container of `new_buckets` buckets, recording where each old
    /// slot lands. Forward shifts during planning re-target previously
    /// placed slots; no real slot is touched.
    fn plan_permutation(&self, new_buckets: usize) -> Vec<Option<usize>> {
        let mut scratch = Scratch {
            to: vec![None; new_buckets.max(self.buckets)],
            from: vec![None; new_buckets],
            base: self.base.as_ptr().cast_const(),
            new_buckets,
        };

        for old in 0..self.buckets {
            let slot = unsafe { self.slot(old) };
            if slot.is_free() {
                continue;
            }
            let key = unsafe { slot.pair().0 };
            let (taken, _) = probe_emplace(&mut scratch, &key, slot.hash(), new_buckets);
            scratch.to[old] = Some(taken);
            scratch.from[taken] = Some(old);
        }

        scratch.to
    }

    /// Realise the planned permutation on the real slots: follow each chain
    /// of destinations onto a stack, then unwind it, moving every slot one
    /// step and freeing the vacated source. A chain that closes on itself is
    /// a rotation; its head is staged in a temporary so the final move reads
    /// the pre-rotation bytes.
    fn apply_permutation(&mut self, to: &mut [Option<usize>], old_buckets: usize) {
        let mut stack: Vec<usize> = Vec::with_capacity(4);

        for index in 0..old_buckets {
            let Some(first) = to[index] else { continue };
            if first == index {
                continue;
            }

            stack.clear();
            stack.push(index);
            let mut prev = index;
            let mut going = Some(first);
            while let Some(dest) = going {
                // Invalidate as we go so a closed chain terminates.
                to[prev] = None;
                stack.push(dest);
                prev = dest;
                going = to[dest];
            }

            let cyclic = stack[0] == stack[stack.len() - 1];
            let mut staged: Option<Slot<K, V>> = if cyclic {
                Some(unsafe { ptr::read(self.base.as_ptr().add(stack[0])) })
            } else {
                None
            };

            while stack.len() > 1 {
                let dest = stack[stack.len() - 1];
                let src = stack[stack.len() - 2];
                if stack.len() == 2 {
                    if let Some(head) = staged.take() {
                        unsafe { ptr::write(self.base.as_ptr().add(dest), head) };
                        stack.pop();
                        break;
                    }
                }
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.base.as_ptr().add(src),
                        self.base.as_ptr().add(dest),
                        1,
                    );
                    (*self.base.as_ptr().add(src)).set_free(true);
                }
                stack.pop();
            }
        }
    }

    fn view(&self) -> TableSlots<K, V> {
        TableSlots {
            base: self.base.as_ptr(),
            buckets: self.buckets,
        }
    }

    /// SAFETY: `index < self.buckets`.
    unsafe fn slot(&self, index: usize) -> &Slot<K, V> {
        debug_assert!(index < self.buckets);
        unsafe { &*self.base.as_ptr().add(index) }
    }

    /// SAFETY: `index < self.buckets`.
    unsafe fn slot_mut(&mut self, index: usize) -> &mut Slot<K, V> {
        debug_assert!(index < self.buckets);
        unsafe { &mut *self.base.as_ptr().add(index) }
    }
}

impl<'a, K, V, S, R> IntoIterator for &'a PersistentMap<K, V, S, R>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    R: Region<Slot<K, V>>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, R> IntoIterator for &'a mut PersistentMap<K, V, S, R>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
    R: Region<Slot<K, V>>,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, S, R> Drop for PersistentMap<K, V, S, R>
where
    R: Region<Slot<K, V>>,
{
    fn drop(&mut self) {
        if self.buckets != 0 {
            self.region.deallocate(self.base, self.buckets);
        }
        if self.wipe_on_drop {
            let _ = self.region.wipe();
        }
    }
}
