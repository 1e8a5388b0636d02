//! Fixed-layout slot records.
//!
//! A [`Slot`] is the unit the map's backing region is an array of: a free
//! marker, the full hash recorded at insertion time, and the key/value entry,
//! laid out back-to-back so the backing file is directly inspectable and the
//! region can grow with a linear copy. The entry is undefined while the slot
//! is free.

use std::cmp::Ordering;
use std::mem::MaybeUninit;

/// One element of the hash table's backing array, either free or occupied.
///
/// The layout is part of the on-disk format: field order is fixed, numeric
/// fields are host-endian and host-aligned, and there is no header or
/// padding beyond what the entry type itself imposes. `K` and `V` must be
/// [`Copy`]: slots move with bitwise copies and erasure runs no destructor.
#[repr(C)]
pub struct Slot<K, V> {
    /// Non-zero when the slot carries no live entry.
    free: usize,
    /// Full hash of the stored key, exactly as computed at insertion time.
    /// Undefined while the slot is free.
    hash: usize,
    /// Key/value pair. Undefined while the slot is free.
    entry: MaybeUninit<(K, V)>,
}

impl<K, V> Slot<K, V> {
    pub fn is_free(&self) -> bool {
        self.free != 0
    }

    pub fn set_free(&mut self, free: bool) {
        self.free = free as usize;
    }

    pub fn hash(&self) -> usize {
        self.hash
    }

    /// Construct the slot in place, marking it occupied.
    pub fn write(&mut self, hash: usize, key: K, value: V) {
        self.free = 0;
        self.hash = hash;
        self.entry.write((key, value));
    }

    /// Reference to the stored entry.
    ///
    /// # Safety
    ///
    /// The slot must be occupied.
    pub unsafe fn pair(&self) -> &(K, V) {
        debug_assert!(!self.is_free());
        unsafe { self.entry.assume_init_ref() }
    }

    /// Mutable reference to the stored entry.
    ///
    /// # Safety
    ///
    /// The slot must be occupied.
    pub unsafe fn pair_mut(&mut self) -> &mut (K, V) {
        debug_assert!(!self.is_free());
        unsafe { self.entry.assume_init_mut() }
    }
}

/// Field-order lexicographic equality: free marker, then hash, then entry.
/// The entry of a free slot is undefined, so two free slots compare equal on
/// the marker alone.
impl<K: PartialEq, V: PartialEq> PartialEq for Slot<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if (self.free != 0) != (other.free != 0) {
            return false;
        }
        if self.is_free() {
            return true;
        }
        self.hash == other.hash && unsafe { self.pair() == other.pair() }
    }
}

impl<K: Eq, V: Eq> Eq for Slot<K, V> {}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for Slot<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Slot");
        s.field("free", &self.free);
        if self.is_free() {
            s.finish()
        } else {
            s.field("hash", &self.hash)
                .field("entry", unsafe { self.pair() })
                .finish()
        }
    }
}

/// Field-order lexicographic ordering, comparing entries only when both
/// slots are occupied.
impl<K: PartialOrd, V: PartialOrd> PartialOrd for Slot<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let free = (self.free != 0) as usize;
        let other_free = (other.free != 0) as usize;
        match free.cmp(&other_free) {
            Ordering::Equal if self.is_free() => Some(Ordering::Equal),
            Ordering::Equal => match self.hash.cmp(&other.hash) {
                Ordering::Equal => unsafe { self.pair().partial_cmp(other.pair()) },
                ord => Some(ord),
            },
            ord => Some(ord),
        }
    }
}
