//! Persistent memory-mapped hash map with an ordered-probe invariant.
//!
//! [`PersistentMap`] is an unordered key→value map whose slot array is a
//! region obtained from `petek-region`, by default a shared file mapping,
//! making the map's contents the bytes on disk. Open addressing with linear
//! probing keeps collision runs ordered by modded hash, so lookups can stop
//! early and erasure can compact in place.
//!
//! # Example
//!
//! ```rust,no_run
//! use petek_map::PersistentMap;
//!
//! let mut map: PersistentMap<u64, u64> = PersistentMap::create("table", 16)?;
//! map.insert(7, 700)?;
//! assert_eq!(map.get(&7), Some(&700));
//! map.set_wipe_on_drop(true);
//! # Ok::<(), petek_map::Error>(())
//! ```
//!
//! The backing file is a raw slot array: no header, no version tag, no
//! checksum; numeric fields host-endian. Reopening with
//! [`PersistentMap::open`] adopts whatever the file holds, which is why the
//! default hasher is a fixed-seed one; persisted hashes must reproduce.
//!
//! The map is single-owner: it is `Send` but mutating it concurrently
//! requires external exclusion (see the `petek-lock` crate).

mod block;
mod error;
mod iter;
mod map;
pub mod probe;

pub use block::Slot;
pub use error::Error;
pub use iter::{Iter, IterMut};
pub use map::{HeapMap, PersistentMap, DEFAULT_BUCKET_CHOICES};
