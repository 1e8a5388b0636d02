//! Contiguous memory regions backed by a named file or by the heap.
//!
//! A [`Region`] hands out one contiguous run of `N` elements and can grow or
//! shrink it in place (the address may change). The file-backed flavour maps
//! the region over a file with shared semantics, so bytes written through the
//! region are the bytes persisted on disk; the heap flavour honours the same
//! surface so containers can be tested without touching the filesystem.
//!
//! The region owns file lifetime and page alignment. It never interprets the
//! element contents; that is the container's job.

mod error;
mod file;
mod heap;

pub use error::RegionError;
pub use file::FileRegion;
pub use heap::HeapRegion;

use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// A resizable contiguous region of `T` elements.
///
/// Implementations report allocation failure through [`RegionError`];
/// deallocation failure is not recoverable and aborts the process.
pub trait Region<T> {
    /// Create a region handle. `name` is the backing file path, used
    /// verbatim relative to the working directory; `None` picks a fresh
    /// non-colliding name. Heap-backed implementations ignore it.
    fn open(name: Option<PathBuf>) -> Self;

    /// Backing file path, if the region is file-backed.
    fn name(&self) -> Option<&Path>;

    /// Obtain a region of exactly `n` elements.
    ///
    /// For a file-backed region the file is created if missing and sized to
    /// `n * size_of::<T>()`; previously persisted bytes become visible at
    /// the returned address.
    fn allocate(&mut self, n: usize) -> Result<NonNull<T>, RegionError>;

    /// Like [`allocate`](Region::allocate), but round the byte size up to a
    /// whole page. Returns the base address and the number of elements that
    /// fit in the rounded region.
    fn allocate_at_least(&mut self, n: usize) -> Result<(NonNull<T>, usize), RegionError>;

    /// Resize the region from `n_old` to `n_new` elements, preserving the
    /// overlapping prefix. The returned address may differ from `old`.
    fn reallocate(
        &mut self,
        old: NonNull<T>,
        n_old: usize,
        n_new: usize,
    ) -> Result<NonNull<T>, RegionError>;

    /// Release the region. File-backed regions flush dirty pages
    /// synchronously before unmapping; the file itself is kept.
    fn deallocate(&mut self, ptr: NonNull<T>, n: usize);

    /// Remove the backing file. A no-op for heap-backed regions.
    fn wipe(&mut self) -> Result<(), RegionError>;
}

/// Round `bytes` up to a whole number of pages.
pub(crate) fn page_aligned(bytes: usize) -> usize {
    let page = page_size();
    bytes.div_ceil(page) * page
}

pub(crate) fn page_size() -> usize {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 { 4096 } else { sz as usize }
}
