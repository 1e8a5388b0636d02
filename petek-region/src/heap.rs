use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::{page_aligned, Region, RegionError};

/// A [`Region`] backed by ordinary heap memory.
///
/// Honours the same surface as [`FileRegion`](crate::FileRegion) so
/// containers parameterised over a region can run without touching the
/// filesystem: the name is ignored, [`wipe`](Region::wipe) is a no-op, and
/// fresh memory is zeroed the way a newly grown file would be.
pub struct HeapRegion<T> {
    /// Byte length of the live allocation; the layout handed back to the
    /// global allocator must match the one it handed out.
    allocated: usize,
    _elem: PhantomData<T>,
}

impl<T> HeapRegion<T> {
    fn layout(bytes: usize) -> Result<Layout, RegionError> {
        Layout::from_size_align(bytes, mem::align_of::<T>()).map_err(|_| RegionError::Layout)
    }

    fn byte_len(n: usize) -> Result<usize, RegionError> {
        n.checked_mul(mem::size_of::<T>())
            .filter(|len| *len > 0)
            .ok_or(RegionError::Layout)
    }

    fn grab(&mut self, bytes: usize) -> Result<NonNull<T>, RegionError> {
        let layout = Self::layout(bytes)?;
        let base = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(base.cast::<T>()) {
            Some(ptr) => {
                self.allocated = bytes;
                Ok(ptr)
            }
            None => Err(RegionError::Map(std::io::Error::other(
                "heap allocation failed",
            ))),
        }
    }
}

impl<T> Region<T> for HeapRegion<T> {
    fn open(_name: Option<PathBuf>) -> Self {
        HeapRegion {
            allocated: 0,
            _elem: PhantomData,
        }
    }

    fn name(&self) -> Option<&Path> {
        None
    }

    fn allocate(&mut self, n: usize) -> Result<NonNull<T>, RegionError> {
        let bytes = Self::byte_len(n)?;
        self.grab(bytes)
    }

    fn allocate_at_least(&mut self, n: usize) -> Result<(NonNull<T>, usize), RegionError> {
        let bytes = page_aligned(Self::byte_len(n)?);
        let base = self.grab(bytes)?;
        Ok((base, bytes / mem::size_of::<T>()))
    }

    fn reallocate(
        &mut self,
        old: NonNull<T>,
        _n_old: usize,
        n_new: usize,
    ) -> Result<NonNull<T>, RegionError> {
        let new_bytes = Self::byte_len(n_new)?;
        let old_layout = Self::layout(self.allocated)?;

        let base = unsafe { alloc::realloc(old.as_ptr().cast::<u8>(), old_layout, new_bytes) };
        match NonNull::new(base.cast::<T>()) {
            Some(ptr) => {
                self.allocated = new_bytes;
                Ok(ptr)
            }
            None => Err(RegionError::Map(std::io::Error::other(
                "heap reallocation failed",
            ))),
        }
    }

    fn deallocate(&mut self, ptr: NonNull<T>, _n: usize) {
        if self.allocated != 0 {
            // The layout was valid when the allocation was made.
            if let Ok(layout) = Layout::from_size_align(self.allocated, mem::align_of::<T>()) {
                unsafe { alloc::dealloc(ptr.as_ptr().cast::<u8>(), layout) };
            }
            self.allocated = 0;
        }
    }

    fn wipe(&mut self) -> Result<(), RegionError> {
        Ok(())
    }
}
