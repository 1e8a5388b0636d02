use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::{MmapMut, MmapOptions, RemapOptions};
use rand::Rng;

use crate::{page_aligned, Region, RegionError};

/// A contiguous region of `T` elements mapped over a named file.
///
/// The mapping is read-write and shared: stores through the region are the
/// stores that reach the file. The file is sized to exactly the byte length
/// of the region (page-rounded when allocated with
/// [`allocate_at_least`](Region::allocate_at_least)), and its contents are
/// authoritative: mapping an existing file exposes whatever was persisted.
///
/// Resizing uses `mremap` with `MREMAP_MAYMOVE`, so the base address is only
/// stable between resizes.
pub struct FileRegion<T> {
    path: PathBuf,
    map: Option<MmapMut>,
    _elem: PhantomData<T>,
}

impl<T> FileRegion<T> {
    fn byte_len(n: usize) -> Result<usize, RegionError> {
        n.checked_mul(mem::size_of::<T>())
            .filter(|len| *len > 0)
            .ok_or(RegionError::Layout)
    }

    fn map_file(&mut self, len: usize) -> Result<NonNull<T>, RegionError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(RegionError::File)?;
        file.set_len(len as u64).map_err(RegionError::File)?;

        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(RegionError::Map)?;
        let base = map.as_mut_ptr().cast::<T>();

        self.map = Some(map);

        // A fresh mapping over a non-empty file cannot yield null.
        Ok(NonNull::new(base).ok_or_else(|| {
            RegionError::Map(std::io::Error::other("mapping returned a null base"))
        })?)
    }
}

impl<T> Region<T> for FileRegion<T> {
    fn open(name: Option<PathBuf>) -> Self {
        FileRegion {
            path: name.unwrap_or_else(|| fresh_name(16)),
            map: None,
            _elem: PhantomData,
        }
    }

    fn name(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn allocate(&mut self, n: usize) -> Result<NonNull<T>, RegionError> {
        let len = Self::byte_len(n)?;
        self.map_file(len)
    }

    fn allocate_at_least(&mut self, n: usize) -> Result<(NonNull<T>, usize), RegionError> {
        let len = page_aligned(Self::byte_len(n)?);
        let base = self.map_file(len)?;
        Ok((base, len / mem::size_of::<T>()))
    }

    fn reallocate(
        &mut self,
        old: NonNull<T>,
        _n_old: usize,
        n_new: usize,
    ) -> Result<NonNull<T>, RegionError> {
        let new_len = Self::byte_len(n_new)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(RegionError::File)?;
        file.set_len(new_len as u64).map_err(RegionError::File)?;

        let map = self.map.as_mut().ok_or_else(|| {
            RegionError::Map(std::io::Error::other("reallocate on an unmapped region"))
        })?;
        debug_assert_eq!(map.as_ptr().cast::<T>(), old.as_ptr().cast_const());

        unsafe { map.remap(new_len, RemapOptions::new().may_move(true)) }
            .map_err(RegionError::Map)?;

        let base = map.as_mut_ptr().cast::<T>();
        Ok(NonNull::new(base).ok_or_else(|| {
            RegionError::Map(std::io::Error::other("remap returned a null base"))
        })?)
    }

    fn deallocate(&mut self, _ptr: NonNull<T>, _n: usize) {
        if let Some(map) = self.map.take() {
            // Flush failure is fatal: the region cannot be reported as
            // released while dirty pages may not have reached the file.
            if let Err(err) = map.flush() {
                panic!("flush of {} failed: {}", self.path.display(), err);
            }
        }
    }

    fn wipe(&mut self) -> Result<(), RegionError> {
        fs::remove_file(&self.path).map_err(RegionError::File)
    }
}

/// Pick an alphabetic file name that does not collide with an existing
/// entry in the working directory.
fn fresh_name(len: usize) -> PathBuf {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    let mut rng = rand::thread_rng();
    loop {
        let name: String = (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let path = PathBuf::from(name);
        if !path.exists() {
            return path;
        }
    }
}
