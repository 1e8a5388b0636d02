use std::fmt;
use std::io;

use petek_region::RegionError;

/// Failures surfaced by the map's fallible operations.
///
/// Read-only operations cannot fail. Mutations that require growing the
/// backing region report [`System`](Error::System) or [`Full`](Error::Full);
/// in the `Full` case the map is logically unchanged, in the `System` case
/// the backing region could not be resized and the map is poisoned: it
/// reports [`is_poisoned`](crate::PersistentMap::is_poisoned) and must be
/// discarded.
#[derive(Debug)]
pub enum Error {
    /// Arguments were out of range: a malformed choice sequence, a resize
    /// below the current element count, a bucket count that does not match
    /// the backing file, or a use of a poisoned map.
    InvalidArgs(&'static str),
    /// An underlying file or mapping operation failed.
    System(io::Error),
    /// The requested key or backing file is absent.
    NotFound,
    /// The requested capacity exceeds what the element size permits.
    Full,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgs(what) => write!(f, "invalid arguments: {}", what),
            Error::System(err) => write!(f, "system operation failed: {}", err),
            Error::NotFound => write!(f, "not found"),
            Error::Full => write!(f, "requested capacity exceeds the maximum size"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::System(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegionError> for Error {
    fn from(err: RegionError) -> Self {
        Error::System(err.into_io())
    }
}
