use std::fmt;
use std::io;

/// Failure while manipulating a region or its backing file.
#[derive(Debug)]
pub enum RegionError {
    /// The backing file could not be created, opened, resized or removed.
    File(io::Error),
    /// The mapping itself could not be established or resized.
    Map(io::Error),
    /// The requested element count cannot be represented as a byte length.
    Layout,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::File(err) => write!(f, "backing file operation failed: {}", err),
            RegionError::Map(err) => write!(f, "mapping operation failed: {}", err),
            RegionError::Layout => write!(f, "element count overflows the address space"),
        }
    }
}

impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegionError::File(err) | RegionError::Map(err) => Some(err),
            RegionError::Layout => None,
        }
    }
}

impl RegionError {
    /// Consume the error, yielding the underlying I/O error if any.
    pub fn into_io(self) -> io::Error {
        match self {
            RegionError::File(err) | RegionError::Map(err) => err,
            RegionError::Layout => io::Error::new(
                io::ErrorKind::InvalidInput,
                "element count overflows the address space",
            ),
        }
    }
}
