use crate::errors::{IndexError, StoreError};
use crate::{IndexResult, StoreResult};
use std::io;
use std::path::Path;

pub mod config;
pub mod index;
pub mod log;
pub mod segment;
pub mod store;

pub trait StoreContext<T> {
    fn with_open_context(self, path: &Path) -> StoreResult<T>;
    fn with_write_context(self, position: u64) -> StoreResult<T>;
    fn with_read_context(self, position: u64) -> StoreResult<T>;
    fn with_flush_context(self) -> StoreResult<T>;
    fn with_truncate_context(self, size: u64) -> StoreResult<T>;
}

impl<T> StoreContext<T> for Result<T, io::Error> {
    fn with_open_context(self, path: &Path) -> StoreResult<T> {
        self.map_err(|source| StoreError::OpenFailed {
            path: path.to_string_lossy().into_owned(),
            source,
        })
    }

    fn with_write_context(self, position: u64) -> StoreResult<T> {
        self.map_err(|source| StoreError::WriteFailed { position, source })
    }

    fn with_read_context(self, position: u64) -> StoreResult<T> {
        self.map_err(|source| StoreError::ReadFailed { position, source })
    }

    fn with_flush_context(self) -> StoreResult<T> {
        self.map_err(|source| StoreError::FlushFailed { source })
    }

    fn with_truncate_context(self, size: u64) -> StoreResult<T> {
        self.map_err(|source| StoreError::TruncateFailed { size, source })
    }
}

pub trait IndexContext<T> {
    fn with_open_context(self, path: &Path) -> IndexResult<T>;
    fn with_mmap_context(self, size: u64) -> IndexResult<T>;
    fn with_flush_context(self) -> IndexResult<T>;
    fn with_truncate_context(self, size: u64) -> IndexResult<T>;
}

impl<T> IndexContext<T> for Result<T, io::Error> {
    fn with_open_context(self, path: &Path) -> IndexResult<T> {
        self.map_err(|source| IndexError::OpenFailed {
            path: path.to_string_lossy().into_owned(),
            source,
        })
    }

    fn with_mmap_context(self, size: u64) -> IndexResult<T> {
        self.map_err(|source| IndexError::MmapFailed { size, source })
    }

    fn with_flush_context(self) -> IndexResult<T> {
        self.map_err(|source| IndexError::FlushFailed { source })
    }

    fn with_truncate_context(self, size: u64) -> IndexResult<T> {
        self.map_err(|source| IndexError::TruncateFailed { size, source })
    }
}
