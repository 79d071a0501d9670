pub mod api;
pub mod errors;
pub mod storage;

use crate::errors::*;

/// Type aliases for Results in this crate
pub type StoreResult<T> = Result<T, StoreError>;
pub type IndexResult<T> = Result<T, IndexError>;
pub type SegmentResult<T> = Result<T, SegmentError>;
pub type LogResult<T> = Result<T, LogError>;
