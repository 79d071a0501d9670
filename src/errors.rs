use std::io;
use thiserror::Error;

/// Store-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store file: {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to store at position {position}")]
    WriteFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to read store at position {position}")]
    ReadFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush buffered store writes")]
    FlushFailed {
        #[source]
        source: io::Error,
    },

    #[error("failed to truncate store to {size} bytes")]
    TruncateFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("read position {position} is beyond store size {size}")]
    ReadBeyondEnd { position: u64, size: u64 },

    #[error("corrupted frame at position {position}: {reason}")]
    Corrupted { position: u64, reason: String },
}

/// Index-related errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index file: {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("memory mapping failed for size {size}")]
    MmapFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush index file")]
    FlushFailed {
        #[source]
        source: io::Error,
    },

    #[error("failed to truncate index to {size} bytes")]
    TruncateFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("index is full, cannot add more entries")]
    Full,

    #[error("index has no entries")]
    Empty,

    #[error("index entry {entry} is out of range ({entries} entries)")]
    EntryOutOfRange { entry: u64, entries: u64 },

    #[error("index has been closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("offset {offset} out of range for segment {base_offset}..{next_offset}")]
    OffsetOutOfRange {
        offset: u64,
        base_offset: u64,
        next_offset: u64,
    },

    #[error("failed to remove segment file: {path}")]
    RemoveFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("directory error for path {path}")]
    DirectoryFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("offset out of range: {offset}")]
    OffsetOutOfRange { offset: u64 },

    #[error("log has been closed or removed")]
    Closed,

    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}

impl LogError {
    /// The offset a failed read asked for, when that is what went wrong.
    pub fn offset_out_of_range(&self) -> Option<u64> {
        match self {
            LogError::OffsetOutOfRange { offset } => Some(*offset),
            LogError::Segment(SegmentError::OffsetOutOfRange { offset, .. }) => Some(*offset),
            _ => None,
        }
    }
}
