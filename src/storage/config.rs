use serde::{Deserialize, Serialize};

const DEFAULT_MAX_STORE_BYTES: u64 = 1024;
const DEFAULT_MAX_INDEX_BYTES: u64 = 1024;

/// Configuration for the log.
///
/// The crate performs no configuration I/O itself; the types derive serde so
/// an embedding service can load them from whatever source it uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
}

/// Size bounds and placement for the log's segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Rollover threshold for a segment's store file, in bytes.
    /// Zero selects the default of 1024.
    pub max_store_bytes: u64,
    /// Rollover threshold for a segment's index file, in bytes.
    /// Zero selects the default of 1024.
    pub max_index_bytes: u64,
    /// Base offset assigned to the first segment of an empty directory.
    pub initial_offset: u64,
}

impl SegmentConfig {
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }
}
