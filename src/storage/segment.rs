//! Segment pairs one store with one index and owns a contiguous range of
//! absolute offsets starting at its base offset. It coordinates assigning
//! offsets on append and routing reads through the index to the store.

use crate::SegmentResult;
use crate::api::v1::Record;
use crate::errors::SegmentError;
use crate::storage::config::SegmentConfig;
use crate::storage::index::Index;
use crate::storage::store::{LEN_WIDTH, Store};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    #[instrument(skip_all, fields(base_offset))]
    /// Opens or creates the `<base_offset>.store` / `<base_offset>.index`
    /// pair in `dir` and recovers the next offset from the index length.
    pub fn new(
        dir: impl AsRef<Path>,
        base_offset: u64,
        config: SegmentConfig,
    ) -> SegmentResult<Self> {
        let dir = dir.as_ref();

        let store = Arc::new(Store::new(dir.join(format!("{base_offset}.store")))?);
        let mut index = Index::new(
            dir.join(format!("{base_offset}.index")),
            config.max_index_bytes,
        )?;

        reconcile(&store, &mut index)?;
        let next_offset = base_offset + index.entries();

        debug!(
            next_offset,
            store_size = store.size(),
            index_entries = index.entries(),
            "segment opened"
        );

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends the value as the next record and returns its absolute offset.
    ///
    /// The store write lands before the index write; there is no rollback,
    /// so a failed index write leaves an unindexed store tail that the next
    /// open discards.
    pub fn append(&mut self, value: &[u8]) -> SegmentResult<u64> {
        let offset = self.next_offset;
        let (_, pos) = self.store.append(value)?;
        self.index.write((offset - self.base_offset) as u32, pos)?;
        self.next_offset += 1;

        debug!(offset, pos, "record appended to segment");

        Ok(offset)
    }

    /// Reads the record at an absolute offset.
    pub fn read(&self, offset: u64) -> SegmentResult<Record> {
        if !self.contains(offset) {
            return Err(SegmentError::OffsetOutOfRange {
                offset,
                base_offset: self.base_offset,
                next_offset: self.next_offset,
            });
        }

        let (_, pos) = self.index.read((offset - self.base_offset) as i64)?;
        let value = self.store.read(pos)?;

        Ok(Record { value, offset })
    }

    /// First absolute offset this segment may hold.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Next absolute offset this segment would assign.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// True when the offset falls within `[base_offset, next_offset)`.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    /// True once either backing file has reached its configured bound.
    /// Triggers rollover in the log.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    /// Closes index then store, flushing pending writes.
    pub fn close(&mut self) -> SegmentResult<()> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment and deletes both backing files.
    #[instrument(skip(self), fields(base_offset = self.base_offset))]
    pub fn remove(mut self) -> SegmentResult<()> {
        self.close()?;
        for path in [self.index.name(), self.store.name()] {
            fs::remove_file(path).map_err(|source| SegmentError::RemoveFailed {
                path: path.to_string_lossy().into_owned(),
                source,
            })?;
        }
        info!("segment removed");
        Ok(())
    }

    pub(crate) fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }
}

/// Brings store and index back into agreement after an unclean shutdown.
///
/// The index is authoritative: entries are kept up to the first one that does
/// not begin a whole frame inside the store, and store bytes past the last
/// indexed frame are discarded as a torn append.
fn reconcile(store: &Store, index: &mut Index) -> SegmentResult<()> {
    let mut end = 0;
    let mut valid = 0;
    for entry in 0..index.entries() {
        let (_, pos) = index.read(entry as i64)?;
        if pos + LEN_WIDTH > store.size() {
            break;
        }
        let len = store.frame_len(pos)?;
        if pos + LEN_WIDTH + len > store.size() {
            break;
        }
        valid = entry + 1;
        end = pos + LEN_WIDTH + len;
    }

    if valid < index.entries() {
        warn!(
            entries = index.entries(),
            valid, "index entries point past the store, truncating index"
        );
        index.truncate_to(valid);
    }
    if store.size() > end {
        warn!(
            store_size = store.size(),
            end, "unindexed bytes at store tail, truncating store"
        );
        store.truncate(end)?;
    }

    Ok(())
}
