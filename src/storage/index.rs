//! The index file speeds up reads. It maps a record's offset, relative to the
//! owning segment's base offset, to the byte position of the record's frame in
//! the store file, so reading a record is a two-step lookup: the index entry
//! first, then the store read at that position.

use crate::IndexResult;
use crate::errors::IndexError;
use crate::storage::IndexContext;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

pub(crate) const OFFSET_WIDTH: u64 = 4;
pub(crate) const POSITION_WIDTH: u64 = 8;
pub(crate) const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Index provides fast lookups from relative record offsets to byte positions
/// in the store. Entries are fixed width, so entry `k` lives at byte
/// `k * ENTRY_WIDTH` of the mapping.
///
/// Format: [4-byte BE relative offset][8-byte BE position] per entry.
///
/// The backing file is pre-sized to its configured capacity while open and
/// truncated back to the bytes actually used on close; the on-disk length of
/// a cleanly closed index is what lets a reopened segment recover its next
/// offset.
pub struct Index {
    file: File,
    mmap: Option<MmapMut>,
    size: u64, // bytes used, not capacity
    path: PathBuf,
}

impl Index {
    #[instrument(skip_all, fields(path = ?path.as_ref(), max_index_bytes))]
    /// Opens the index file at the given path, creating it if necessary, and
    /// maps it at `max_index_bytes` capacity.
    pub fn new(path: impl AsRef<Path>, max_index_bytes: u64) -> IndexResult<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_open_context(path)?;

        let mut size = file.metadata().with_open_context(path)?.len();
        if size % ENTRY_WIDTH != 0 {
            // torn trailing write from an unclean shutdown
            let valid = size - size % ENTRY_WIDTH;
            warn!(
                file_size = size,
                valid, "index size is not a multiple of the entry width, truncating"
            );
            file.set_len(valid).with_truncate_context(valid)?;
            size = valid;
        }

        // Pre-size to capacity, but never below the bytes already used.
        let capacity = size.max(max_index_bytes);
        file.set_len(capacity).with_truncate_context(capacity)?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(capacity as usize)
                .map_mut(&file)
                .with_mmap_context(capacity)?
        };

        debug!(entries = size / ENTRY_WIDTH, capacity, "index file opened");

        Ok(Index {
            file,
            mmap: Some(mmap),
            size,
            path: path.to_path_buf(),
        })
    }

    /// Appends one entry. Fails with [`IndexError::Full`] when the mapped
    /// capacity would be exceeded.
    pub fn write(&mut self, rel_offset: u32, position: u64) -> IndexResult<()> {
        let size = self.size;
        let mmap = self.mmap.as_mut().ok_or(IndexError::Closed)?;
        if size + ENTRY_WIDTH > mmap.len() as u64 {
            return Err(IndexError::Full);
        }

        let at = size as usize;
        mmap[at..at + OFFSET_WIDTH as usize].copy_from_slice(&rel_offset.to_be_bytes());
        mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());
        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Reads entry `n` and returns `(relative offset, position)`; `n < 0`
    /// reads the last entry. Fails with [`IndexError::Empty`] when no entries
    /// have been written yet.
    pub fn read(&self, entry: i64) -> IndexResult<(u32, u64)> {
        let entries = self.entries();
        if entries == 0 {
            return Err(IndexError::Empty);
        }
        let n = if entry < 0 { entries - 1 } else { entry as u64 };
        if n >= entries {
            return Err(IndexError::EntryOutOfRange { entry: n, entries });
        }
        let mmap = self.mmap.as_ref().ok_or(IndexError::Closed)?;

        let at = (n * ENTRY_WIDTH) as usize;
        let mut rel = [0u8; OFFSET_WIDTH as usize];
        rel.copy_from_slice(&mmap[at..at + OFFSET_WIDTH as usize]);
        let mut pos = [0u8; POSITION_WIDTH as usize];
        pos.copy_from_slice(&mmap[at + OFFSET_WIDTH as usize..at + ENTRY_WIDTH as usize]);

        Ok((u32::from_be_bytes(rel), u64::from_be_bytes(pos)))
    }

    /// Number of entries in the index.
    pub fn entries(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Bytes used by entries (not the mapped capacity).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Forgets every entry at and past `entries`. The file shrinks on close;
    /// until then, subsequent writes overwrite the stale bytes.
    pub(crate) fn truncate_to(&mut self, entries: u64) {
        self.size = self.size.min(entries * ENTRY_WIDTH);
    }

    /// Flushes the mapping, unmaps it, and truncates the backing file from
    /// its pre-sized capacity down to the bytes actually used. Idempotent.
    ///
    /// The unmap must precede the truncation: a live mapping can pin the
    /// file size on some platforms.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub fn close(&mut self) -> IndexResult<()> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };
        mmap.flush().with_flush_context()?;
        drop(mmap);
        self.file.set_len(self.size).with_truncate_context(self.size)?;
        self.file.sync_all().with_flush_context()?;
        debug!(size = self.size, "index closed");
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if self.mmap.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_index_write_read() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut index = Index::new(temp_dir.path().join("write_read.index"), 1024)?;

        let entries = [(0u32, 0u64), (1, 10), (2, 20), (3, 30)];
        for (rel, pos) in entries {
            index.write(rel, pos)?;
        }
        assert_eq!(index.entries(), 4);

        for (n, (rel, pos)) in entries.iter().enumerate() {
            assert_eq!(index.read(n as i64)?, (*rel, *pos));
        }

        // negative entry reads the last one
        assert_eq!(index.read(-1)?, (3, 30));

        Ok(())
    }

    #[test]
    fn test_index_empty() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::new(temp_dir.path().join("empty.index"), 1024)?;

        assert!(index.is_empty());
        assert!(matches!(index.read(0), Err(IndexError::Empty)));
        assert!(matches!(index.read(-1), Err(IndexError::Empty)));

        Ok(())
    }

    #[test]
    fn test_index_full() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut index = Index::new(temp_dir.path().join("full.index"), 2 * ENTRY_WIDTH)?;

        index.write(0, 0)?;
        index.write(1, 19)?;
        assert!(matches!(index.write(2, 38), Err(IndexError::Full)));

        Ok(())
    }

    #[test]
    fn test_index_entry_out_of_range() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut index = Index::new(temp_dir.path().join("out_of_range.index"), 1024)?;

        index.write(0, 0)?;

        assert!(matches!(
            index.read(1),
            Err(IndexError::EntryOutOfRange {
                entry: 1,
                entries: 1
            })
        ));

        Ok(())
    }

    #[test]
    fn test_close_truncates_and_reopen_recovers() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reopen.index");

        {
            let mut index = Index::new(&path, 1024)?;
            for n in 0..3u32 {
                index.write(n, u64::from(n) * 19)?;
            }
            // while open, the file sits at its pre-sized capacity
            assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
            index.close()?;
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * ENTRY_WIDTH);

        let mut index = Index::new(&path, 1024)?;
        assert_eq!(index.entries(), 3);
        assert_eq!(index.read(-1)?, (2, 38));

        // and the index keeps accepting writes where it left off
        index.write(3, 57)?;
        assert_eq!(index.read(-1)?, (3, 57));

        Ok(())
    }

    #[test]
    fn test_torn_trailing_entry_discarded_on_open() -> IndexResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("torn.index");

        {
            let mut index = Index::new(&path, 1024)?;
            index.write(0, 0)?;
            index.write(1, 19)?;
            index.close()?;
        }

        // chop the last entry in half
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(2 * ENTRY_WIDTH - 5).unwrap();
        drop(file);

        let index = Index::new(&path, 1024)?;
        assert_eq!(index.entries(), 1);
        assert_eq!(index.read(-1)?, (0, 0));

        Ok(())
    }
}
