//! Log is the ordered collection of segments behind a single reader/writer
//! lock, presenting one contiguous, monotonically addressed range of offsets.
//! The tail segment is the only one accepting writes.

use crate::LogResult;
use crate::api::v1::Record;
use crate::errors::{IndexError, LogError, SegmentError};
use crate::storage::config::{Config, SegmentConfig};
use crate::storage::segment::Segment;
use crate::storage::store::Store;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Log manages the segments in one directory and provides the unified
/// append/read interface over them. It handles offset assignment, segment
/// rollover, routing reads to the owning segment, and prefix truncation.
///
/// All methods take `&self`; a `Log` wrapped in an [`Arc`] is shared freely
/// across threads. The directory must be owned by exactly one live `Log`.
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    #[instrument(skip_all, fields(dir = ?dir.as_ref()))]
    /// Opens the log in `dir`, creating the directory if needed. Existing
    /// segment files are opened in base-offset order; an empty directory
    /// gets a single segment at the configured initial offset.
    pub fn open(dir: impl AsRef<Path>, mut config: Config) -> LogResult<Self> {
        let dir = dir.as_ref();
        config.segment = config.segment.normalized();

        let segments = Self::load_segments(dir, &config)?;

        info!(segments = segments.len(), "log opened");

        Ok(Log {
            dir: dir.to_path_buf(),
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Appends the value as the next record and returns its assigned offset.
    ///
    /// Rolls a fresh segment once the active one reaches its configured
    /// bounds. A full index also rolls and retries, so callers only ever see
    /// assigned offsets or genuine I/O failures.
    #[instrument(skip_all, fields(len = value.len()))]
    pub fn append(&self, value: &[u8]) -> LogResult<u64> {
        let mut segments = self.write_segments();
        let active = segments.last_mut().ok_or(LogError::Closed)?;

        let offset = match active.append(value) {
            Ok(offset) => offset,
            Err(SegmentError::Index(IndexError::Full)) => {
                let base = active.next_offset();
                debug!(base, "active segment index is full, rolling over");
                Self::push_segment(&self.dir, self.config.segment, &mut segments, base)?;
                match segments.last_mut() {
                    Some(active) => active.append(value)?,
                    None => return Err(LogError::Closed),
                }
            }
            Err(e) => return Err(e.into()),
        };

        if segments.last().is_some_and(Segment::is_maxed) {
            Self::push_segment(&self.dir, self.config.segment, &mut segments, offset + 1)?;
        }

        Ok(offset)
    }

    /// Reads the record at `offset`.
    pub fn read(&self, offset: u64) -> LogResult<Record> {
        let segments = self.read_segments();
        let segment = segments
            .iter()
            .find(|s| s.contains(offset))
            .ok_or(LogError::OffsetOutOfRange { offset })?;
        Ok(segment.read(offset)?)
    }

    /// First readable offset.
    pub fn lowest_offset(&self) -> LogResult<u64> {
        let segments = self.read_segments();
        let first = segments.first().ok_or(LogError::Closed)?;
        Ok(first.base_offset())
    }

    /// Offset of the most recently appended record.
    ///
    /// An empty log reports 0, which is indistinguishable from a single
    /// record at offset 0; `lowest_offset() > highest_offset()` holds only
    /// on an empty log and is the emptiness predicate.
    pub fn highest_offset(&self) -> LogResult<u64> {
        let segments = self.read_segments();
        let last = segments.last().ok_or(LogError::Closed)?;
        let next = last.next_offset();
        Ok(if next == 0 { 0 } else { next - 1 })
    }

    /// Removes every segment whose records all sit at or below `lowest`,
    /// reclaiming disk from already-consumed history.
    #[instrument(skip(self))]
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut segments = self.write_segments();

        // segments are ordered and contiguous, so the removable ones form
        // a prefix
        let keep_from = segments
            .iter()
            .position(|s| s.next_offset() > lowest + 1)
            .unwrap_or(segments.len());
        for segment in segments.drain(..keep_from) {
            segment.remove()?;
        }

        if segments.is_empty() {
            Self::push_segment(&self.dir, self.config.segment, &mut segments, lowest + 1)?;
        }

        info!(lowest, remaining = segments.len(), "log truncated");
        Ok(())
    }

    /// A reader over the raw store files of every segment, concatenated in
    /// offset order. Surfaces the on-disk frame sequence for replication and
    /// backup. The segment set is snapshotted here; appends racing the
    /// reader may or may not be observed.
    pub fn reader(&self) -> LogReader {
        let segments = self.read_segments();
        LogReader {
            stores: segments.iter().map(|s| s.store()).collect(),
            current: 0,
            pos: 0,
        }
    }

    /// Flushes and closes every segment. The directory is left intact for a
    /// later [`Log::open`].
    pub fn close(&self) -> LogResult<()> {
        let mut segments = self.write_segments();
        for segment in segments.iter_mut() {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes the log and deletes its directory. Subsequent operations fail
    /// with [`LogError::Closed`].
    pub fn remove(&self) -> LogResult<()> {
        let mut segments = self.write_segments();
        self.teardown(&mut segments)?;
        info!(dir = ?self.dir, "log removed");
        Ok(())
    }

    /// Wipes the log and re-initializes it with a single empty segment at
    /// the configured initial offset.
    pub fn reset(&self) -> LogResult<()> {
        let mut segments = self.write_segments();
        self.teardown(&mut segments)?;
        *segments = Self::load_segments(&self.dir, &self.config)?;
        info!(dir = ?self.dir, "log reset");
        Ok(())
    }

    fn load_segments(dir: &Path, config: &Config) -> LogResult<Vec<Segment>> {
        fs::create_dir_all(dir).map_err(|e| directory_failed(dir, e))?;

        // store and index files share their base-offset stem; collect into a
        // set to open each segment once
        let mut base_offsets = BTreeSet::new();
        for entry in fs::read_dir(dir).map_err(|e| directory_failed(dir, e))? {
            let path = entry.map_err(|e| directory_failed(dir, e))?.path();
            let known_ext = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("store" | "index")
            );
            let base = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok());
            match base {
                Some(base) if known_ext => {
                    base_offsets.insert(base);
                }
                _ => warn!(path = ?path, "skipping foreign file in log directory"),
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Segment::new(dir, base, config.segment)?);
        }
        if segments.is_empty() {
            segments.push(Segment::new(dir, config.segment.initial_offset, config.segment)?);
        }
        Ok(segments)
    }

    fn push_segment(
        dir: &Path,
        config: SegmentConfig,
        segments: &mut Vec<Segment>,
        base: u64,
    ) -> LogResult<()> {
        let segment = Segment::new(dir, base, config)?;
        info!(base, total = segments.len() + 1, "new active segment");
        segments.push(segment);
        Ok(())
    }

    fn teardown(&self, segments: &mut Vec<Segment>) -> LogResult<()> {
        for mut segment in segments.drain(..) {
            segment.close()?;
        }
        fs::remove_dir_all(&self.dir).map_err(|e| directory_failed(&self.dir, e))?;
        Ok(())
    }

    fn read_segments(&self) -> RwLockReadGuard<'_, Vec<Segment>> {
        self.segments.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_segments(&self) -> RwLockWriteGuard<'_, Vec<Segment>> {
        self.segments.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn directory_failed(path: &Path, source: io::Error) -> LogError {
    LogError::DirectoryFailed {
        path: path.to_string_lossy().into_owned(),
        source,
    }
}

/// Byte reader over the concatenated store files, in segment order.
///
/// Holds no log lock after construction; each read goes through the owning
/// store's mutex, so buffered appends are flushed before being observed.
/// Not restartable.
pub struct LogReader {
    stores: Vec<Arc<Store>>,
    current: usize,
    pos: u64,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(store) = self.stores.get(self.current) {
            let n = store.read_at(buf, self.pos)?;
            if n > 0 {
                self.pos += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.pos = 0;
        }
        Ok(0)
    }
}
