use crate::StoreResult;
use crate::errors::StoreError;
use crate::storage::StoreContext;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

// the length of each record is stored as u64 (8 bytes) before each record
pub(crate) const LEN_WIDTH: u64 = 8;

/// Store represents the append-only file that holds the actual record
/// payloads. Each payload is prefixed with its length.
///
/// Format: [8-byte BE length][payload][8-byte BE length][payload]
///
/// Appends go through a buffered writer; every read flushes it first, so a
/// reader lagging the writer still observes each acknowledged append.
pub struct Store {
    inner: Mutex<Inner>,
    path: PathBuf,
}

struct Inner {
    file: File,
    buf: BufWriter<File>,
    size: u64,
}

impl Store {
    #[instrument(skip_all, fields(path = ?path.as_ref()))]
    /// Opens the store file at the given path, creating it if necessary.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(path)
            .with_open_context(path)?;
        let size = file.metadata().with_open_context(path)?.len();
        let writer = file.try_clone().with_open_context(path)?;

        debug!(existing_size = size, "store file opened");

        Ok(Store {
            inner: Mutex::new(Inner {
                file,
                buf: BufWriter::new(writer),
                size,
            }),
            path: path.to_path_buf(),
        })
    }

    /// Appends one frame and returns `(n, pos)`: the total bytes written
    /// (length prefix plus payload) and the byte position the frame starts
    /// at within the file.
    pub fn append(&self, payload: &[u8]) -> StoreResult<(u64, u64)> {
        let mut inner = self.lock();
        let pos = inner.size;
        inner
            .buf
            .write_all(&(payload.len() as u64).to_be_bytes())
            .with_write_context(pos)?;
        inner.buf.write_all(payload).with_write_context(pos)?;
        let n = LEN_WIDTH + payload.len() as u64;
        inner.size += n;
        Ok((n, pos))
    }

    /// Reads back the payload of the frame starting at `pos`.
    pub fn read(&self, pos: u64) -> StoreResult<Vec<u8>> {
        let mut inner = self.lock();
        inner.flush()?;
        let len = inner.frame_len(pos)?;
        if pos + LEN_WIDTH + len > inner.size {
            return Err(StoreError::Corrupted {
                position: pos,
                reason: format!(
                    "frame of {len} bytes extends past store size {}",
                    inner.size
                ),
            });
        }
        let mut payload = vec![0u8; len as usize];
        inner
            .file
            .read_exact_at(&mut payload, pos + LEN_WIDTH)
            .with_read_context(pos)?;
        Ok(payload)
    }

    /// Reads into `buf` starting at absolute byte `offset`, flushing pending
    /// writes first. Follows `pread` semantics: may return fewer bytes than
    /// requested, and returns 0 at end of file. Ranges are arbitrary and may
    /// straddle frame boundaries.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut inner = self.lock();
        inner.buf.flush()?;
        inner.file.read_at(buf, offset)
    }

    /// Number of bytes appended so far, buffered or durable. This is the
    /// byte position the next frame will be written at.
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    pub fn name(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered appends and syncs the file to disk.
    pub fn close(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.flush()?;
        inner.file.sync_all().with_flush_context()?;
        Ok(())
    }

    /// Length prefix of the frame at `pos`, without reading the payload.
    pub(crate) fn frame_len(&self, pos: u64) -> StoreResult<u64> {
        let mut inner = self.lock();
        inner.flush()?;
        inner.frame_len(pos)
    }

    /// Drops every byte at and past `size`. Used when reconciling the store
    /// against its index after an unclean shutdown.
    pub(crate) fn truncate(&self, size: u64) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.flush()?;
        inner.file.set_len(size).with_truncate_context(size)?;
        inner.size = size;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn flush(&mut self) -> StoreResult<()> {
        self.buf.flush().with_flush_context()
    }

    fn frame_len(&self, pos: u64) -> StoreResult<u64> {
        if pos + LEN_WIDTH > self.size {
            return Err(StoreError::ReadBeyondEnd {
                position: pos,
                size: self.size,
            });
        }
        let mut prefix = [0u8; LEN_WIDTH as usize];
        self.file
            .read_exact_at(&mut prefix, pos)
            .with_read_context(pos)?;
        Ok(u64::from_be_bytes(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WRITE: &[u8] = b"hello world";
    const WIDTH: u64 = LEN_WIDTH + WRITE.len() as u64;

    #[test]
    fn test_store_append_read() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("append_read.store"))?;

        for i in 1..4u64 {
            let (n, pos) = store.append(WRITE)?;
            assert_eq!(pos + n, WIDTH * i);
        }
        assert_eq!(store.size(), WIDTH * 3);

        for i in 0..3u64 {
            assert_eq!(store.read(WIDTH * i)?, WRITE);
        }

        Ok(())
    }

    #[test]
    fn test_store_read_at() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("read_at.store"))?;

        for _ in 0..3 {
            store.append(WRITE)?;
        }

        // walk the raw frame sequence byte by byte
        let mut off = 0u64;
        for _ in 0..3 {
            let mut prefix = [0u8; LEN_WIDTH as usize];
            let n = store.read_at(&mut prefix, off).unwrap();
            assert_eq!(n, LEN_WIDTH as usize);
            off += n as u64;

            let len = u64::from_be_bytes(prefix);
            let mut payload = vec![0u8; len as usize];
            let n = store.read_at(&mut payload, off).unwrap();
            assert_eq!(n as u64, len);
            assert_eq!(payload, WRITE);
            off += n as u64;
        }

        // past the end
        let mut buf = [0u8; 1];
        assert_eq!(store.read_at(&mut buf, off).unwrap(), 0);

        Ok(())
    }

    #[test]
    fn test_append_visible_without_explicit_flush() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("visible.store"))?;

        let (_, pos) = store.append(WRITE)?;
        assert_eq!(store.read(pos)?, WRITE);

        Ok(())
    }

    #[test]
    fn test_close_flushes_buffered_writes() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("close.store");
        let store = Store::new(&path)?;

        store.append(WRITE)?;
        let before = std::fs::metadata(&path).unwrap().len();
        store.close()?;
        let after = std::fs::metadata(&path).unwrap().len();

        assert!(after > before);
        assert_eq!(after, WIDTH);

        Ok(())
    }

    #[test]
    fn test_reopen_preserves_contents() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reopen.store");

        {
            let store = Store::new(&path)?;
            for _ in 0..3 {
                store.append(WRITE)?;
            }
            store.close()?;
        }

        let store = Store::new(&path)?;
        assert_eq!(store.size(), WIDTH * 3);
        assert_eq!(store.read(WIDTH)?, WRITE);

        Ok(())
    }

    #[test]
    fn test_read_beyond_end() -> StoreResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("beyond.store"))?;

        store.append(WRITE)?;

        assert!(matches!(
            store.read(WIDTH),
            Err(StoreError::ReadBeyondEnd { position, .. }) if position == WIDTH
        ));

        Ok(())
    }
}
