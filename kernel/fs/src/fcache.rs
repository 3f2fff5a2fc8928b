//! Per-inode file cache.
//!
//! Grounded on `spec.md` §3/§4.5's `FileCache`: a sparse array of block
//! indices into the shared [`BlockCache`](crate::bcache::BlockCache),
//! `file_size`/`file_written` tracking how much of the file actually has
//! backend-populated content versus implicit zero-fill past the
//! high-water mark, and `pread`/`pwrite` splitting a request into
//! cache-block-sized chunks. `fcache_mutex` below is a plain
//! [`SpinLock`](hadron_core::sync::SpinLock) rather than a blocking
//! [`hadron_sched::KMutex`] — this crate doesn't depend on `hadron-sched`,
//! so the blocking wait (if the critical section is ever held across I/O)
//! is `hadron-kernel`'s to add when it wraps a `FileCache` per open file.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use hadron_core::sync::SpinLock;

use crate::FsError;
use crate::bcache::{BlockBackend, BlockCache};

const BLOCK_SIZE: u64 = 4096;

struct Inner {
    /// `blocks[i]` is the shared cache's slot index for chunk `i`, or
    /// `None` if that chunk has never been touched.
    blocks: Vec<Option<usize>>,
    file_size: u64,
    file_written: u64,
    modified: bool,
    modified_size: bool,
}

/// Per-inode cache of a file's content, backed by a shared [`BlockCache`].
pub struct FileCache {
    cache: Arc<BlockCache>,
    backend: Arc<dyn BlockBackend>,
    inner: SpinLock<Inner>,
}

impl FileCache {
    /// Creates a file cache over `backend`, whose backing store already
    /// holds `file_written` bytes of real content out of a logical
    /// `file_size` (the two differ when a file has been extended by
    /// `ftruncate` past what was ever written).
    #[must_use]
    pub fn new(cache: Arc<BlockCache>, backend: Arc<dyn BlockBackend>, file_size: u64, file_written: u64) -> Self {
        let blocks_length = blocks_for(file_size);
        Self {
            cache,
            backend,
            inner: SpinLock::new(Inner {
                blocks: alloc::vec![None; blocks_length],
                file_size,
                file_written,
                modified: false,
                modified_size: false,
            }),
        }
    }

    /// Current logical size.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.inner.lock().file_size
    }

    /// `true` if any block has been written since the last [`Self::sync`].
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.inner.lock().modified
    }

    /// `true` if the file's size has changed since the last
    /// [`Self::sync`] (separate from `is_modified` since a size-only
    /// change, e.g. a truncate to a shorter length with no new writes,
    /// still needs the inode's on-disk metadata updated).
    #[must_use]
    pub fn is_modified_size(&self) -> bool {
        self.inner.lock().modified_size
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, clamped to the
    /// current file size. Returns the number of bytes actually read.
    pub fn pread(&self, offset: u64, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut inner = self.inner.lock();
        let file_size = inner.file_size;
        if offset >= file_size {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(file_size - offset) as usize;
        let mut done = 0usize;
        while done < want {
            let pos = offset + done as u64;
            let chunk = (pos / BLOCK_SIZE) as usize;
            let chunk_off = (pos % BLOCK_SIZE) as usize;
            let n = (want - done).min(BLOCK_SIZE as usize - chunk_off);
            let idx = self.slot_for(&mut inner, chunk)?;
            self.cache.read(idx, chunk_off, &mut buf[done..done + n]);
            done += n;
        }
        Ok(done)
    }

    /// Writes `buf` at `offset`, growing the file if the write extends past
    /// the current size. Returns the number of bytes written (always
    /// `buf.len()` barring an I/O error acquiring a block).
    pub fn pwrite(&self, offset: u64, buf: &[u8]) -> Result<usize, FsError> {
        let mut inner = self.inner.lock();
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(FsError::InvalidArgument)?;
        if end > inner.file_size {
            Self::change_size_locked(&self.cache, &mut inner, end, false)?;
        }

        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let chunk = (pos / BLOCK_SIZE) as usize;
            let chunk_off = (pos % BLOCK_SIZE) as usize;
            let n = (buf.len() - done).min(BLOCK_SIZE as usize - chunk_off);
            let whole_block = chunk_off == 0 && n == BLOCK_SIZE as usize;
            let idx = self.slot_for_write(&mut inner, chunk, whole_block)?;
            self.cache.write(idx, chunk_off, &buf[done..done + n]);
            done += n;
        }
        inner.file_written = inner.file_written.max(end);
        inner.modified = true;
        Ok(done)
    }

    /// Resizes the file to `new_size`. `exact` disables the usual growth
    /// headroom reservation (used by `ftruncate`/`truncate`, where the
    /// caller's requested size is authoritative, not a hint).
    pub fn change_size(&self, new_size: u64, exact: bool) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        Self::change_size_locked(&self.cache, &mut inner, new_size, exact)
    }

    fn change_size_locked(cache: &Arc<BlockCache>, inner: &mut Inner, new_size: u64, exact: bool) -> Result<(), FsError> {
        let required = blocks_for(new_size);
        if required < inner.blocks.len() {
            for slot in inner.blocks.drain(required..) {
                if let Some(idx) = slot {
                    cache.release(idx)?;
                }
            }
        } else if required > inner.blocks.len() {
            if !exact {
                inner.blocks.reserve(required.saturating_sub(inner.blocks.len()) * 2);
            }
            inner.blocks.resize(required, None);
        }
        inner.file_size = new_size;
        inner.file_written = inner.file_written.min(new_size);
        inner.modified_size = true;
        Ok(())
    }

    /// Shrinks the file to `new_size`, releasing blocks past EOF. A thin
    /// wrapper over [`Self::change_size`] with `exact = true` — truncation
    /// never needs growth headroom.
    pub fn truncate(&self, new_size: u64) -> Result<(), FsError> {
        self.change_size(new_size, true)
    }

    /// Writes every dirty block to the backend. Stops at the first backend
    /// failure, matching `fsync`'s all-or-nothing success contract: a
    /// caller that gets `Err` must retry, not assume partial progress was
    /// durable.
    pub fn sync(&self) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        for slot in inner.blocks.iter().flatten() {
            self.cache.sync(*slot)?;
        }
        inner.modified = false;
        inner.modified_size = false;
        Ok(())
    }

    fn slot_for(&self, inner: &mut Inner, chunk: usize) -> Result<usize, FsError> {
        if let Some(idx) = inner.blocks[chunk] {
            self.cache.mark_used(idx);
            return Ok(idx);
        }
        let populate = inner.file_written > chunk as u64 * BLOCK_SIZE;
        let idx = self.cache.acquire(&self.backend, chunk as u64, populate)?;
        inner.blocks[chunk] = Some(idx);
        Ok(idx)
    }

    fn slot_for_write(&self, inner: &mut Inner, chunk: usize, whole_block: bool) -> Result<usize, FsError> {
        if let Some(idx) = inner.blocks[chunk] {
            return Ok(idx);
        }
        let populate = !whole_block && inner.file_written > chunk as u64 * BLOCK_SIZE;
        let idx = self.cache.acquire(&self.backend, chunk as u64, populate)?;
        inner.blocks[chunk] = Some(idx);
        Ok(idx)
    }
}

impl Drop for FileCache {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        for slot in inner.blocks.drain(..).flatten() {
            // Best-effort: destruction can't surface a sync error to
            // anyone. Mirrors the original's "forcibly released" wording.
            let _ = self.cache.release(slot);
        }
    }
}

fn blocks_for(size: u64) -> usize {
    (size.div_ceil(BLOCK_SIZE)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcache::BlockBackend;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct MemBackend {
        blocks: SpinLock<alloc::collections::BTreeMap<u64, alloc::boxed::Box<[u8]>>>,
        writes: AtomicUsize,
    }

    impl MemBackend {
        fn new() -> Arc<dyn BlockBackend> {
            Arc::new(Self {
                blocks: SpinLock::new(alloc::collections::BTreeMap::new()),
                writes: AtomicUsize::new(0),
            })
        }
    }

    impl BlockBackend for MemBackend {
        fn read_block(&self, block_index: u64, buf: &mut [u8]) -> Result<(), FsError> {
            if let Some(data) = self.blocks.lock().get(&block_index) {
                buf.copy_from_slice(data);
            } else {
                buf.fill(0);
            }
            Ok(())
        }
        fn write_block(&self, block_index: u64, buf: &[u8]) -> Result<(), FsError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.blocks.lock().insert(block_index, buf.into());
            Ok(())
        }
    }

    fn fcache() -> FileCache {
        let cache = Arc::new(BlockCache::new(8));
        let backend = MemBackend::new();
        FileCache::new(cache, backend, 0, 0)
    }

    #[test]
    fn write_then_read_back_within_one_block() {
        let fc = fcache();
        fc.pwrite(0, b"hello world").unwrap();
        let mut buf = [0u8; 11];
        let n = fc.pread(0, &mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn pwrite_grows_file_size() {
        let fc = fcache();
        assert_eq!(fc.file_size(), 0);
        fc.pwrite(10, b"x").unwrap();
        assert_eq!(fc.file_size(), 11);
    }

    #[test]
    fn read_past_eof_returns_zero_bytes() {
        let fc = fcache();
        fc.pwrite(0, b"abc").unwrap();
        let mut buf = [0u8; 10];
        let n = fc.pread(3, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn truncate_shrinks_and_releases_blocks() {
        let fc = fcache();
        fc.pwrite(0, &[1u8; 5000]).unwrap();
        fc.truncate(10).unwrap();
        assert_eq!(fc.file_size(), 10);
        let mut buf = [0u8; 20];
        let n = fc.pread(0, &mut buf).unwrap();
        assert_eq!(n, 10);
    }

    #[test]
    fn sync_writes_every_dirty_block() {
        let fc = fcache();
        fc.pwrite(0, b"data").unwrap();
        fc.sync().unwrap();
    }

    #[test]
    fn gap_past_file_written_reads_as_zero() {
        // A file extended by truncate-growth before anything is written
        // there must read back as zero, not garbage or an error.
        let fc = fcache();
        fc.change_size(4096 * 2, false).unwrap();
        let mut buf = [0xffu8; 16];
        let n = fc.pread(4096, &mut buf).unwrap();
        assert_eq!(n, 16);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
