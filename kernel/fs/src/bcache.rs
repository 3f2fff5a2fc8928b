//! Shared block cache.
//!
//! A fixed-size pool of block buffers shared across every open file,
//! grounded on `spec.md` §3/§4.5's `BlockCacheBlock`: each slot is in
//! exactly one of three lists (MRU/LRU for in-use blocks, or unused) and
//! `MODIFIED ⇒ PRESENT ⇒ USED`. `AcquireBlock` prefers the unused list,
//! then reclaims the LRU block if it's clean, and only flushes-then-reuses
//! the LRU block as a last resort. There is no teacher counterpart — the
//! teacher's block devices are read and written directly — so the slab/
//! intrusive-list shape here follows `kernel/mm`'s freelist-backed
//! `RegionAllocator` pattern (a fixed pool of fixed-size objects handed out
//! and reclaimed by index, not by pointer).

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use hadron_core::sync::SpinLock;

use crate::FsError;

/// Backing store a cached block is read from / flushed to.
///
/// One implementation per open file; the block cache holds only a
/// [`Weak`] reference so a file cache that is destroyed with blocks still
/// resident doesn't keep its backend alive — see
/// [`crate::fcache::FileCache`]'s `Drop`, which forcibly releases its
/// blocks first.
pub trait BlockBackend: Send + Sync {
    /// Reads one cache-block-sized chunk at `block_index` into `buf`.
    fn read_block(&self, block_index: u64, buf: &mut [u8]) -> Result<(), FsError>;
    /// Writes `buf` to `block_index`, reporting backend failure.
    fn write_block(&self, block_index: u64, buf: &[u8]) -> Result<(), FsError>;
}

const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Used,
    Unused,
}

struct Block {
    data: Box<[u8; BLOCK_SIZE]>,
    owner: Weak<dyn BlockBackend>,
    block_index: u64,
    present: bool,
    modified: bool,
    membership: Membership,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Block {
    fn empty() -> Self {
        Block {
            data: Box::new([0u8; BLOCK_SIZE]),
            owner: Weak::<NullBackend>::new(),
            block_index: 0,
            present: false,
            modified: false,
            membership: Membership::Unused,
            prev: None,
            next: None,
        }
    }
}

struct NullBackend;
impl BlockBackend for NullBackend {
    fn read_block(&self, _: u64, _: &mut [u8]) -> Result<(), FsError> {
        Err(FsError::IoError)
    }
    fn write_block(&self, _: u64, _: &[u8]) -> Result<(), FsError> {
        Err(FsError::IoError)
    }
}

struct Inner {
    slab: Vec<Block>,
    mru: Option<usize>,
    lru: Option<usize>,
    unused: Option<usize>,
}

impl Inner {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slab[idx].prev, self.slab[idx].next);
        match prev {
            Some(p) => self.slab[p].next = next,
            None => match self.slab[idx].membership {
                Membership::Used => self.mru = next,
                Membership::Unused => self.unused = next,
            },
        }
        if let Some(n) = next {
            self.slab[n].prev = prev;
        } else if self.slab[idx].membership == Membership::Used {
            self.lru = prev;
        }
        self.slab[idx].prev = None;
        self.slab[idx].next = None;
    }

    fn push_unused(&mut self, idx: usize) {
        self.slab[idx].membership = Membership::Unused;
        self.slab[idx].prev = None;
        self.slab[idx].next = self.unused;
        if let Some(head) = self.unused {
            self.slab[head].prev = Some(idx);
        }
        self.unused = Some(idx);
    }

    /// Moves `idx` to the MRU end of the used list, marking it used.
    fn push_mru(&mut self, idx: usize) {
        self.slab[idx].membership = Membership::Used;
        self.slab[idx].prev = None;
        self.slab[idx].next = self.mru;
        if let Some(head) = self.mru {
            self.slab[head].prev = Some(idx);
        }
        self.mru = Some(idx);
        if self.lru.is_none() {
            self.lru = Some(idx);
        }
    }
}

/// A fixed-capacity pool of cached blocks shared across every [`FileCache`].
///
/// [`FileCache`]: crate::fcache::FileCache
pub struct BlockCache {
    inner: SpinLock<Inner>,
}

impl BlockCache {
    /// Creates a cache with `capacity` block slots, all initially unused.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slab = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slab.push(Block::empty());
        }
        let mut inner = Inner {
            slab,
            mru: None,
            lru: None,
            unused: None,
        };
        for idx in (0..capacity).rev() {
            inner.push_unused(idx);
        }
        Self {
            inner: SpinLock::new(inner),
        }
    }

    /// Acquires a block for `block_index` owned by `owner`, populating it
    /// from the backend if `populate` is true (callers pass `false` when
    /// the whole block is about to be overwritten — a `pwrite` that covers
    /// the entire block never needs to fetch it first).
    ///
    /// On return the block is linked at the MRU position (newly-acquired
    /// blocks are always "just used").
    pub fn acquire(&self, owner: &Arc<dyn BlockBackend>, block_index: u64, populate: bool) -> Result<usize, FsError> {
        let mut inner = self.inner.lock();

        let idx = if let Some(idx) = inner.unused {
            inner.unlink(idx);
            idx
        } else {
            let lru = inner.lru.expect("block cache with zero capacity");
            if inner.slab[lru].modified {
                Self::flush_locked(&mut inner, lru)?;
            }
            inner.unlink(lru);
            lru
        };

        {
            let block = &mut inner.slab[idx];
            block.owner = Arc::downgrade(owner);
            block.block_index = block_index;
            block.modified = false;
            block.data.fill(0);
            block.present = false;
        }
        if populate {
            let mut buf = [0u8; BLOCK_SIZE];
            owner.read_block(block_index, &mut buf)?;
            inner.slab[idx].data.copy_from_slice(&buf);
        }
        inner.slab[idx].present = true;
        inner.push_mru(idx);
        Ok(idx)
    }

    /// Copies `len` bytes starting at `offset` within the block into `dst`.
    pub fn read(&self, idx: usize, offset: usize, dst: &mut [u8]) {
        let inner = self.inner.lock();
        let len = dst.len().min(BLOCK_SIZE - offset);
        dst[..len].copy_from_slice(&inner.slab[idx].data[offset..offset + len]);
    }

    /// Copies `src` into the block starting at `offset` and marks it
    /// modified (`MODIFIED ⇒ PRESENT ⇒ USED`, already guaranteed since only
    /// an acquired, present, MRU-linked block's index is ever handed out).
    pub fn write(&self, idx: usize, offset: usize, src: &[u8]) {
        let mut inner = self.inner.lock();
        let len = src.len().min(BLOCK_SIZE - offset);
        inner.slab[idx].data[offset..offset + len].copy_from_slice(&src[..len]);
        inner.slab[idx].modified = true;
        inner.unlink(idx);
        inner.push_mru(idx);
    }

    /// Marks a block used (touched but not modified), moving it to MRU.
    pub fn mark_used(&self, idx: usize) {
        let mut inner = self.inner.lock();
        inner.unlink(idx);
        inner.push_mru(idx);
    }

    /// Flushes a block if dirty, then returns it to the unused list. Called
    /// when a [`FileCache`](crate::fcache::FileCache) releases a block
    /// (truncate past EOF, or on destruction).
    pub fn release(&self, idx: usize) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        if inner.slab[idx].modified {
            Self::flush_locked(&mut inner, idx)?;
        }
        inner.unlink(idx);
        inner.slab[idx].owner = Weak::<NullBackend>::new();
        inner.slab[idx].present = false;
        inner.push_unused(idx);
        Ok(())
    }

    /// Flushes a block to its owning backend without releasing it.
    pub fn sync(&self, idx: usize) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        if inner.slab[idx].modified {
            Self::flush_locked(&mut inner, idx)?;
        }
        Ok(())
    }

    fn flush_locked(inner: &mut Inner, idx: usize) -> Result<(), FsError> {
        let owner = inner.slab[idx].owner.upgrade().ok_or(FsError::IoError)?;
        let block_index = inner.slab[idx].block_index;
        owner.write_block(block_index, &inner.slab[idx].data[..])?;
        inner.slab[idx].modified = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct MemBackend {
        blocks: SpinLock<alloc::collections::BTreeMap<u64, [u8; BLOCK_SIZE]>>,
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
            let mut arr = [0u8; BLOCK_SIZE];
            arr.copy_from_slice(buf);
            self.blocks.lock().insert(block_index, arr);
            Ok(())
        }
    }

    #[test]
    fn acquire_then_write_then_read_back() {
        let cache = BlockCache::new(4);
        let backend = MemBackend::new();
        let idx = cache.acquire(&backend, 0, false).unwrap();
        cache.write(idx, 0, b"hello");
        let mut buf = [0u8; 5];
        cache.read(idx, 0, &mut buf);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn eviction_flushes_dirty_lru_block() {
        let cache = BlockCache::new(2);
        let backend = MemBackend::new();
        let a = cache.acquire(&backend, 0, false).unwrap();
        cache.write(a, 0, b"A");
        let b = cache.acquire(&backend, 1, false).unwrap();
        cache.write(b, 0, b"B");
        // Pool is full (capacity 2), both used. Acquiring a third evicts
        // the LRU — block 0, since block 1 was touched most recently.
        let _c = cache.acquire(&backend, 2, false).unwrap();
        let mut buf = [0u8; 1];
        backend.read_block(0, &mut buf).unwrap();
        assert_eq!(&buf, b"A");
    }

    #[test]
    fn release_returns_block_to_unused_list() {
        let cache = BlockCache::new(1);
        let backend = MemBackend::new();
        let idx = cache.acquire(&backend, 0, false).unwrap();
        cache.release(idx).unwrap();
        // Capacity 1: re-acquiring must succeed by reusing the freed slot
        // rather than panicking on an empty LRU list.
        let idx2 = cache.acquire(&backend, 5, false).unwrap();
        assert_eq!(idx2, idx);
    }

    #[test]
    fn populate_true_fetches_existing_backend_contents() {
        let cache = BlockCache::new(1);
        let backend = MemBackend::new();
        backend.write_block(3, &[7u8; BLOCK_SIZE]).unwrap();
        let idx = cache.acquire(&backend, 3, true).unwrap();
        let mut buf = vec![0u8; BLOCK_SIZE];
        cache.read(idx, 0, &mut buf);
        assert!(buf.iter().all(|&b| b == 7));
    }
}
