//! Byte-oriented pipe for IPC.
//!
//! A pipe has a reader half and a writer half, both implementing [`Inode`].
//! Data written to the writer is buffered in a circular buffer and can be
//! read from the reader. When all writers are dropped, the reader gets EOF.
//! When all readers are dropped, the writer gets [`FsError::BrokenPipe`]
//! (`Errno::EPIPE`).

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicUsize, Ordering};

use hadron_core::sync::WaitQueue;
use hadron_core::sync::SpinLock;
use hadron_fs::{DirEntry, FsError, Inode, InodeType, Permissions};

/// Default pipe buffer size: 64 KiB.
const PIPE_BUF_SIZE: usize = 64 * 1024;

/// Creates a new pipe, returning the reader and writer halves as `Arc<dyn Inode>`.
#[must_use]
pub fn pipe() -> (Arc<dyn Inode>, Arc<dyn Inode>) {
    let inner = Arc::new(PipeInner {
        buffer: SpinLock::new(CircularBuffer::new(PIPE_BUF_SIZE)),
        read_wq: WaitQueue::new(),
        write_wq: WaitQueue::new(),
        readers: AtomicUsize::new(1),
        writers: AtomicUsize::new(1),
    });
    let reader = Arc::new(PipeReader(inner.clone()));
    let writer = Arc::new(PipeWriter(inner));
    (reader, writer)
}

/// Shared pipe state.
struct PipeInner {
    buffer: SpinLock<CircularBuffer>,
    read_wq: WaitQueue,
    write_wq: WaitQueue,
    readers: AtomicUsize,
    writers: AtomicUsize,
}

/// Fixed-size circular buffer.
struct CircularBuffer {
    data: alloc::boxed::Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    count: usize,
}

impl CircularBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: alloc::vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let to_read = buf.len().min(self.count);
        let cap = self.capacity();
        for i in 0..to_read {
            buf[i] = self.data[(self.read_pos + i) % cap];
        }
        self.read_pos = (self.read_pos + to_read) % cap;
        self.count -= to_read;
        to_read
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let available = self.capacity() - self.count;
        let to_write = buf.len().min(available);
        let cap = self.capacity();
        for i in 0..to_write {
            self.data[(self.write_pos + i) % cap] = buf[i];
        }
        self.write_pos = (self.write_pos + to_write) % cap;
        self.count += to_write;
        to_write
    }
}

/// Reader half of a pipe.
pub struct PipeReader(Arc<PipeInner>);

/// Writer half of a pipe.
pub struct PipeWriter(Arc<PipeInner>);

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.0.readers.fetch_sub(1, Ordering::Release);
        self.0.write_wq.wake_all();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.0.writers.fetch_sub(1, Ordering::Release);
        self.0.read_wq.wake_all();
    }
}

impl Inode for PipeReader {
    fn inode_type(&self) -> InodeType {
        InodeType::Fifo
    }

    fn size(&self) -> usize {
        self.0.buffer.lock().count
    }

    fn permissions(&self) -> Permissions {
        Permissions::read_only()
    }

    fn read<'a>(&'a self, _offset: usize, buf: &'a mut [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                {
                    let mut buffer = self.0.buffer.lock();
                    if !buffer.is_empty() {
                        let n = buffer.read(buf);
                        self.0.write_wq.wake_one();
                        return Ok(n);
                    }
                    if self.0.writers.load(Ordering::Acquire) == 0 {
                        return Ok(0); // EOF
                    }
                }
                self.0.read_wq.wait().await;
            }
        })
    }

    fn write<'a>(&'a self, _offset: usize, _buf: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotSupported) })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Inode>, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + Send + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Inode>, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

impl Inode for PipeWriter {
    fn inode_type(&self) -> InodeType {
        InodeType::Fifo
    }

    fn size(&self) -> usize {
        self.0.buffer.lock().count
    }

    fn permissions(&self) -> Permissions {
        Permissions { read: false, write: true, execute: false }
    }

    fn read<'a>(&'a self, _offset: usize, _buf: &'a mut [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotSupported) })
    }

    fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                {
                    let mut buffer = self.0.buffer.lock();
                    if self.0.readers.load(Ordering::Acquire) == 0 {
                        return Err(FsError::BrokenPipe);
                    }
                    if !buffer.is_full() {
                        let n = buffer.write(buf);
                        self.0.read_wq.wake_one();
                        return Ok(n);
                    }
                }
                self.0.write_wq.wait().await;
            }
        })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Inode>, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn readdir(&self) -> Pin<Box<dyn Future<Output = Result<Vec<DirEntry>, FsError>> + Send + '_>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Inode>, FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + Send + 'a>> {
        Box::pin(async { Err(FsError::NotADirectory) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadron_fs::poll_immediate;

    #[test]
    fn write_then_read_back() {
        let (reader, writer) = pipe();
        let n = poll_immediate(writer.write(0, b"hello"));
        assert_eq!(n, Ok(5));

        let mut buf = [0u8; 16];
        let n = poll_immediate(reader.read(0, &mut buf));
        assert_eq!(n, Ok(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn reader_sees_eof_after_writer_dropped() {
        let (reader, writer) = pipe();
        drop(writer);
        let mut buf = [0u8; 16];
        let n = poll_immediate(reader.read(0, &mut buf));
        assert_eq!(n, Ok(0));
    }

    #[test]
    fn writer_sees_error_after_reader_dropped() {
        let (reader, writer) = pipe();
        drop(reader);
        let n = poll_immediate(writer.write(0, b"x"));
        assert_eq!(n, Err(FsError::BrokenPipe));
    }

    #[test]
    fn partial_write_when_buffer_nearly_full() {
        let (reader, writer) = pipe();
        let big = alloc::vec![1u8; PIPE_BUF_SIZE];
        let n = poll_immediate(writer.write(0, &big)).unwrap();
        assert_eq!(n, PIPE_BUF_SIZE);

        // Buffer is full; draining readers is what tests exercise in
        // scenario S1, not a second write (which would block forever
        // under poll_immediate since no second poll ever arrives).
        let mut out = alloc::vec![0u8; PIPE_BUF_SIZE];
        let read = poll_immediate(reader.read(0, &mut out)).unwrap();
        assert_eq!(read, PIPE_BUF_SIZE);
    }
}
