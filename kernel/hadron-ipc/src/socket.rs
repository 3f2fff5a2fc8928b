//! `socketpair()`-style connected endpoints.
//!
//! `spec.md` §9 leaves open whether a socketpair is implemented as two
//! `Inode`s bound under a `/tmp` path or a purely in-memory connection.
//! This kernel has no scratch filesystem mounted by default (`devfs` is
//! the only filesystem built in, per `kernel/fs/src/devfs.rs`), so binding
//! to a path would require inventing one; instead each endpoint is built
//! from a cross-wired pair of [`crate::pipe::pipe`] buffers, matching what
//! a `/tmp`-bound pair would behave like (independent read/write
//! directions, EOF/broken-pipe semantics) without requiring a mount.
//! Decision recorded in `DESIGN.md`.

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;

use hadron_fs::{DirEntry, FsError, Inode, InodeType, Permissions};

use crate::pipe::pipe;

/// One half of a connected socketpair: reads from the peer's outgoing
/// pipe, writes to its own outgoing pipe.
pub struct SocketEnd {
    rx: Arc<dyn Inode>,
    tx: Arc<dyn Inode>,
}

/// Creates a full-duplex connected pair, each end readable and writable
/// independently of the other — `a`'s writes are `b`'s reads and vice
/// versa.
#[must_use]
pub fn socketpair() -> (Arc<dyn Inode>, Arc<dyn Inode>) {
    let (a_to_b_read, a_to_b_write) = pipe();
    let (b_to_a_read, b_to_a_write) = pipe();

    let a = Arc::new(SocketEnd { rx: b_to_a_read, tx: a_to_b_write });
    let b = Arc::new(SocketEnd { rx: a_to_b_read, tx: b_to_a_write });
    (a, b)
}

impl Inode for SocketEnd {
    fn inode_type(&self) -> InodeType {
        InodeType::Socket
    }

    fn size(&self) -> usize {
        self.rx.size()
    }

    fn permissions(&self) -> Permissions {
        Permissions::read_write()
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        self.rx.read(offset, buf)
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<usize, FsError>> + Send + 'a>> {
        self.tx.write(offset, buf)
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
    fn a_writes_are_visible_to_b() {
        let (a, b) = socketpair();
        let n = poll_immediate(a.write(0, b"ping"));
        assert_eq!(n, Ok(4));

        let mut buf = [0u8; 8];
        let n = poll_immediate(b.read(0, &mut buf));
        assert_eq!(n, Ok(4));
        assert_eq!(&buf[..4], b"ping");
    }

    #[test]
    fn b_writes_are_visible_to_a() {
        let (a, b) = socketpair();
        poll_immediate(b.write(0, b"pong")).unwrap();
        let mut buf = [0u8; 8];
        let n = poll_immediate(a.read(0, &mut buf)).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], b"pong");
    }

    #[test]
    fn dropping_b_gives_a_eof_on_read_and_error_on_write() {
        let (a, b) = socketpair();
        drop(b);
        let mut buf = [0u8; 8];
        assert_eq!(poll_immediate(a.read(0, &mut buf)), Ok(0));
        assert_eq!(poll_immediate(a.write(0, b"x")), Err(FsError::BrokenPipe));
    }
}
