//! Error codes returned by syscalls.
//!
//! Grounded on `spec.md` §7's error taxonomy, itself grounded on
//! `original_source/kernel/include/errno.h` and the call sites in
//! `original_source/kernel/process.cpp`/`kernel/fs/util.cpp` that select
//! each code. Kept as one flat enum rather than the teacher's macro-DSL
//! table since there is no longer a userspace crate that needs a matching
//! `errno.h` generated alongside it.

/// A syscall error code.
///
/// The discriminants are stable across releases (they cross the syscall
/// ABI boundary) but deliberately not the same numeric values as POSIX
/// `errno.h` — nothing in this kernel links against a POSIX-numbered libc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
    /// No such file or directory.
    ENOENT = 1,
    /// File or directory already exists.
    EEXIST,
    /// Bad file descriptor.
    EBADF,
    /// Invalid argument.
    EINVAL,
    /// Permission denied.
    EACCES,
    /// Operation not permitted.
    EPERM,
    /// Not a directory.
    ENOTDIR,
    /// Is a directory.
    EISDIR,
    /// Directory not empty.
    ENOTEMPTY,
    /// Out of memory.
    ENOMEM,
    /// Result out of representable range.
    ERANGE,
    /// Interrupted by a signal before completing.
    EINTR,
    /// Resource temporarily unavailable; try again.
    EAGAIN,
    /// Operation now in progress (non-blocking connect).
    EINPROGRESS,
    /// Connection refused.
    ECONNREFUSED,
    /// Connection reset by peer.
    ECONNRESET,
    /// Operation timed out.
    ETIMEDOUT,
    /// Function not implemented.
    ENOSYS,
    /// Operation not supported.
    ENOTSUP,
    /// Protocol not supported.
    EPROTONOSUPPORT,
    /// Address family not supported.
    EAFNOSUPPORT,
    /// No space left on device.
    ENOSPC,
    /// Read-only filesystem.
    EROFS,
    /// Too many levels of symbolic links.
    ELOOP,
    /// Path name too long.
    ENAMETOOLONG,
    /// Input/output error.
    EIO,
    /// Unexpected end of file.
    EEOF,
    /// Socket operation on non-socket.
    ENOTSOCK,
    /// Too many open files in this process.
    EMFILE,
    /// Too many open files system-wide.
    ENFILE,
    /// Illegal seek.
    ESPIPE,
    /// Broken pipe.
    EPIPE,
    /// Device or resource busy.
    EBUSY,
    /// Value too large to be represented.
    EOVERFLOW,
    /// File too large.
    EFBIG,
    /// No such device or address.
    ENXIO,
}

impl Errno {
    /// Short, stable name (`"ENOENT"`, ...), for log lines and `strerror`-like
    /// userspace reporting.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Errno::ENOENT => "ENOENT",
            Errno::EEXIST => "EEXIST",
            Errno::EBADF => "EBADF",
            Errno::EINVAL => "EINVAL",
            Errno::EACCES => "EACCES",
            Errno::EPERM => "EPERM",
            Errno::ENOTDIR => "ENOTDIR",
            Errno::EISDIR => "EISDIR",
            Errno::ENOTEMPTY => "ENOTEMPTY",
            Errno::ENOMEM => "ENOMEM",
            Errno::ERANGE => "ERANGE",
            Errno::EINTR => "EINTR",
            Errno::EAGAIN => "EAGAIN",
            Errno::EINPROGRESS => "EINPROGRESS",
            Errno::ECONNREFUSED => "ECONNREFUSED",
            Errno::ECONNRESET => "ECONNRESET",
            Errno::ETIMEDOUT => "ETIMEDOUT",
            Errno::ENOSYS => "ENOSYS",
            Errno::ENOTSUP => "ENOTSUP",
            Errno::EPROTONOSUPPORT => "EPROTONOSUPPORT",
            Errno::EAFNOSUPPORT => "EAFNOSUPPORT",
            Errno::ENOSPC => "ENOSPC",
            Errno::EROFS => "EROFS",
            Errno::ELOOP => "ELOOP",
            Errno::ENAMETOOLONG => "ENAMETOOLONG",
            Errno::EIO => "EIO",
            Errno::EEOF => "EEOF",
            Errno::ENOTSOCK => "ENOTSOCK",
            Errno::EMFILE => "EMFILE",
            Errno::ENFILE => "ENFILE",
            Errno::ESPIPE => "ESPIPE",
            Errno::EPIPE => "EPIPE",
            Errno::EBUSY => "EBUSY",
            Errno::EOVERFLOW => "EOVERFLOW",
            Errno::EFBIG => "EFBIG",
            Errno::ENXIO => "ENXIO",
        }
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_start_at_one_and_are_distinct() {
        assert_eq!(Errno::ENOENT as i32, 1);
        assert_ne!(Errno::ENOENT as i32, Errno::EEXIST as i32);
    }

    #[test]
    fn name_matches_variant() {
        assert_eq!(Errno::ENXIO.name(), "ENXIO");
        assert_eq!(Errno::EPIPE.to_string(), "EPIPE");
    }
}
