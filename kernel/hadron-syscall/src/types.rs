//! Plain-old-data structs crossing the syscall ABI boundary.
//!
//! Shapes are grounded on the deleted `hadron-syscall` crate's
//! macro-generated `StatInfo`/`MemoryInfo`/`UptimeInfo`/`KernelVersionInfo`
//! types (read before deletion) and `spec.md` §3/§6. All are `#[repr(C)]`
//! so their layout is stable for a userspace ABI even though no userspace
//! crate currently links against them.

/// Seconds/nanoseconds timestamp, as returned by `clock_gettime` and stored
/// in [`Stat`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

/// Result of `stat`/`fstat`/`lstat`.
///
/// Field set per `spec.md` §3's inode metadata: enough to implement POSIX
/// `stat(2)` semantics without carrying fields (like `st_rdev`'s device
/// major/minor split) this kernel's device model doesn't need.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Device id of the filesystem this inode lives on.
    pub dev: u64,
    /// Inode number, unique within `dev`.
    pub ino: u64,
    /// File type and permission bits.
    pub mode: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Hard link count.
    pub nlink: u32,
    /// Size in bytes (meaningless for directories/devices).
    pub size: u64,
    /// Last access time.
    pub atime: Timespec,
    /// Last modification time.
    pub mtime: Timespec,
    /// Last status-change time.
    pub ctime: Timespec,
    /// Preferred I/O block size for this inode's backing store.
    pub blksize: u32,
}

/// Result of the `memstat` syscall.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
}

/// Result of reading the monotonic uptime clock.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UptimeInfo {
    pub uptime_ns: u64,
}

/// Result of the `kernelinfo` syscall.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelVersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    _pad: u32,
    /// NUL-padded kernel name, ASCII.
    pub name: [u8; 32],
}

impl KernelVersionInfo {
    /// Builds a version record, padding `name` with zero bytes and
    /// truncating silently if it's longer than the fixed field (the
    /// compiled-in kernel name is a constant, never user input).
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32, name: &str) -> Self {
        let mut buf = [0u8; 32];
        let bytes = name.as_bytes();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        KernelVersionInfo {
            major,
            minor,
            patch,
            _pad: 0,
            name: buf,
        }
    }
}

impl Default for KernelVersionInfo {
    fn default() -> Self {
        KernelVersionInfo::new(0, 0, 0, "")
    }
}

/// One `argv`/environment entry for `spawn`-family process creation.
///
/// Grounded on `original_source/kernel/process.cpp`'s `spawn`/`exec` argument
/// marshalling, which copies a flat array of pointer+length pairs from the
/// caller's address space rather than NUL-terminated C strings.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SpawnArg {
    /// Pointer into the caller's address space.
    pub ptr: usize,
    /// Length in bytes, excluding any terminator.
    pub len: usize,
}

/// Arguments to the `spawn` syscall.
///
/// Every pointer+length pair names a region in the caller's address space;
/// `path` identifies the ELF binary to load, `argv`/`envp` are flat arrays
/// of [`SpawnArg`] descriptors rather than NUL-terminated C strings, per
/// `original_source/kernel/process.cpp`'s marshalling convention.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SpawnInfo {
    /// Pointer to the path string in the caller's address space.
    pub path_ptr: usize,
    /// Length of the path string in bytes.
    pub path_len: usize,
    /// Pointer to an array of `argv_count` [`SpawnArg`] descriptors.
    pub argv_ptr: usize,
    pub argv_count: usize,
    /// Pointer to an array of `envp_count` [`SpawnArg`] descriptors.
    pub envp_ptr: usize,
    pub envp_count: usize,
}

/// Memory protection and mapping flags for the `mmap` syscall.
///
/// Plain bitmask constants rather than a `bitflags!` type: `sys_mem_map`
/// receives `prot`/`flags` as raw `usize` syscall arguments and tests them
/// with `&`/`!=` directly, the same way `original_source/kernel/process.cpp`'s
/// `mmap` tests its `int prot`/`int flags` parameters.
pub const PROT_READ: usize = 0x1;
pub const PROT_WRITE: usize = 0x2;
pub const PROT_EXEC: usize = 0x4;

/// The mapping has no backing file; pages are zero-filled.
pub const MAP_ANONYMOUS: usize = 0x20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_version_pads_short_name() {
        let v = KernelVersionInfo::new(1, 2, 3, "hadron");
        assert_eq!(&v.name[..6], b"hadron");
        assert_eq!(v.name[6], 0);
    }

    #[test]
    fn kernel_version_truncates_long_name() {
        let long = "x".repeat(64);
        let v = KernelVersionInfo::new(0, 0, 0, &long);
        assert_eq!(v.name.len(), 32);
        assert!(v.name.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn stat_default_is_zeroed() {
        let s = Stat::default();
        assert_eq!(s.size, 0);
        assert_eq!(s.mode, 0);
    }
}
