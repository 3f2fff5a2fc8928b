//! Stable syscall numbers.
//!
//! One variant per entry in `spec.md` §6's syscall surface list. Grouped in
//! the same order as the spec (process/identity, filesystem, metadata,
//! pipes/sockets, polling, signals, time, misc) purely for readability —
//! the numbering itself only needs to be stable, not meaningful.

/// A syscall, identified by its stable ABI number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Syscall {
    // Process / identity.
    Exit = 0,
    Fork,
    Rfork,
    Exec,
    Wait,
    GetPid,
    GetPpid,
    GetUid,
    SetUid,
    GetGid,
    SetGid,
    GetEuid,
    SetEuid,
    GetEgid,
    SetEgid,
    GetHostname,
    SetHostname,
    KernelInfo,

    // Descriptor table / filesystem I/O.
    Open,
    Close,
    Read,
    Write,
    PRead,
    PWrite,
    LSeek,
    Dup,
    Dup2,
    Fcntl,
    ReadDirEnts,

    // Metadata and namespace mutation.
    Stat,
    FStat,
    LStat,
    MkDir,
    Unlink,
    RmDir,
    Symlink,
    Link,
    Rename,
    Chmod,
    Chown,
    UTimeNs,
    Truncate,
    FTruncate,

    // IPC.
    Pipe,
    Socket,
    SocketPair,

    // Event waiting.
    Poll,
    PPoll,

    // Signals.
    SigAction,
    SigProcMask,
    Kill,

    // Time.
    ClockGetTime,
    ClockSetTime,
    NanoSleep,
    TimerCreate,
    TimerDelete,
    TimerSetTime,
    TimerGetTime,
    TimerGetOverrun,

    // Misc / kernel control.
    MemStat,
    Chroot,
    Mount,
    Unmount,
    TcSetBlob,
}

impl Syscall {
    /// Total number of defined syscalls, for sizing a dispatch table.
    pub const COUNT: usize = Syscall::TcSetBlob as usize + 1;

    /// Looks up a syscall by its ABI number, returning `None` for numbers
    /// with no assigned meaning (the gate returns [`crate::Errno::ENOSYS`]
    /// for those, per `spec.md` §6).
    #[must_use]
    pub fn from_u32(n: u32) -> Option<Syscall> {
        const TABLE: &[Syscall] = &[
            Syscall::Exit,
            Syscall::Fork,
            Syscall::Rfork,
            Syscall::Exec,
            Syscall::Wait,
            Syscall::GetPid,
            Syscall::GetPpid,
            Syscall::GetUid,
            Syscall::SetUid,
            Syscall::GetGid,
            Syscall::SetGid,
            Syscall::GetEuid,
            Syscall::SetEuid,
            Syscall::GetEgid,
            Syscall::SetEgid,
            Syscall::GetHostname,
            Syscall::SetHostname,
            Syscall::KernelInfo,
            Syscall::Open,
            Syscall::Close,
            Syscall::Read,
            Syscall::Write,
            Syscall::PRead,
            Syscall::PWrite,
            Syscall::LSeek,
            Syscall::Dup,
            Syscall::Dup2,
            Syscall::Fcntl,
            Syscall::ReadDirEnts,
            Syscall::Stat,
            Syscall::FStat,
            Syscall::LStat,
            Syscall::MkDir,
            Syscall::Unlink,
            Syscall::RmDir,
            Syscall::Symlink,
            Syscall::Link,
            Syscall::Rename,
            Syscall::Chmod,
            Syscall::Chown,
            Syscall::UTimeNs,
            Syscall::Truncate,
            Syscall::FTruncate,
            Syscall::Pipe,
            Syscall::Socket,
            Syscall::SocketPair,
            Syscall::Poll,
            Syscall::PPoll,
            Syscall::SigAction,
            Syscall::SigProcMask,
            Syscall::Kill,
            Syscall::ClockGetTime,
            Syscall::ClockSetTime,
            Syscall::NanoSleep,
            Syscall::TimerCreate,
            Syscall::TimerDelete,
            Syscall::TimerSetTime,
            Syscall::TimerGetTime,
            Syscall::TimerGetOverrun,
            Syscall::MemStat,
            Syscall::Chroot,
            Syscall::Mount,
            Syscall::Unmount,
            Syscall::TcSetBlob,
        ];
        TABLE.get(n as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u32_round_trips_every_variant() {
        for n in 0..Syscall::COUNT as u32 {
            assert_eq!(Syscall::from_u32(n).map(|s| s as u32), Some(n));
        }
    }

    #[test]
    fn from_u32_rejects_out_of_range() {
        assert_eq!(Syscall::from_u32(Syscall::COUNT as u32), None);
        assert_eq!(Syscall::from_u32(u32::MAX), None);
    }
}
