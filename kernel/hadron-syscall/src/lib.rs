//! Syscall numbers, errno taxonomy, and ABI structs shared by the kernel's
//! syscall gate.
//!
//! The teacher's equivalent crate (`crates/hadron-syscall`, deleted here)
//! generated this surface from a `define_syscalls! { errors {...} types
//! {...} }` proc-macro DSL so the same definitions could be shared with a
//! userspace libc crosscompiled against them. `spec.md` §4.9/§6 closes the
//! syscall surface to a fixed, small set with no userspace crate to share
//! it with, so this crate is hand-written instead — see `DESIGN.md` for why
//! the macro crate (and `hadron-syscall-macros`) were dropped rather than
//! kept for a single expansion site.

#![cfg_attr(not(test), no_std)]

pub mod dispatch;
pub mod errno;
pub mod number;
pub mod types;

pub use dispatch::{SyscallHandler, dispatch};
pub use errno::Errno;
pub use number::Syscall;
pub use types::{
    KernelVersionInfo, MAP_ANONYMOUS, MemoryInfo, PROT_EXEC, PROT_READ, PROT_WRITE, SpawnArg,
    SpawnInfo, Stat, Timespec, UptimeInfo,
};
