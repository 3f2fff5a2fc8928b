//! IPC primitives: pipes and bound-socketpair connections.
//!
//! Grounded on `hadron-kernel/src/ipc/pipe.rs`'s circular-buffer pipe,
//! adapted to the canonical async `hadron_fs::Inode` trait (the original
//! had a synchronous `lookup`/`readdir`/`create`/`unlink` with only
//! `read`/`write` async).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod pipe;
pub mod socket;

pub use pipe::pipe;
pub use socket::socketpair;
