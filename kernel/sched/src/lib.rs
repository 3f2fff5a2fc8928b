//! Blocking kernel-thread scheduler for Hadron OS.
//!
//! Implements a classic single-run-queue, preemption-point kernel thread
//! model: [`ThreadState`] transitions, [`KMutex`]/[`KCondVar`] blocking
//! primitives, a sorted-timer [`Clock`], and a single deferred-work
//! [`Worker`] pool. Unlike `hadron-core`'s `Mutex`/`WaitQueue` (which park an
//! async task behind a [`core::task::Waker`]), the primitives here block a
//! whole kernel thread by changing its [`ThreadState`] and removing it from
//! the run queue — the model used by most Unix-family kernels.
//!
//! Actual register save/restore on a context switch is arch-specific and out
//! of this crate's scope; callers supply an [`ArchContextSwitch`]
//! implementation to [`Scheduler::new`]. The scheduler itself only manages
//! thread bookkeeping and the run queue.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod cond;
pub mod mutex;
pub mod runqueue;
pub mod thread;
pub mod worker;

pub use clock::{Clock, TimeSpec, TimerId};
pub use cond::{KCondVar, WaitSignalResult};
pub use mutex::{Interrupted, KMutex, KMutexGuard, KMutexKind};
pub use runqueue::{ArchContextSwitch, NullContextSwitch, Scheduler};
pub use thread::{Thread, ThreadId, ThreadState};
pub use worker::{Worker, WorkerJob, drain_loop};
