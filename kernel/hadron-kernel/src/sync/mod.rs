//! Synchronization primitives.
//!
//! The lock-free and fixed-capacity primitives ([`SpinLock`], [`LazyLock`],
//! [`WaitQueue`]) live in `hadron-core` and are shared with code that runs
//! before an allocator exists; this module re-exports them so kernel code
//! can keep writing `crate::sync::SpinLock`. The remaining modules are
//! kernel-local: they need an allocator ([`HeapWaitQueue`]), lock ordering
//! diagnostics ([`lockdep`]), or an async runtime ([`Mutex`], [`RwLock`])
//! that hadron-core doesn't carry.

mod heap_waitqueue;
mod irq_spinlock;
pub mod lockdep;
mod mutex;
mod rwlock;

#[cfg(test)]
pub(crate) mod test_waker;

pub use hadron_core::sync::{LazyLock, SpinLock, SpinLockGuard, WaitQueue};

pub use heap_waitqueue::HeapWaitQueue;
pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use mutex::{Mutex, MutexGuard, MutexLockFuture};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
