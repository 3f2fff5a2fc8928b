//! Kernel blocking mutex.
//!
//! Grounded on `original_source/kernel/include/sortix/kernel/kthread.h`'s
//! `kthread_mutex_t`: a single `unsigned` word in the original encoding
//! locked-state plus owner; here split into explicit fields since this
//! crate has `alloc`. Three kinds, matching the header's documented
//! behaviors:
//!
//! - [`KMutexKind::Normal`] — no reentrancy tracking; relocking from the
//!   owning thread deadlocks (by design, same as the original).
//! - [`KMutexKind::Recursive`] — the owning thread may relock; each
//!   additional lock must be matched by an unlock before the mutex is
//!   actually released.
//! - [`KMutexKind::ErrorCheck`] — like `Normal`, but self-relock is detected
//!   and panics instead of deadlocking silently, surfacing the programming
//!   error immediately (see `DESIGN.md` for why `lock()` panics here rather
//!   than returning a `Result`: `kthread_mutex_t` has no failure-carrying
//!   call convention for the plain `lock`/`unlock` pair, only `trylock`).

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use hadron_core::sync::SpinLock;

use crate::runqueue::Scheduler;
use crate::thread::{Thread, ThreadId};

/// Reentrancy behavior of a [`KMutex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KMutexKind {
    /// Self-relock deadlocks.
    Normal,
    /// Self-relock increments a depth counter instead of blocking.
    Recursive,
    /// Self-relock panics instead of deadlocking.
    ErrorCheck,
}

struct Owner {
    thread: ThreadId,
    depth: u32,
}

/// A blocking mutual-exclusion lock for kernel threads.
///
/// Unlike [`hadron_core::sync::SpinLock`] (which busy-waits) or
/// `hadron_core::sync::Mutex` (which parks an async task behind a
/// [`core::task::Waker`]), `KMutex` blocks the *whole calling thread* by
/// handing it to [`Scheduler::block_current`] — the primitive everything at
/// and above the process-table / VFS layer in `spec.md` §5's lock-ordering
/// table is built on.
pub struct KMutex<T> {
    kind: KMutexKind,
    locked: AtomicBool,
    owner: SpinLock<Option<Owner>>,
    waiters: SpinLock<VecDeque<Arc<Thread>>>,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is always gated by `locked`, enforced the same
// way as `hadron_core::sync::SpinLock`.
unsafe impl<T: Send> Send for KMutex<T> {}
unsafe impl<T: Send> Sync for KMutex<T> {}

impl<T> KMutex<T> {
    /// Creates a new unlocked normal mutex.
    pub fn new_normal(value: T) -> Self {
        Self::with_kind(KMutexKind::Normal, value)
    }

    /// Creates a new unlocked recursive mutex.
    pub fn new_recursive(value: T) -> Self {
        Self::with_kind(KMutexKind::Recursive, value)
    }

    /// Creates a new unlocked error-checking mutex.
    pub fn new_error_check(value: T) -> Self {
        Self::with_kind(KMutexKind::ErrorCheck, value)
    }

    /// Creates a new unlocked mutex of the given kind.
    pub fn with_kind(kind: KMutexKind, value: T) -> Self {
        Self {
            kind,
            locked: AtomicBool::new(false),
            owner: SpinLock::new(None),
            waiters: SpinLock::new(VecDeque::new()),
            data: UnsafeCell::new(value),
        }
    }

    fn try_acquire(&self, current: &Arc<Thread>) -> Result<(), ()> {
        let mut owner = self.owner.lock();
        if let Some(o) = owner.as_mut() {
            if o.thread == current.id() {
                match self.kind {
                    KMutexKind::Recursive => {
                        o.depth += 1;
                        return Ok(());
                    }
                    KMutexKind::ErrorCheck => {
                        panic!("KMutex: thread {:?} relocked an error-check mutex it already owns", current.id());
                    }
                    KMutexKind::Normal => return Err(()),
                }
            }
            return Err(());
        }
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            *owner = Some(Owner {
                thread: current.id(),
                depth: 1,
            });
            Ok(())
        } else {
            Err(())
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self, sched: &Scheduler) -> Option<KMutexGuard<'_, T>> {
        let current = sched.current();
        self.try_acquire(&current).ok().map(|()| KMutexGuard {
            mutex: self,
            sched,
        })
    }

    /// Acquires the lock, blocking the calling kernel thread if contended.
    pub fn lock<'a>(&'a self, sched: &'a Scheduler) -> KMutexGuard<'a, T> {
        let current = sched.current();
        loop {
            if self.try_acquire(&current).is_ok() {
                return KMutexGuard { mutex: self, sched };
            }
            self.waiters.lock().push_back(current.clone());
            sched.block_current();
        }
    }

    /// Like [`Self::lock`], but returns `Err` immediately if the calling
    /// thread already has a deliverable signal pending, checked both before
    /// the first acquisition attempt and after every wake — mirroring
    /// `kthread_mutex_lock_signal`.
    pub fn lock_signal<'a>(&'a self, sched: &'a Scheduler) -> Result<KMutexGuard<'a, T>, Interrupted> {
        let current = sched.current();
        loop {
            if current.has_deliverable_signal() {
                return Err(Interrupted);
            }
            if self.try_acquire(&current).is_ok() {
                return Ok(KMutexGuard { mutex: self, sched });
            }
            self.waiters.lock().push_back(current.clone());
            sched.block_current();
        }
    }

    fn unlock(&self, sched: &Scheduler) {
        let current = sched.current();
        let released = {
            let mut owner = self.owner.lock();
            match owner.as_ref() {
                Some(o) if o.thread == current.id() => {}
                Some(o) => match self.kind {
                    KMutexKind::ErrorCheck => panic!(
                        "KMutex: thread {:?} unlocked an error-check mutex owned by {:?}",
                        current.id(),
                        o.thread
                    ),
                    KMutexKind::Normal | KMutexKind::Recursive => {
                        debug_assert!(
                            false,
                            "KMutex: thread {:?} unlocked a mutex owned by {:?}",
                            current.id(),
                            o.thread
                        );
                    }
                },
                None => {
                    debug_assert!(false, "KMutex: unlock called while not held");
                }
            }
            match owner.as_mut() {
                Some(o) if o.depth > 1 => {
                    o.depth -= 1;
                    false
                }
                _ => {
                    *owner = None;
                    true
                }
            }
        };
        if released {
            self.locked.store(false, Ordering::Release);
            if let Some(next) = self.waiters.lock().pop_front() {
                sched.wake(&next);
            }
        }
    }
}

/// Returned by [`KMutex::lock_signal`] when a signal interrupts the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// RAII guard releasing a [`KMutex`] on drop.
pub struct KMutexGuard<'a, T> {
    mutex: &'a KMutex<T>,
    sched: &'a Scheduler,
}

impl<'a, T> KMutexGuard<'a, T> {
    /// The mutex this guard was issued from — used by [`crate::KCondVar`] to
    /// reacquire after a wait.
    pub(crate) fn mutex(&self) -> &'a KMutex<T> {
        self.mutex
    }
}

impl<T> Deref for KMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the guard's existence proves the mutex is held.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for KMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard's existence proves the mutex is held.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for KMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock(self.sched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runqueue::NullContextSwitch;
    use crate::thread::Thread;

    fn sched() -> Scheduler {
        static ARCH: NullContextSwitch = NullContextSwitch;
        let idle = Arc::new(Thread::new("idle"));
        Scheduler::new(idle, &ARCH)
    }

    #[test]
    fn lock_and_unlock_normal() {
        let s = sched();
        let m = KMutex::new_normal(5);
        {
            let g = m.lock(&s);
            assert_eq!(*g, 5);
        }
        let g2 = m.try_lock(&s);
        assert!(g2.is_some());
    }

    #[test]
    fn try_lock_fails_when_held_by_other() {
        let s = sched();
        let m = KMutex::new_normal(0);
        let _g = m.lock(&s);
        // Same "current" thread in this single-threaded host test owns it,
        // so a second try_lock from the same thread on a Normal mutex must
        // fail rather than silently double-acquiring.
        assert!(m.try_lock(&s).is_none());
    }

    #[test]
    fn recursive_mutex_allows_relock_by_owner() {
        let s = sched();
        let m = KMutex::new_recursive(0);
        let g1 = m.lock(&s);
        let g2 = m.lock(&s);
        drop(g2);
        // Still held after dropping the inner relock.
        assert!(m.try_lock(&s).is_none());
        drop(g1);
        assert!(m.try_lock(&s).is_some());
    }

    #[test]
    #[should_panic]
    fn error_check_mutex_panics_on_self_relock() {
        let s = sched();
        let m = KMutex::new_error_check(0);
        let _g1 = m.lock(&s);
        let _g2 = m.lock(&s);
    }

    #[test]
    fn lock_signal_fails_fast_when_signal_pending() {
        let s = sched();
        let m = KMutex::new_normal(0);
        s.current().signal_pending.store(1, Ordering::Relaxed);
        assert!(m.lock_signal(&s).is_err());
    }

    #[test]
    fn unlock_wakes_one_waiter() {
        let s = sched();
        let m = Arc::new(KMutex::new_normal(0));
        let g = m.lock(&s);
        let waiter = Arc::new(Thread::new("waiter"));
        m.waiters.lock().push_back(waiter.clone());
        drop(g);
        assert_eq!(waiter.state(), crate::thread::ThreadState::Runnable);
    }
}
