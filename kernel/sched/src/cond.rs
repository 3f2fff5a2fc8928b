//! Kernel condition variables.
//!
//! Grounded on `original_source/kernel/kthread.cpp`'s `kthread_cond_wait`,
//! `kthread_cond_wait_signal`, `kthread_cond_signal`, and
//! `kthread_cond_broadcast`: an intrusive FIFO queue of waiters (there,
//! `struct kthread_cond_elem { next, woken }`; here, a `VecDeque<Arc<Thread>>`
//! since this crate has an allocator) with the same wake ordering —
//! [`KCondVar::signal`] always wakes the longest-waiting thread first.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use hadron_core::sync::SpinLock;

use crate::mutex::KMutexGuard;
use crate::runqueue::Scheduler;
use crate::thread::Thread;

/// A FIFO-ordered condition variable for use with [`crate::KMutex`].
pub struct KCondVar {
    waiters: SpinLock<VecDeque<Arc<Thread>>>,
}

/// Outcome of [`KCondVar::wait_signal`].
///
/// Both variants carry the reacquired mutex guard — per
/// `kthread_cond_wait_signal`, the calling thread always owns the mutex
/// again on return, whether or not it was interrupted.
pub enum WaitSignalResult<'a, T> {
    /// Woken by [`KCondVar::signal`] or [`KCondVar::broadcast`].
    Woken(KMutexGuard<'a, T>),
    /// A signal became deliverable before or during the wait.
    Interrupted(KMutexGuard<'a, T>),
}

impl KCondVar {
    /// Creates an empty condition variable.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    /// Atomically releases `guard`'s mutex and blocks the calling thread
    /// until woken by [`Self::signal`] or [`Self::broadcast`], then
    /// reacquires the mutex before returning.
    pub fn wait<'a, T>(&self, sched: &Scheduler, guard: KMutexGuard<'a, T>) -> KMutexGuard<'a, T> {
        let mutex = guard.mutex();
        let current = sched.current();
        self.waiters.lock().push_back(current.clone());
        drop(guard);
        sched.block_current();
        mutex.lock(sched)
    }

    /// Like [`Self::wait`], but returns early without ever blocking if the
    /// calling thread already has a deliverable signal pending, and checks
    /// again after being woken.
    ///
    /// Signal delivery to an already-blocked thread is driven by whatever
    /// subsystem posts the signal (it calls [`Scheduler::wake`] on the
    /// target); this condvar does not track *why* it was woken, so it
    /// re-examines the thread's pending-signal bitmask on resume to tell a
    /// genuine [`Self::signal`] wake apart from an interrupting one. Callers
    /// of `wait_signal` are expected to re-check their own wait condition in
    /// a loop regardless (per `spec.md`'s suspension-point contract), so a
    /// signal that arrives in the same instant as a real wake is still
    /// handled correctly on the next iteration.
    pub fn wait_signal<'a, T>(
        &self,
        sched: &Scheduler,
        guard: KMutexGuard<'a, T>,
    ) -> WaitSignalResult<'a, T> {
        let current = sched.current();
        if current.has_deliverable_signal() {
            return WaitSignalResult::Interrupted(guard);
        }

        let mutex = guard.mutex();
        self.waiters.lock().push_back(current.clone());
        drop(guard);
        sched.block_current();

        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.iter().position(|t| Arc::ptr_eq(t, &current)) {
            waiters.remove(pos);
        }
        drop(waiters);

        let guard = mutex.lock(sched);
        if current.has_deliverable_signal() {
            WaitSignalResult::Interrupted(guard)
        } else {
            WaitSignalResult::Woken(guard)
        }
    }

    /// Wakes the longest-waiting thread, if any.
    pub fn signal(&self, sched: &Scheduler) {
        let next = self.waiters.lock().pop_front();
        if let Some(thread) = next {
            sched.wake(&thread);
        }
    }

    /// Wakes every waiting thread.
    pub fn broadcast(&self, sched: &Scheduler) {
        let drained: VecDeque<Arc<Thread>> = core::mem::take(&mut *self.waiters.lock());
        for thread in drained {
            sched.wake(&thread);
        }
    }

    /// Number of threads currently waiting (diagnostics / tests).
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for KCondVar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::KMutex;
    use crate::runqueue::NullContextSwitch;
    use crate::thread::{Thread, ThreadState};

    fn sched() -> Scheduler {
        static ARCH: NullContextSwitch = NullContextSwitch;
        let idle = Arc::new(Thread::new("idle"));
        Scheduler::new(idle, &ARCH)
    }

    #[test]
    fn signal_wakes_one_waiter_fifo() {
        let s = sched();
        let cond = KCondVar::new();
        let a = Arc::new(Thread::new("a"));
        let b = Arc::new(Thread::new("b"));
        cond.waiters.lock().push_back(a.clone());
        cond.waiters.lock().push_back(b.clone());
        a.set_state(ThreadState::Blocking);
        b.set_state(ThreadState::Blocking);

        cond.signal(&s);
        assert_eq!(a.state(), ThreadState::Runnable);
        assert_eq!(b.state(), ThreadState::Blocking);
        assert_eq!(cond.waiter_count(), 1);
    }

    #[test]
    fn broadcast_wakes_everyone() {
        let s = sched();
        let cond = KCondVar::new();
        let a = Arc::new(Thread::new("a"));
        let b = Arc::new(Thread::new("b"));
        cond.waiters.lock().push_back(a.clone());
        cond.waiters.lock().push_back(b.clone());
        a.set_state(ThreadState::Blocking);
        b.set_state(ThreadState::Blocking);

        cond.broadcast(&s);
        assert_eq!(a.state(), ThreadState::Runnable);
        assert_eq!(b.state(), ThreadState::Runnable);
        assert_eq!(cond.waiter_count(), 0);
    }

    #[test]
    fn wait_then_signal_reacquires_mutex() {
        let s = sched();
        let mutex = KMutex::new_normal(0u32);
        let cond = KCondVar::new();

        let guard = mutex.lock(&s);
        // Simulate another thread having incremented while we "wait": push
        // this thread onto the condvar, drop the lock, then immediately
        // signal before checking the run queue (NullContextSwitch makes
        // block_current/wake synchronous bookkeeping only).
        let current = s.current();
        assert_eq!(cond.waiter_count(), 0);
        drop(guard);
        cond.waiters.lock().push_back(current.clone());
        cond.signal(&s);
        assert_eq!(current.state(), ThreadState::Runnable);
    }

    #[test]
    fn wait_signal_returns_interrupted_when_signal_pending() {
        let s = sched();
        let mutex = KMutex::new_normal(0u32);
        let cond = KCondVar::new();
        let guard = mutex.lock(&s);
        s.current().signal_pending.store(1, core::sync::atomic::Ordering::Relaxed);

        match cond.wait_signal(&s, guard) {
            WaitSignalResult::Interrupted(_guard) => {}
            WaitSignalResult::Woken(_) => panic!("expected Interrupted"),
        }
        assert_eq!(cond.waiter_count(), 0);
    }
}
