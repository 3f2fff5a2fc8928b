//! Single run-queue scheduler core.
//!
//! `spec.md` §4.2/§5 call for a single-CPU, preemptive kernel-thread
//! scheduler rather than the teacher's per-CPU async executor
//! (`hadron-kernel/src/sched/executor.rs`) — see `SPEC_FULL.md` §4.2. This
//! module keeps the *policy* (run queue, current-thread bookkeeping, thread
//! state transitions) in safe, host-testable Rust and defers the
//! *mechanism* (saving and restoring a thread's machine registers) to an
//! [`ArchContextSwitch`] implementation supplied by the arch layer, mirrored
//! on the teacher's `ArchHalt` trait in `sched/primitives.rs` — one narrow
//! trait boundary between policy and hardware.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use hadron_core::sync::SpinLock;

use crate::thread::{Thread, ThreadState};

/// Performs the machine-level half of a context switch.
///
/// Implementations save the outgoing thread's registers and stack pointer
/// and load the incoming thread's. This crate never calls into arch code
/// directly; everything arch-specific is reached through this trait so the
/// scheduler's queueing policy stays testable on the host.
pub trait ArchContextSwitch: Send + Sync {
    /// Switches execution from `from` to `to`. Returns once `from` has been
    /// resumed again by some future switch back to it.
    fn switch(&self, from: &Thread, to: &Thread);
}

/// A context switch implementation that performs no real switch.
///
/// Used by the idle thread bootstrap and by host tests, where there is only
/// ever one logical thread of control.
pub struct NullContextSwitch;

impl ArchContextSwitch for NullContextSwitch {
    fn switch(&self, _from: &Thread, _to: &Thread) {}
}

struct Inner {
    run_queue: VecDeque<Arc<Thread>>,
    current: Arc<Thread>,
    idle: Arc<Thread>,
}

/// The single-CPU kernel thread scheduler.
///
/// There is one logical run queue (`spec.md` §2 pins `MAX_CPUS = 1`); FIFO
/// order among `Runnable` threads. The currently running thread is never a
/// member of the run queue.
pub struct Scheduler {
    inner: SpinLock<Inner>,
    arch: &'static dyn ArchContextSwitch,
}

impl Scheduler {
    /// Creates a scheduler whose initial running thread is `idle`.
    ///
    /// `idle` is the fallback run when the queue is empty; it is never
    /// pushed onto the run queue itself and is never reported as `Dead`.
    #[must_use]
    pub fn new(idle: Arc<Thread>, arch: &'static dyn ArchContextSwitch) -> Self {
        idle.set_state(ThreadState::Runnable);
        Self {
            inner: SpinLock::new(Inner {
                run_queue: VecDeque::new(),
                current: idle.clone(),
                idle,
            }),
            arch,
        }
    }

    /// Returns the currently running thread.
    #[must_use]
    pub fn current(&self) -> Arc<Thread> {
        self.inner.lock().current.clone()
    }

    /// Admits a new thread to the run queue.
    pub fn spawn(&self, thread: Arc<Thread>) {
        thread.set_state(ThreadState::Runnable);
        self.inner.lock().run_queue.push_back(thread);
    }

    /// Marks `thread` runnable and enqueues it, if it isn't already.
    ///
    /// This is the wake half of every blocking primitive in this crate:
    /// `KMutex::unlock`, `KCondVar::signal`/`broadcast`, and timer expiry all
    /// call this to move a parked thread back onto the run queue.
    pub fn wake(&self, thread: &Arc<Thread>) {
        if thread.state() == ThreadState::Dead {
            return;
        }
        thread.set_state(ThreadState::Runnable);
        let mut inner = self.inner.lock();
        if Arc::ptr_eq(thread, &inner.current) {
            return;
        }
        if inner.run_queue.iter().any(|t| Arc::ptr_eq(t, thread)) {
            return;
        }
        inner.run_queue.push_back(thread.clone());
    }

    /// Voluntarily yields the CPU, re-enqueuing the calling thread at the
    /// tail of the run queue (the contract named in `SPEC_FULL.md` §4.2 for
    /// `sched::yield_now()`, standing in for the original's `int $129`).
    pub fn yield_now(&self) {
        let (from, to) = {
            let mut inner = self.inner.lock();
            let from = inner.current.clone();
            match inner.run_queue.pop_front() {
                Some(next) => {
                    if from.state() == ThreadState::Runnable && !Arc::ptr_eq(&from, &inner.idle) {
                        inner.run_queue.push_back(from.clone());
                    }
                    inner.current = next.clone();
                    (from, next)
                }
                None => return,
            }
        };
        if !Arc::ptr_eq(&from, &to) {
            self.arch.switch(&from, &to);
        }
    }

    /// Blocks the calling thread: marks it `Blocking`, switches to the next
    /// runnable thread (or idle), and returns only once some other code has
    /// called [`Scheduler::wake`] on it and it has been rescheduled.
    ///
    /// The caller is responsible for enqueuing `from` onto whatever wait
    /// structure (mutex waiter list, condvar FIFO) will eventually wake it —
    /// this function only performs the state transition and the switch.
    pub fn block_current(&self) {
        let (from, to) = {
            let mut inner = self.inner.lock();
            let from = inner.current.clone();
            from.set_state(ThreadState::Blocking);
            let next = inner.run_queue.pop_front().unwrap_or_else(|| inner.idle.clone());
            inner.current = next.clone();
            (from, next)
        };
        self.arch.switch(&from, &to);
    }

    /// Terminates the calling thread.
    ///
    /// Mirrors `kthread_exit()`: the thread is marked `Dead` and a final
    /// switch away from it is performed. Its kernel stack is not reclaimed
    /// here — per `original_source/kernel/kthread.cpp`'s
    /// `kthread_do_kill_thread`, that is a job for the owning worker pool,
    /// which polls [`Thread::state`] until it observes `Dead` before freeing
    /// the stack (`spec.md` §4.1's `Memory::GetKernelStack` owner).
    pub fn exit_thread(&self) -> ! {
        let (from, to) = {
            let mut inner = self.inner.lock();
            let from = inner.current.clone();
            from.set_state(ThreadState::Dead);
            let next = inner.run_queue.pop_front().unwrap_or_else(|| inner.idle.clone());
            inner.current = next.clone();
            (from, next)
        };
        self.arch.switch(&from, &to);
        unreachable!("exited thread was rescheduled")
    }

    /// Number of threads currently sitting on the run queue (for tests and
    /// diagnostics; excludes the running thread and idle).
    #[must_use]
    pub fn run_queue_len(&self) -> usize {
        self.inner.lock().run_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sched() -> Scheduler {
        static ARCH: NullContextSwitch = NullContextSwitch;
        let idle = Arc::new(Thread::new("idle"));
        Scheduler::new(idle, &ARCH)
    }

    #[test]
    fn spawn_enqueues_runnable() {
        let s = sched();
        let t = Arc::new(Thread::new("t"));
        s.spawn(t.clone());
        assert_eq!(t.state(), ThreadState::Runnable);
        assert_eq!(s.run_queue_len(), 1);
    }

    #[test]
    fn yield_now_round_robins() {
        let s = sched();
        let a = Arc::new(Thread::new("a"));
        let b = Arc::new(Thread::new("b"));
        s.spawn(a.clone());
        s.spawn(b.clone());

        // current is idle; yielding should hand off to `a` and park idle.
        s.yield_now();
        assert!(Arc::ptr_eq(&s.current(), &a));
    }

    #[test]
    fn block_current_removes_from_run_and_switches() {
        let s = sched();
        let a = Arc::new(Thread::new("a"));
        s.spawn(a.clone());
        s.yield_now();
        assert!(Arc::ptr_eq(&s.current(), &a));

        s.block_current();
        assert_eq!(a.state(), ThreadState::Blocking);
        // No other runnable thread — falls back to idle.
        assert_eq!(s.current().name(), "idle");
    }

    #[test]
    fn wake_reenqueues_blocked_thread() {
        let s = sched();
        let a = Arc::new(Thread::new("a"));
        s.spawn(a.clone());
        s.yield_now();
        s.block_current();
        assert_eq!(s.run_queue_len(), 0);

        s.wake(&a);
        assert_eq!(a.state(), ThreadState::Runnable);
        assert_eq!(s.run_queue_len(), 1);
    }

    #[test]
    fn wake_is_idempotent_for_already_runnable() {
        let s = sched();
        let a = Arc::new(Thread::new("a"));
        s.spawn(a.clone());
        s.wake(&a);
        assert_eq!(s.run_queue_len(), 1);
    }

    #[test]
    fn wake_ignores_dead_threads() {
        let s = sched();
        let a = Arc::new(Thread::new("a"));
        a.set_state(ThreadState::Dead);
        s.wake(&a);
        assert_eq!(s.run_queue_len(), 0);
    }
}
