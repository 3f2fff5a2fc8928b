//! Kernel thread identity and state.
//!
//! Grounded on `original_source/kernel/include/sortix/kernel/thread.h` and
//! `scheduler.h`: a thread is either `NONE` (never scheduled), `RUNNABLE`
//! (on the run queue or currently executing), `BLOCKING` (parked on a
//! [`crate::KMutex`]/[`crate::KCondVar`]/wait queue), or `DEAD` (exited,
//! awaiting reclamation by the idle-priority cleanup job the original
//! schedules from `kthread_exit`).

use core::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Monotonically increasing thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    /// Allocates a fresh, never-reused thread id.
    pub fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Scheduling state of a kernel thread.
///
/// Mirrors `enum ThreadState { NONE, RUNNABLE, BLOCKING, DEAD }` from
/// `scheduler.h` exactly; transitions are driven by [`crate::Scheduler`] and
/// the blocking primitives, never set directly by unrelated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Constructed but never handed to the scheduler.
    None = 0,
    /// On the run queue, or currently the running thread.
    Runnable = 1,
    /// Parked off the run queue, waiting on a mutex, condvar, or timer.
    Blocking = 2,
    /// Has called [`crate::runqueue::Scheduler::exit_thread`]; its kernel
    /// stack is retained until the reclamation job observes `Dead` and frees
    /// it, matching `kthread_do_kill_thread`'s poll loop.
    Dead = 3,
}

impl ThreadState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ThreadState::None,
            1 => ThreadState::Runnable,
            2 => ThreadState::Blocking,
            _ => ThreadState::Dead,
        }
    }
}

/// A kernel thread's scheduling metadata.
///
/// Register contents and the kernel stack are opaque to this crate — they
/// are owned and switched by the arch layer via [`crate::ArchContextSwitch`].
/// `Thread` only tracks what the scheduler's policy needs: identity, state,
/// and the thread-local parts of signal delivery ([`spec.md`] §4.3's
/// `signal_pending`/`signal_mask`, carried here as opaque bitmasks so
/// `hadron-sched` does not need to depend on the signal enum's crate).
pub struct Thread {
    id: ThreadId,
    name: &'static str,
    state: AtomicU8,
    /// Pending-signal bitmask, set by the signal subsystem and consulted by
    /// `kthread_cond_wait_signal`-equivalent waits to interrupt blocking.
    pub signal_pending: AtomicU64,
    /// Thread-local signal mask (bits set here are never delivered).
    pub signal_mask: AtomicU64,
    /// Set once `exit_thread` has been called; further wakes are no-ops.
    pledged_destruction: AtomicU8,
}

impl Thread {
    /// Creates a new thread descriptor in the `None` state.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: ThreadId::next(),
            name,
            state: AtomicU8::new(ThreadState::None as u8),
            signal_pending: AtomicU64::new(0),
            signal_mask: AtomicU64::new(0),
            pledged_destruction: AtomicU8::new(0),
        }
    }

    /// This thread's id.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// This thread's debug name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Reads the current scheduling state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Sets the scheduling state. Only [`crate::Scheduler`] should call this.
    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Returns `true` if a signal is pending and not masked — the condition
    /// `kthread_cond_wait_signal` checks before and during a wait.
    #[must_use]
    pub fn has_deliverable_signal(&self) -> bool {
        let pending = self.signal_pending.load(Ordering::Acquire);
        let mask = self.signal_mask.load(Ordering::Acquire);
        pending & !mask != 0
    }

    /// Marks this thread as pledged for destruction (post-`exit_thread`).
    pub fn pledge_destruction(&self) {
        self.pledged_destruction.store(1, Ordering::Release);
    }

    /// Returns `true` if [`Self::pledge_destruction`] has been called.
    #[must_use]
    pub fn is_pledged_for_destruction(&self) -> bool {
        self.pledged_destruction.load(Ordering::Acquire) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_state_none() {
        let t = Thread::new("t");
        assert_eq!(t.state(), ThreadState::None);
    }

    #[test]
    fn state_transitions_observed() {
        let t = Thread::new("t");
        t.set_state(ThreadState::Runnable);
        assert_eq!(t.state(), ThreadState::Runnable);
        t.set_state(ThreadState::Blocking);
        assert_eq!(t.state(), ThreadState::Blocking);
        t.set_state(ThreadState::Dead);
        assert_eq!(t.state(), ThreadState::Dead);
    }

    #[test]
    fn thread_ids_are_unique_and_increasing() {
        let a = Thread::new("a");
        let b = Thread::new("b");
        assert!(b.id().0 > a.id().0);
    }

    #[test]
    fn signal_pending_respects_mask() {
        let t = Thread::new("t");
        assert!(!t.has_deliverable_signal());
        t.signal_pending.store(1 << 5, Ordering::Relaxed);
        assert!(t.has_deliverable_signal());
        t.signal_mask.store(1 << 5, Ordering::Relaxed);
        assert!(!t.has_deliverable_signal());
    }

    #[test]
    fn pledge_destruction_is_observed() {
        let t = Thread::new("t");
        assert!(!t.is_pledged_for_destruction());
        t.pledge_destruction();
        assert!(t.is_pledged_for_destruction());
    }
}
