//! Kernel thread scheduler.
//!
//! Core scheduler policy (run queue, thread bookkeeping, blocking
//! primitives, clock) lives in the `hadron-sched` crate for host
//! testability. This module wires it to the kernel: an x86_64
//! [`hadron_sched::ArchContextSwitch`] implementation ([`context`]), the
//! single global [`hadron_sched::Scheduler`] instance, and the pieces that
//! genuinely need kernel services (sleep timers, the preemption flag, the
//! `block_on` spin-poll used before any thread exists).

extern crate alloc;

use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use hadron_core::sync::{IrqSpinLock, LazyLock};
pub use hadron_sched::{
    ArchContextSwitch, Clock, Interrupted, KCondVar, KMutex, KMutexGuard, KMutexKind,
    NullContextSwitch, Scheduler, Thread, ThreadId, ThreadState, TimeSpec, TimerId,
    WaitSignalResult, Worker, WorkerJob, drain_loop,
};

pub mod block_on;
pub mod context;
pub mod primitives;
pub mod timer;

static SCHEDULER: LazyLock<Scheduler> = LazyLock::new(|| {
    #[cfg(target_arch = "x86_64")]
    static ARCH: context::X86ContextSwitch = context::X86ContextSwitch;

    let idle = Arc::new(Thread::new("idle"));
    Scheduler::new(idle, &ARCH)
});

/// Returns the single, single-CPU scheduler instance.
///
/// `spec.md` §2 pins `MAX_CPUS = 1`; there is exactly one run queue for the
/// lifetime of the kernel.
#[inline]
pub fn global() -> &'static Scheduler {
    &SCHEDULER
}

type Starter = Box<dyn FnOnce() + Send>;

static STARTERS: IrqSpinLock<BTreeMap<ThreadId, Starter>> = IrqSpinLock::new(BTreeMap::new());

/// Creates and admits a new kernel thread that runs `f` to completion and
/// then exits.
///
/// Standing in for the teacher's `spawn_background`/`spawn`, which handed a
/// `Future` to the per-CPU executor: there is no executor here, so `f` runs
/// to completion on a thread of its own rather than being polled piecemeal.
pub fn spawn(name: &'static str, f: impl FnOnce() + Send + 'static) -> Arc<Thread> {
    let thread = Arc::new(Thread::new(name));
    STARTERS.lock().insert(thread.id(), Box::new(f));
    context::register_thread(&thread, thread_trampoline);
    global().spawn(thread.clone());
    thread
}

/// Creates and admits a new kernel thread that drives `future` to
/// completion via [`block_on::block_on`].
///
/// Direct replacement for the teacher's `spawn_background(name, future)`
/// call sites, which handed the future to the async executor.
pub fn spawn_future(
    name: &'static str,
    future: impl Future<Output = ()> + Send + 'static,
) -> Arc<Thread> {
    spawn(name, move || block_on::block_on(future))
}

/// Common entry point for every thread started through [`spawn`]/
/// [`spawn_future`]. Looks up and runs the closure stashed for the current
/// thread, then exits.
extern "C" fn thread_trampoline() -> ! {
    let id = global().current().id();
    let f = STARTERS
        .lock()
        .remove(&id)
        .unwrap_or_else(|| panic!("hadron-sched: thread {id:?} started with no registered entry"));
    f();
    global().exit_thread()
}

/// Voluntary preemption point, standing in for the original's `int $129`
/// (`SPEC_FULL.md` §4.2).
pub fn yield_now() {
    global().yield_now();
}

// ── Preemption flag ──────────────────────────────────────────────────
//
// Set by the timer interrupt handler, consulted at the next convenient
// preemption point. This kernel does not preempt mid-instruction; setting
// this flag is how the interrupt-return path or a polling loop learns that
// a yield is due.

static PREEMPT_PENDING: AtomicBool = AtomicBool::new(false);

/// Returns whether a preemption has been requested since the last clear.
pub fn preempt_pending() -> bool {
    PREEMPT_PENDING.load(Ordering::Acquire)
}

/// Requests a preemption at the next convenient point. Called from the
/// timer interrupt handler.
pub fn set_preempt_pending() {
    PREEMPT_PENDING.store(true, Ordering::Release);
}

/// Clears a pending preemption request after acting on it.
pub fn clear_preempt_pending() {
    PREEMPT_PENDING.store(false, Ordering::Release);
}
