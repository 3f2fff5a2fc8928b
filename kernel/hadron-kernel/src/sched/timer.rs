//! Sleep timer wiring between [`hadron_sched::Clock`] and the scheduler.
//!
//! `Clock` only tracks expiry and fires `TimerId`s; it has no notion of
//! what to wake (`hadron-sched` doesn't depend on the scheduler or thread
//! ownership). This module keeps the side table from `TimerId` to the
//! sleeping [`Thread`] and drives the clock from the LAPIC timer tick,
//! mirroring `original_source/kernel/timer.cpp`'s tick bottom half with
//! [`Scheduler::wake`] standing in for the original's thread-queue push.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use hadron_core::sync::{IrqSpinLock, LazyLock};

use super::{Clock, Scheduler, Thread, TimeSpec, TimerId};

static CLOCK: LazyLock<Clock> = LazyLock::new(|| Clock::new(TimeSpec::ZERO));
static SLEEPERS: IrqSpinLock<BTreeMap<TimerId, Arc<Thread>>> = IrqSpinLock::new(BTreeMap::new());

/// Returns the monotonic clock backing sleep and timer syscalls.
pub fn clock() -> &'static Clock {
    &CLOCK
}

/// Arms a one-shot timer that wakes `thread` once `expiry` (boot-relative)
/// has passed. Returns the armed timer's id, e.g. for cancellation.
pub fn arm_sleep(thread: Arc<Thread>, expiry: TimeSpec) -> TimerId {
    let id = CLOCK.arm(expiry, TimeSpec::ZERO);
    SLEEPERS.lock().insert(id, thread);
    id
}

/// Advances the clock to the current boot time and wakes every thread whose
/// timer has fired. Called from the timer interrupt handler on every tick.
pub fn advance_and_wake(sched: &Scheduler) {
    let now = TimeSpec::new(0, crate::time::Time::boot_nanos() as i64);
    let fired = CLOCK.advance(now);
    if fired.is_empty() {
        return;
    }
    let mut sleepers = SLEEPERS.lock();
    for id in fired {
        if let Some(thread) = sleepers.remove(&id) {
            sched.wake(&thread);
        }
    }
}
