//! Blocking sleep primitives.
//!
//! Arms a one-shot timer for the calling thread and blocks it, rather than
//! the teacher's `Future`-polling `sleep_ticks`/`sleep_ms` — the blocking
//! scheduler model has no executor to re-poll a pending future against.

use super::TimeSpec;

/// Blocks the calling thread for at least `ticks` timer ticks (1 tick = 1ms,
/// matching the teacher's `1kHz` tick rate).
pub fn sleep_ticks(ticks: u64) {
    sleep_ms(ticks);
}

/// Blocks the calling thread for at least `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    let sched = super::global();
    let current = sched.current();

    let now = TimeSpec::new(0, crate::time::Time::boot_nanos() as i64);
    let expiry = now.add(TimeSpec::new(0, ms as i64 * 1_000_000));

    super::timer::arm_sleep(current, expiry);
    sched.block_current();
}
