//! Clock and timer facility.
//!
//! Grounded on `original_source/kernel/timer.cpp`: a [`Clock`] owns a sorted
//! list of armed timers; [`Timer::set`] dequeues any previous arming, stores
//! the new expiry/interval, and re-registers. [`Clock::advance`] is the
//! equivalent of the original's per-tick timer-interrupt bottom half — it
//! pops every timer whose expiry has passed, fires it, and for periodic
//! timers re-arms at `expiry + interval`, bumping the overrun counter for
//! each whole interval that elapsed while the timer was not serviced (the
//! same overrun semantics `Timer::Set`/`GetInternal` implement there).

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};

use hadron_core::sync::SpinLock;

/// Nanosecond-precision point or duration in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimeSpec {
    /// Whole seconds.
    pub sec: i64,
    /// Nanoseconds, always in `0..1_000_000_000`.
    pub nsec: i64,
}

const NSEC_PER_SEC: i64 = 1_000_000_000;

impl TimeSpec {
    /// A zero duration / the epoch.
    pub const ZERO: TimeSpec = TimeSpec { sec: 0, nsec: 0 };

    /// Constructs a normalized `TimeSpec`.
    #[must_use]
    pub fn new(sec: i64, nsec: i64) -> Self {
        let mut s = sec + nsec.div_euclid(NSEC_PER_SEC);
        let mut n = nsec.rem_euclid(NSEC_PER_SEC);
        if n < 0 {
            n += NSEC_PER_SEC;
            s -= 1;
        }
        TimeSpec { sec: s, nsec: n }
    }

    /// `self + other`, normalized.
    #[must_use]
    pub fn add(self, other: TimeSpec) -> TimeSpec {
        TimeSpec::new(self.sec + other.sec, self.nsec + other.nsec)
    }

    /// `self - other`, normalized (may be negative).
    #[must_use]
    pub fn sub(self, other: TimeSpec) -> TimeSpec {
        TimeSpec::new(self.sec - other.sec, self.nsec - other.nsec)
    }

    /// `true` if this duration is zero (used for "timer disabled").
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.sec == 0 && self.nsec == 0
    }
}

/// Identifier for an armed timer within a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

impl TimerId {
    fn next() -> Self {
        TimerId(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Armed {
    id: TimerId,
    expiry: TimeSpec,
    interval: TimeSpec,
    overruns: u64,
}

struct ClockInner {
    now: TimeSpec,
    armed: VecDeque<Armed>,
}

/// An independent time source with its own armed-timer list.
///
/// `spec.md` §4.6 names distinct clocks (e.g. monotonic vs. realtime); each
/// gets its own `Clock` instance rather than sharing one global list, same
/// as the original's per-clock `Register`/`Cancel` pair.
pub struct Clock {
    inner: SpinLock<ClockInner>,
}

impl Clock {
    /// Creates a clock starting at `start`.
    #[must_use]
    pub fn new(start: TimeSpec) -> Self {
        Self {
            inner: SpinLock::new(ClockInner {
                now: start,
                armed: VecDeque::new(),
            }),
        }
    }

    /// Current time as last advanced.
    #[must_use]
    pub fn now(&self) -> TimeSpec {
        self.inner.lock().now
    }

    /// Arms a new one-shot or periodic timer and returns its id.
    ///
    /// `expiry` is absolute (relative to this clock's epoch); `interval`,
    /// if non-[`TimeSpec::ZERO`], causes the timer to re-arm itself after
    /// each fire.
    pub fn arm(&self, expiry: TimeSpec, interval: TimeSpec) -> TimerId {
        let id = TimerId::next();
        let mut inner = self.inner.lock();
        insert_sorted(&mut inner.armed, Armed {
            id,
            expiry,
            interval,
            overruns: 0,
        });
        id
    }

    /// Re-arms an existing timer (or arms it if not currently armed),
    /// mirroring `Timer::Set`'s dequeue-then-register sequence.
    pub fn set(&self, id: TimerId, expiry: TimeSpec, interval: TimeSpec) {
        let mut inner = self.inner.lock();
        inner.armed.retain(|t| t.id != id);
        if !expiry.is_zero() {
            insert_sorted(&mut inner.armed, Armed {
                id,
                expiry,
                interval,
                overruns: 0,
            });
        }
    }

    /// Cancels a timer; no-op if it isn't armed.
    pub fn cancel(&self, id: TimerId) {
        self.inner.lock().armed.retain(|t| t.id != id);
    }

    /// Returns the remaining time and interval for an armed timer.
    #[must_use]
    pub fn get(&self, id: TimerId) -> Option<(TimeSpec, TimeSpec)> {
        let inner = self.inner.lock();
        inner.armed.iter().find(|t| t.id == id).map(|t| {
            let remaining = t.expiry.sub(inner.now);
            (remaining, t.interval)
        })
    }

    /// Returns and resets the overrun count for a timer — the number of
    /// additional intervals that elapsed between fires without being
    /// serviced, per `Timer::GetOverrunCount` in the original.
    #[must_use]
    pub fn take_overruns(&self, id: TimerId) -> u64 {
        let mut inner = self.inner.lock();
        if let Some(t) = inner.armed.iter_mut().find(|t| t.id == id) {
            core::mem::take(&mut t.overruns)
        } else {
            0
        }
    }

    /// Advances the clock to `now`, firing and re-arming any timers whose
    /// expiry has passed. Returns the ids that fired, in expiry order.
    pub fn advance(&self, now: TimeSpec) -> alloc::vec::Vec<TimerId> {
        let mut fired = alloc::vec::Vec::new();
        let mut inner = self.inner.lock();
        inner.now = now;

        loop {
            let Some(front) = inner.armed.front() else {
                break;
            };
            if front.expiry > now {
                break;
            }
            let mut timer = inner.armed.pop_front().unwrap();
            fired.push(timer.id);

            if !timer.interval.is_zero() {
                // Count whole extra intervals missed while unserviced.
                let mut next = timer.expiry.add(timer.interval);
                while next <= now {
                    timer.overruns += 1;
                    next = next.add(timer.interval);
                }
                timer.expiry = next;
                insert_sorted(&mut inner.armed, timer);
            }
        }
        fired
    }
}

fn insert_sorted(queue: &mut VecDeque<Armed>, timer: Armed) {
    let pos = queue.iter().position(|t| t.expiry > timer.expiry).unwrap_or(queue.len());
    queue.insert(pos, timer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_normalizes_overflow_nsec() {
        let t = TimeSpec::new(1, NSEC_PER_SEC + 500);
        assert_eq!(t, TimeSpec::new(2, 500));
    }

    #[test]
    fn arm_and_advance_fires_one_shot() {
        let clock = Clock::new(TimeSpec::ZERO);
        let id = clock.arm(TimeSpec::new(5, 0), TimeSpec::ZERO);
        assert!(clock.advance(TimeSpec::new(4, 0)).is_empty());
        let fired = clock.advance(TimeSpec::new(5, 0));
        assert_eq!(fired, alloc::vec![id]);
        // One-shot: gone after firing.
        assert!(clock.get(id).is_none());
    }

    #[test]
    fn periodic_timer_rearms() {
        let clock = Clock::new(TimeSpec::ZERO);
        let id = clock.arm(TimeSpec::new(1, 0), TimeSpec::new(1, 0));
        assert_eq!(clock.advance(TimeSpec::new(1, 0)), alloc::vec![id]);
        let (remaining, interval) = clock.get(id).unwrap();
        assert_eq!(interval, TimeSpec::new(1, 0));
        assert_eq!(remaining, TimeSpec::new(1, 0));
    }

    #[test]
    fn overrun_counted_when_missed() {
        let clock = Clock::new(TimeSpec::ZERO);
        let id = clock.arm(TimeSpec::new(1, 0), TimeSpec::new(1, 0));
        // Jump straight to t=3.5s: the 1s, 2s, and 3s fires were all missed
        // except the last — two overruns.
        let fired = clock.advance(TimeSpec::new(3, 500_000_000));
        assert_eq!(fired, alloc::vec![id]);
        assert_eq!(clock.take_overruns(id), 2);
    }

    #[test]
    fn cancel_removes_armed_timer() {
        let clock = Clock::new(TimeSpec::ZERO);
        let id = clock.arm(TimeSpec::new(1, 0), TimeSpec::ZERO);
        clock.cancel(id);
        assert!(clock.advance(TimeSpec::new(2, 0)).is_empty());
    }

    #[test]
    fn set_rearms_existing_timer() {
        let clock = Clock::new(TimeSpec::ZERO);
        let id = clock.arm(TimeSpec::new(1, 0), TimeSpec::ZERO);
        clock.set(id, TimeSpec::new(10, 0), TimeSpec::ZERO);
        assert!(clock.advance(TimeSpec::new(1, 0)).is_empty());
        assert_eq!(clock.advance(TimeSpec::new(10, 0)), alloc::vec![id]);
    }

    #[test]
    fn multiple_timers_fire_in_expiry_order() {
        let clock = Clock::new(TimeSpec::ZERO);
        let late = clock.arm(TimeSpec::new(5, 0), TimeSpec::ZERO);
        let early = clock.arm(TimeSpec::new(1, 0), TimeSpec::ZERO);
        let fired = clock.advance(TimeSpec::new(5, 0));
        assert_eq!(fired, alloc::vec![early, late]);
    }
}
