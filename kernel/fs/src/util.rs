//! Helper for driving an [`Inode`](crate::Inode) future that this kernel
//! knows will never actually suspend.
//!
//! Every `Inode` method that touches backing storage is async so a block
//! cache miss can await without blocking a whole kernel thread. But some
//! call sites (path resolution while holding the VFS mount-table lock) are
//! not themselves async and need the result immediately. Those futures
//! only ever pend on a cache miss resolving synchronously within the same
//! poll (see `bcache::BlockCache::read`), so polling once with a no-op
//! waker is sufficient; if it ever returns `Pending` that's a bug in the
//! backend, not a case this helper needs to handle by looping.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

fn noop_clone(_: *const ()) -> RawWaker {
    noop_raw_waker()
}
fn noop(_: *const ()) {}

fn noop_raw_waker() -> RawWaker {
    static VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop, noop, noop);
    RawWaker::new(core::ptr::null(), &VTABLE)
}

/// Polls `future` exactly once and panics if it's not immediately ready.
///
/// # Panics
///
/// Panics if `future` returns [`Poll::Pending`] — every caller of this
/// helper only awaits futures documented to resolve on the first poll.
pub fn poll_immediate<F: Future>(future: F) -> F::Output {
    match try_poll_immediate(future) {
        Some(value) => value,
        None => panic!("poll_immediate: future was not immediately ready"),
    }
}

/// Polls `future` exactly once, returning `None` instead of panicking on
/// [`Poll::Pending`].
///
/// Unlike [`poll_immediate`], this is for call sites that genuinely expect
/// "would block" as a real outcome — a syscall-path read/write against a
/// pipe or socket inode that has no data ready yet, where the caller needs
/// to park the calling thread rather than treat pending as a bug.
pub fn try_poll_immediate<F: Future>(future: F) -> Option<F::Output> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut future = core::pin::pin!(future);
    match Pin::new(&mut future).poll(&mut cx) {
        Poll::Ready(value) => Some(value),
        Poll::Pending => None,
    }
}

/// A [`Waker`] that does nothing when woken.
///
/// Used to poll a future once without registering real wakeup interest —
/// either because the future is known to resolve on first poll
/// ([`poll_immediate`]), or because the caller re-polls from a different
/// trigger (a thread parked on a [`WaitQueue`](hadron_core::sync::WaitQueue)
/// being woken directly) rather than through the waker mechanism.
pub fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediately_ready_future_returns_value() {
        let value = poll_immediate(async { 42 });
        assert_eq!(value, 42);
    }

    #[test]
    #[should_panic]
    fn pending_future_panics() {
        let _ = poll_immediate(core::future::pending::<()>());
    }

    #[test]
    fn try_poll_immediate_returns_some_when_ready() {
        assert_eq!(try_poll_immediate(async { 7 }), Some(7));
    }

    #[test]
    fn try_poll_immediate_returns_none_when_pending() {
        assert_eq!(try_poll_immediate(core::future::pending::<()>()), None);
    }
}
