//! Unbounded wait queue for waiters whose count isn't known ahead of time.
//!
//! [`hadron_core::sync::WaitQueue`] caps waiters at a fixed capacity, which
//! is right for interrupt-line queues but wrong for [`Process::exit_notify`]
//! (`crate::proc::Process`): an arbitrary number of children can be waited
//! on by an arbitrary number of parents. This is the same queue with a
//! heap-backed `Vec` instead of an `ArrayVec`.

extern crate alloc;

use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use hadron_core::sync::SpinLock;

/// A queue of [`Waker`]s with no fixed capacity.
pub struct HeapWaitQueue {
    waiters: SpinLock<Vec<Waker>>,
}

impl HeapWaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self { waiters: SpinLock::new(Vec::new()) }
    }

    /// Returns a future that completes the next time this queue is woken.
    pub fn wait(&self) -> HeapWaitFuture<'_> {
        HeapWaitFuture { queue: self, registered: false }
    }

    /// Wakes every waiting task.
    pub fn wake_all(&self) {
        let mut waiters = self.waiters.lock();
        let woken: Vec<Waker> = waiters.drain(..).collect();
        drop(waiters);
        for waker in woken {
            waker.wake();
        }
    }
}

impl Default for HeapWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`HeapWaitQueue::wait`].
pub struct HeapWaitFuture<'a> {
    queue: &'a HeapWaitQueue,
    registered: bool,
}

impl Future for HeapWaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            Poll::Ready(())
        } else {
            self.registered = true;
            self.queue.waiters.lock().push(cx.waker().clone());
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::{counting_waker, noop_waker};
    use core::sync::atomic::Ordering;

    #[test]
    fn wake_all_wakes_every_registered_waiter() {
        let wq = HeapWaitQueue::new();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let mut cx1 = Context::from_waker(&w1);
        let mut cx2 = Context::from_waker(&w2);

        let mut f1 = wq.wait();
        let mut f2 = wq.wait();
        assert!(matches!(Pin::new(&mut f1).poll(&mut cx1), Poll::Pending));
        assert!(matches!(Pin::new(&mut f2).poll(&mut cx2), Poll::Pending));

        wq.wake_all();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert!(c2.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn wake_all_on_empty_queue_does_not_panic() {
        let wq = HeapWaitQueue::new();
        wq.wake_all();
    }

    #[test]
    fn second_poll_after_wake_completes() {
        let wq = HeapWaitQueue::new();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = wq.wait();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
        wq.wake_all();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(())));
    }
}
