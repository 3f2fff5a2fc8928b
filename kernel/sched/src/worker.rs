//! Deferred-work queue.
//!
//! Grounded on `original_source/kernel/worker.cpp`: a single FIFO queue of
//! jobs, drained by one or more dedicated kernel threads blocked in
//! [`Worker::next_job`]. `spec.md` §4.3's `Interrupt::ScheduleWork` is the
//! producer side — interrupt handlers cannot block, so scheduling a job
//! from interrupt context must never wait; it only needs to enqueue and
//! wake a worker thread.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;

use hadron_core::sync::SpinLock;

use crate::cond::KCondVar;
use crate::mutex::KMutex;
use crate::runqueue::Scheduler;

/// A unit of deferred work.
pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<WorkerJob>,
}

/// A pool of worker kernel threads draining a single deferred-work queue.
///
/// Unlike the mutex/condvar pair it's built from, `Worker` owns both halves:
/// producers call [`Self::schedule`]/[`Self::try_schedule`], consumer
/// threads call [`Self::next_job`] in a loop and run whatever it returns.
pub struct Worker {
    queue: KMutex<Queue>,
    not_empty: KCondVar,
}

impl Worker {
    /// Creates an empty worker queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: KMutex::new_normal(Queue {
                jobs: VecDeque::new(),
            }),
            not_empty: KCondVar::new(),
        }
    }

    /// Enqueues a job, blocking the caller only for the brief duration of
    /// acquiring the queue lock (never for the job to run).
    ///
    /// Safe to call from ordinary kernel thread context. Not safe to call
    /// from an interrupt handler — use [`Self::try_schedule`] there.
    pub fn schedule(&self, sched: &Scheduler, job: WorkerJob) {
        let mut queue = self.queue.lock(sched);
        queue.jobs.push_back(job);
        drop(queue);
        self.not_empty.signal(sched);
    }

    /// Enqueues a job without ever blocking.
    ///
    /// Intended for interrupt context: if the queue's lock is currently held
    /// by a kernel thread, the job is dropped rather than risking a block
    /// inside an interrupt handler. Returns `false` if the job was dropped.
    pub fn try_schedule(&self, sched: &Scheduler, job: WorkerJob) -> bool {
        match self.queue.try_lock(sched) {
            Some(mut queue) => {
                queue.jobs.push_back(job);
                drop(queue);
                self.not_empty.signal(sched);
                true
            }
            None => false,
        }
    }

    /// Blocks until a job is available, then returns it for the caller to
    /// run. Intended to be called in a loop by dedicated worker threads.
    pub fn next_job(&self, sched: &Scheduler) -> WorkerJob {
        let mut queue = self.queue.lock(sched);
        loop {
            if let Some(job) = queue.jobs.pop_front() {
                return job;
            }
            queue = self.not_empty.wait(sched, queue);
        }
    }

    /// Number of jobs currently queued (diagnostics / tests).
    #[must_use]
    pub fn pending(&self, sched: &Scheduler) -> usize {
        self.queue.lock(sched).jobs.len()
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a dedicated kernel thread draining `worker` forever.
///
/// Grounded on the original's pattern of a small fixed pool of worker
/// threads rather than one thread per job (`kernel/worker.cpp` runs jobs on
/// threads created once at boot). Thread creation itself is owned by
/// `hadron-kernel`'s process/thread table (`spec.md` §4.2/§4.3), so this
/// crate only exposes the drain loop body as a plain function for that code
/// to hand to a new [`crate::Thread`].
pub fn drain_loop(worker: Arc<Worker>, sched: Arc<Scheduler>) {
    loop {
        let job = worker.next_job(&sched);
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runqueue::NullContextSwitch;
    use crate::thread::Thread;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn sched() -> Scheduler {
        static ARCH: NullContextSwitch = NullContextSwitch;
        let idle = Arc::new(Thread::new("idle"));
        Scheduler::new(idle, &ARCH)
    }

    #[test]
    fn schedule_then_next_job_runs_it() {
        let s = sched();
        let worker = Worker::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        worker.schedule(&s, Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(worker.pending(&s), 1);

        // In this single-threaded host test there is no separate drain
        // thread; pull the job directly from the queue to avoid blocking
        // forever in `next_job` with nothing left to wake us.
        let mut queue = worker.queue.lock(&s);
        let job = queue.jobs.pop_front().unwrap();
        drop(queue);
        job();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn try_schedule_succeeds_when_uncontended() {
        let s = sched();
        let worker = Worker::new();
        assert!(worker.try_schedule(&s, Box::new(|| {})));
        assert_eq!(worker.pending(&s), 1);
    }
}
