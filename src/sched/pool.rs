use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::{mem, thread};

use crossbeam_deque as deque;

use super::latch::{CountLatch, Latch};
use super::unwind::{self, AbortIfPanic};
use super::PanicHandler;

type Job = Box<dyn FnOnce() + Send>;

/// The shared state of a fixed-size worker pool. Jobs are injected into a
/// single queue and taken by whatever worker has nothing to do; there is no
/// ordering guarantee across jobs.
pub struct Pool {
    terminator: CountLatch,
    closed: AtomicBool,
    watcher: Watcher,

    stealer: deque::Stealer<Job>,
    injector: Mutex<deque::Worker<Job>>,

    joins: Mutex<Vec<thread::JoinHandle<()>>>,
    panic_handler: Option<Box<PanicHandler>>,
}

impl Pool {
    pub fn new(
        num: u32,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
    ) -> Arc<Self> {
        debug_assert!(num > 0, "a pool must have at least one worker.");

        let w = deque::Worker::new_fifo();
        let s = w.stealer();

        let pool = Arc::new(Pool {
            terminator: CountLatch::new(),
            closed: AtomicBool::new(false),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
            stealer: s,
            injector: Mutex::new(w),
            joins: Mutex::new(Vec::new()),
            panic_handler,
        });

        let mut joins = pool.joins.lock().unwrap();
        for i in 0..num {
            let pool = pool.clone();
            let mut b = thread::Builder::new().name(format!("charcoal-worker-{}", i));

            if let Some(stack_size) = stack_size {
                b = b.stack_size(stack_size);
            }

            joins.push(b.spawn(move || Pool::main_loop(pool)).unwrap());
        }
        drop(joins);

        pool
    }

    /// Pushes a job into the shared queue. Returns false once the pool has been
    /// terminated - the job is dropped in that case.
    ///
    /// The closed flag is checked under the injector lock so that `terminate`
    /// observes either a fully injected job (and drains it) or none at all.
    pub fn inject(&self, job: Job) -> bool {
        {
            let injector = self.injector.lock().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }

            // Ensure the pool cannot terminate until this job has executed; the
            // matching `set` happens at the end of the job wrapper in `spawn`.
            self.terminator.increment();
            injector.push(job);
        }

        self.watcher.notify_one();
        true
    }

    #[inline]
    pub fn job_finished(&self) {
        self.terminator.set();
        self.watcher.notify_all();
    }

    /// Takes a single job off the shared queue, retrying around contention.
    fn steal(&self) -> Option<Job> {
        loop {
            match self.stealer.steal() {
                deque::Steal::Success(job) => return Some(job),
                deque::Steal::Empty => return None,
                deque::Steal::Retry => {}
            }
        }
    }

    /// Handles a panic captured inside a job.
    pub fn handle_panic(&self, err: Box<dyn std::any::Any + Send>) {
        match self.panic_handler {
            Some(ref handler) => {
                // If the customizable panic handler itself panics, then we abort.
                let abort_guard = AbortIfPanic;
                handler(err);
                mem::forget(abort_guard);
            }
            None => {
                error!("[Pool] job panicked: {}.", unwind::payload_message(&*err));
            }
        }
    }

    /// Stops accepting new work, drains every job already queued, and joins the
    /// workers. Idempotent.
    pub fn terminate(&self) {
        {
            let _injector = self.injector.lock().unwrap();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        self.terminator.set();
        self.watcher.notify_all();

        let joins = mem::replace(&mut *self.joins.lock().unwrap(), Vec::new());
        for v in joins {
            let _ = v.join();
        }
    }

    fn main_loop(pool: Arc<Pool>) {
        let mut ms = 1;

        loop {
            if let Some(job) = pool.steal() {
                job();
                ms = 1;
            } else if pool.terminator.is_set() {
                // Terminated and nothing left to drain.
                break;
            } else {
                pool.watcher.wait_timeout(ms);
                ms = (ms * 2).min(48);
            }
        }
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let duration = ::std::time::Duration::from_millis(ms);
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, duration);
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}
