//! A fixed-size pool of background worker threads with fault isolation.
//!
//! The pool accepts arbitrary fire-and-forget jobs. Jobs may complete in any
//! order - ordering guarantees belong to the dispatch queue, not here. Each job
//! body runs inside a fault boundary: a panic is caught at the job boundary,
//! handed to the panic handler (which logs it by default) and never unwinds the
//! worker thread, so one bad job cannot take the pool down or vanish silently.

pub mod latch;

mod pool;
mod unwind;

use std::sync::Arc;

use self::pool::Pool;

pub mod prelude {
    pub use super::latch::{CountLatch, Latch, LockLatch};
    pub use super::{JobSystem, JobSystemShared, PanicHandler, SchedParams};
}

/// The type for a panic handling closure. Note that this same closure may be
/// invoked multiple times in parallel.
pub type PanicHandler = dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync;

/// Construction parameters of the job pool.
#[derive(Debug, Clone, Copy)]
pub struct SchedParams {
    /// The number of worker threads. Zero derives the count from hardware
    /// concurrency, with a minimum of one.
    pub workers: u32,
    /// The stack size of worker threads, if the platform default is not enough.
    pub stack_size: Option<usize>,
}

impl Default for SchedParams {
    fn default() -> Self {
        SchedParams {
            workers: 0,
            stack_size: None,
        }
    }
}

/// The owning half of the job pool. Keep it alive for as long as jobs might be
/// spawned; `terminate` (also called on drop) stops intake, drains what was
/// already queued and joins the workers.
pub struct JobSystem {
    shared: Arc<JobSystemShared>,
}

impl JobSystem {
    pub fn new(params: SchedParams, panic_handler: Option<Box<PanicHandler>>) -> Self {
        let num = if params.workers > 0 {
            params.workers
        } else {
            std::thread::available_parallelism()
                .map(|v| v.get() as u32)
                .unwrap_or(1)
                .max(1)
        };

        JobSystem {
            shared: Arc::new(JobSystemShared {
                pool: Some(Pool::new(num, params.stack_size, panic_handler)),
            }),
        }
    }

    /// Creates a pool-less system that runs every job inline on the calling
    /// thread. Useful for tools and deterministic tests.
    pub fn headless() -> Self {
        JobSystem {
            shared: Arc::new(JobSystemShared { pool: None }),
        }
    }

    /// Returns the multi-thread friendly parts of `JobSystem`.
    pub fn shared(&self) -> Arc<JobSystemShared> {
        self.shared.clone()
    }

    /// Stops accepting new work and blocks until the workers have drained the
    /// queue and exited gracefully.
    pub fn terminate(&self) {
        if let Some(ref pool) = self.shared.pool {
            pool.terminate();
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub struct JobSystemShared {
    pool: Option<Arc<Pool>>,
}

impl JobSystemShared {
    /// Spawns a fire-and-forget job.
    ///
    /// In headless mode the job runs inline before `spawn` returns. Otherwise it
    /// is queued for the workers; a panic inside it is caught at the job
    /// boundary and routed to the pool's panic handler.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(ref pool) = self.pool {
            let job = Box::new({
                let pool = pool.clone();
                move || {
                    match unwind::halt_unwinding(func) {
                        Ok(()) => {}
                        Err(err) => pool.handle_panic(err),
                    }

                    pool.job_finished();
                }
            });

            if !pool.inject(job) {
                warn!("[JobSystem] discarding job spawned after termination.");
            }
        } else {
            func();
        }
    }

    /// Checks if jobs actually run on background workers.
    #[inline]
    pub fn is_headless(&self) -> bool {
        self.pool.is_none()
    }
}
