//! Marshals work onto the thread that owns the graphics device.
//!
//! Device-object creation APIs are typically not thread-safe. Rather than
//! locking the device itself, every device-touching call is funnelled through
//! one designated thread: background workers append callables to a
//! mutex-protected FIFO, and the owning thread drains it once per frame before
//! rendering. The cost is one frame of latency between "decoded" and "visible";
//! the gain is that command-recording state stays single-threaded.
//!
//! The queue is bound to the thread that created it. Draining from any other
//! thread is a programming error and fails loudly, since silently running
//! device work elsewhere risks corrupting device state.
//!
//! On shutdown the owner should drain once more before dropping the queue;
//! entries still queued at drop are discarded unrun, which would leak any
//! partially-constructed device objects they were about to publish.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

type Task = Box<dyn FnOnce() + Send>;

/// A mutex-protected FIFO of pending callables that must run on the thread
/// which owns the graphics device.
pub struct DispatchQueue {
    owner: ThreadId,
    tasks: Mutex<VecDeque<Task>>,
}

impl DispatchQueue {
    /// Creates a queue bound to the calling thread, which becomes the dispatch
    /// thread for its whole lifetime.
    pub fn new() -> Self {
        DispatchQueue {
            owner: thread::current().id(),
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    /// Checks if the calling thread is the dispatch thread.
    #[inline]
    pub fn is_dispatch_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Mints the capability required for device-visible publication.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread but the dispatch thread; this is the
    /// fast-fail guard behind `Resource::upload`.
    pub fn token(&self) -> UploadToken {
        assert!(
            self.is_dispatch_thread(),
            "upload token requested off the dispatch thread."
        );

        UploadToken {
            _not_send: PhantomData,
        }
    }

    /// Runs `func` synchronously and immediately if the calling thread is the
    /// dispatch thread; otherwise appends it to the queue for the next drain
    /// and returns without executing it.
    pub fn run<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_dispatch_thread() {
            func();
        } else {
            self.tasks.lock().unwrap().push_back(Box::new(func));
        }
    }

    /// Pops and executes every entry present at the time of the call, in FIFO
    /// order, and returns how many ran. The lock is released between pop and
    /// execution of each entry, so entries are free to schedule further work
    /// onto the queue; work queued during the drain runs at the next one.
    ///
    /// # Panics
    ///
    /// Panics when called from any thread but the dispatch thread.
    pub fn drain(&self) -> usize {
        assert!(
            self.is_dispatch_thread(),
            "dispatch queue drained off the dispatch thread."
        );

        let pending = self.tasks.lock().unwrap().len();

        for _ in 0..pending {
            let task = self.tasks.lock().unwrap().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }

        pending
    }

    /// The number of callables waiting for the next drain.
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        DispatchQueue::new()
    }
}

/// Proof that the holder is running on the dispatch thread.
///
/// A token is deliberately neither `Send` nor `Sync` and can only be minted by
/// [`DispatchQueue::token`] on the dispatch thread, so an `upload`
/// implementation that demands one cannot be invoked from anywhere else.
pub struct UploadToken {
    _not_send: PhantomData<*const ()>,
}
