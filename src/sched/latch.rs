use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// A latch is a primitive signalling mechanism. It starts unset, and eventually
/// someone calls `set()`. Observers test it with `is_set()`.
pub trait Latch {
    /// Set the latch, signalling others.
    fn set(&self);
    /// Test if the latch is set.
    fn is_set(&self) -> bool;
}

/// A latch carrying a value. Blocks the waiting thread on a condvar until the
/// value arrives.
pub struct LockLatch<T> {
    m: Mutex<Option<T>>,
    v: Condvar,
}

impl<T> LockLatch<T> {
    pub fn new() -> Self {
        LockLatch {
            m: Mutex::new(None),
            v: Condvar::new(),
        }
    }

    /// Sets the value, releasing all threads who are waiting.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.m.lock().unwrap();
            *guard = Some(value);
        }

        self.v.notify_all();
    }

    /// Blocks until the value is set, then takes it.
    pub fn take(&self) -> T {
        let mut guard = self.m.lock().unwrap();
        loop {
            match guard.take() {
                Some(v) => return v,
                None => guard = self.v.wait(guard).unwrap(),
            }
        }
    }

    /// Blocks until the value is set, leaving it in place.
    pub fn wait(&self) {
        let mut guard = self.m.lock().unwrap();
        while guard.is_none() {
            guard = self.v.wait(guard).unwrap();
        }
    }

    pub fn is_set(&self) -> bool {
        self.m.lock().unwrap().is_some()
    }
}

impl<T> Default for LockLatch<T> {
    fn default() -> Self {
        LockLatch::new()
    }
}

/// Counting latches track a counter. Calling `set()` decrements it, and the
/// latch only reads as set once the counter reaches zero.
#[derive(Debug)]
pub struct CountLatch {
    counter: AtomicUsize,
}

impl CountLatch {
    #[inline]
    pub fn new() -> CountLatch {
        CountLatch {
            counter: AtomicUsize::new(1),
        }
    }

    #[inline]
    pub fn increment(&self) {
        debug_assert!(!self.is_set());
        self.counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Latch for CountLatch {
    #[inline]
    fn is_set(&self) -> bool {
        // Need to acquire any memory reads before latch was set:
        self.counter.load(Ordering::SeqCst) == 0
    }

    #[inline]
    fn set(&self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
