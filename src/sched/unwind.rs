use std::any::Any;
use std::io;
use std::io::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread;

/// Executes `f` and captures any panic, translating that panic into an `Err`
/// result. The panic stays on this side of the thread boundary, so `f` can be
/// treated as exception safe.
pub fn halt_unwinding<F, R>(func: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}

pub struct AbortIfPanic;

impl Drop for AbortIfPanic {
    fn drop(&mut self) {
        let _ = writeln!(&mut io::stderr(), "detected unexpected panic; aborting");
        process::abort();
    }
}

/// Formats a panic payload for logging. Payloads are almost always `&str` or
/// `String`; anything else is opaque.
pub fn payload_message(err: &(dyn Any + Send)) -> &str {
    if let Some(v) = err.downcast_ref::<&str>() {
        *v
    } else if let Some(v) = err.downcast_ref::<String>() {
        v.as_str()
    } else {
        "Box<Any>"
    }
}
