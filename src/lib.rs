//! Charcoal is a small framework for getting game assets from disk into a
//! running frame loop without stalling it.
//!
//! # Overview
//!
//! Assets are decoded on background threads, but most graphics device APIs only
//! tolerate mutation from the single thread that owns the device. Charcoal
//! splits every load into the two phases this forces:
//!
//! 1. `load` - reads and decodes raw bytes. Runs on a worker of the [`sched`]
//! job pool and never touches the device.
//! 2. `upload` - publishes the decoded payload to the device. Runs on the
//! dispatch thread only, when the [`dispatch`] queue is drained once per frame.
//!
//! The [`res`] module ties the phases together: it deduplicates requests by
//! normalized path, keeps per-asset lifecycle state, and hands completed
//! decodes across the thread boundary. A failing asset is contained to itself -
//! a panic inside a job is caught and logged by the pool, and formats with a
//! built-in placeholder fall back to it instead of staying broken.
//!
//! # Systems
//!
//! Systems are explicit instances wired together at startup, not globals. A
//! typical embedding creates them once on the thread that owns the device:
//!
//! ```ignore
//! let sched = JobSystem::new(Default::default(), None);
//! let dispatch = Arc::new(DispatchQueue::new());
//! let res = ResourceSystem::new(sched.shared(), dispatch.clone());
//!
//! res.shared().pre_load_folder("content");
//! loop {
//!     dispatch.drain(); // once per frame, before rendering
//!     // update / draw ...
//! }
//! ```

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

pub mod errors;
pub mod utils;

pub mod dispatch;
pub mod res;
pub mod sched;

pub mod prelude;
