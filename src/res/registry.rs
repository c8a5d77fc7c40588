//! The ordered registry of format handlers.
//!
//! Handlers are consulted in registration order and the first one that claims
//! an extension wins. An ordered scan instead of an extension-keyed map lets
//! several loaders claim overlapping extensions with priority, and leaves room
//! for a loader to reject a file at finer granularity than its extension
//! (magic-byte sniffing) without changing this contract.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use smallvec::SmallVec;

use super::resource::Resource;

/// A format handler: a pair of predicates over file extensions plus a factory
/// for empty resource placeholders of that format.
pub trait Loader: Send + Sync + 'static {
    /// Checks if this loader claims files with extension `ext` (lower-cased,
    /// without the leading dot).
    fn can_load(&self, ext: &str) -> bool;

    /// Checks whether an in-memory buffer of this format can be decoded
    /// directly. Formats that stream from disk (video, long music) require real
    /// path semantics and return false.
    fn supports_buffer(&self, ext: &str) -> bool {
        let _ = ext;
        true
    }

    /// Creates an empty placeholder entry for this format.
    fn create_entry(&self) -> Box<dyn Resource>;

    /// Built-in placeholder bytes substituted when a decode fails, if this
    /// format has a visibly-distinct "missing" asset.
    fn fallback(&self) -> Option<&[u8]> {
        None
    }

    /// The bookkeeping log of every path this loader has been asked to load.
    fn preload(&self) -> &PreloadList;
}

/// A log of the `(path, flags)` pairs handed to a loader, kept for
/// introspection and tests.
#[derive(Default)]
pub struct PreloadList {
    entries: Mutex<Vec<(PathBuf, u32)>>,
}

impl PreloadList {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn push(&self, path: &Path, flags: u32) {
        self.entries.lock().unwrap().push((path.to_path_buf(), flags));
    }

    /// The number of load requests this loader has seen.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times `path` was handed to this loader. Deduplication makes
    /// this at most one for any path actually routed through the manager.
    pub fn count(&self, path: &Path) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| v == path)
            .count()
    }

    /// A snapshot of the recorded `(path, flags)` pairs.
    pub fn entries(&self) -> Vec<(PathBuf, u32)> {
        self.entries.lock().unwrap().clone()
    }
}

/// The ordered sequence of registered loaders; first match wins.
#[derive(Default)]
pub struct Registry {
    loaders: SmallVec<[Box<dyn Loader>; 8]>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a format handler. Handlers registered earlier take priority on
    /// overlapping extensions.
    pub fn add<T: Loader>(&mut self, loader: T) {
        self.loaders.push(Box::new(loader));
    }

    /// Returns the first registered loader that claims `ext`, if any.
    pub fn find(&self, ext: &str) -> Option<&dyn Loader> {
        self.loaders
            .iter()
            .map(|v| v.as_ref())
            .find(|v| v.can_load(ext))
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}
