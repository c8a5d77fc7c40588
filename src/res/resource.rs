use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use inlinable_string::InlinableString;

use crate::dispatch::UploadToken;
use crate::errors::Result;

/// The lifecycle of a loadable resource.
///
/// Transitions run forward only: `None -> Unloaded -> Loading -> Loaded`, with
/// `Failed` as the terminal state of a load that could not complete. A failed
/// decode may still end in `Loaded` when the loader substitutes its fallback
/// asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    /// Never requested.
    None,
    /// A placeholder entry exists, but no bytes have been touched yet.
    Unloaded,
    /// Submitted and somewhere between "reading bytes" and "uploaded".
    Loading,
    /// Decoded, uploaded, and visible to callers.
    Loaded,
    /// Decode or upload failed and no fallback was available.
    Failed,
}

impl Default for LoadStatus {
    fn default() -> Self {
        LoadStatus::None
    }
}

/// The identity and bookkeeping fields shared by every resource kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceInfo {
    pub status: LoadStatus,
    /// Format-specific load flags, opaque to the manager.
    pub flags: u32,
    /// CRC32 of the raw bytes, or zero when the content never passed through
    /// memory (path-streamed formats).
    pub crc32: u32,
    /// The normalized path this resource was loaded from.
    pub path: PathBuf,
    /// The lower-cased file extension, without the leading dot.
    pub extension: InlinableString,
}

/// A single decoded asset.
///
/// Implementations are created empty by their loader's factory, mutated by
/// exactly one thread at a time - `load` on a worker, then `upload` on the
/// dispatch thread - and published immutably once uploaded. That sequencing is
/// what makes the contract lock-free on the resource itself.
pub trait Resource: Any + Send + Sync {
    fn info(&self) -> &ResourceInfo;
    fn info_mut(&mut self) -> &mut ResourceInfo;

    /// Decodes raw bytes into the resource's internal fields.
    ///
    /// Runs on a worker thread and must not touch the graphics device. When the
    /// format requires path semantics instead of a buffer (see
    /// `Loader::supports_buffer`), `bytes` is empty and the implementation
    /// reads from `info().path` itself.
    fn load(&mut self, bytes: &[u8]) -> Result<()>;

    /// Publishes the decoded payload to the device.
    ///
    /// Only ever runs on the dispatch thread, witnessed by the token. Calling
    /// it twice is safe; the second call is a no-op or a harmless re-publish.
    fn upload(&mut self, token: &UploadToken) -> Result<()>;

    /// Upcast used by the manager to hand out typed views.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
