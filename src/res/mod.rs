//! The `ResourceSystem` loads game assets asynchronously and tracks their
//! lifecycle from first request to device-visible publication.
//!
//! # Loading model
//!
//! Every load runs in two phases. The decode phase reads raw bytes and turns
//! them into an in-memory payload; it runs on a job pool worker and may block
//! on I/O. The upload phase publishes the payload to the graphics device; it
//! only ever runs on the dispatch thread, when the [`DispatchQueue`] is drained
//! at the top of a frame. Within one resource the phases are strictly ordered,
//! and uploads execute in the order they were queued. Decode phases of
//! different resources race freely across workers.
//!
//! # Identity and deduplication
//!
//! Resources are keyed by lexically normalized path, so `./a/b.png` and
//! `a/b.png` share one slot. At most one load is ever in flight per slot:
//! requesting a path that is already loaded, loading or failed is an idempotent
//! no-op. This single-flight guarantee is what makes fire-and-forget preloading
//! safe to call from any thread at any rate.
//!
//! # Failure
//!
//! A resource that fails to decode falls back to its loader's built-in
//! placeholder when one exists (a broken sound degrades into silence), and is
//! marked failed otherwise. Either way the frame loop keeps running; callers
//! observe failure as a `None` from [`ResourceSystemShared::get_file`] that
//! never resolves. Panics inside a decode are contained by the job pool.

pub mod errors;
pub mod loaders;
pub mod registry;
pub mod resource;

pub mod prelude {
    pub use super::loaders::{
        BlobLoader, JsonLoader, ResourceBlob, ResourceJson, ResourceSound, SoundLoader,
    };
    pub use super::registry::{Loader, PreloadList, Registry};
    pub use super::resource::{LoadStatus, Resource, ResourceInfo};
    pub use super::{ResourceSystem, ResourceSystemShared};
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use walkdir::WalkDir;

use crate::dispatch::{DispatchQueue, UploadToken};
use crate::sched::JobSystemShared;
use crate::utils::crc32;
use crate::utils::path as path_util;

use self::errors::{Error, Result};
use self::loaders::{BlobLoader, JsonLoader, SoundLoader};
use self::registry::{Loader, Registry};
use self::resource::{LoadStatus, Resource};

/// The owning half of the resource manager. Registers format handlers and hands
/// out the thread-safe [`ResourceSystemShared`] that the rest of the engine
/// talks to.
pub struct ResourceSystem {
    registry: Arc<RwLock<Registry>>,
    shared: Arc<ResourceSystemShared>,
}

impl ResourceSystem {
    /// Creates a new `ResourceSystem` with the built-in format handlers
    /// registered.
    pub fn new(sched: Arc<JobSystemShared>, dispatch: Arc<DispatchQueue>) -> Self {
        let mut registry = Registry::new();
        registry.add(JsonLoader::new());
        registry.add(SoundLoader::new());
        registry.add(BlobLoader::new());

        let registry = Arc::new(RwLock::new(registry));

        let shared = Arc::new(ResourceSystemShared {
            registry: registry.clone(),
            sched,
            dispatch,
            entries: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(AtomicUsize::new(0)),
        });

        ResourceSystem { registry, shared }
    }

    /// Appends a format handler. Loaders must be registered before any load for
    /// their extensions is issued, and are never unregistered.
    pub fn add_loader<T: Loader>(&self, loader: T) {
        debug_assert!(
            self.shared.entries.lock().unwrap().is_empty(),
            "loaders must be registered before any load is issued."
        );

        self.registry.write().unwrap().add(loader);
    }

    /// Returns the multi-thread friendly parts of `ResourceSystem`.
    pub fn shared(&self) -> Arc<ResourceSystemShared> {
        self.shared.clone()
    }
}

enum AsyncState {
    Loading,
    Ok(Arc<dyn Resource>),
    Err,
}

type EntryMap = Arc<Mutex<HashMap<PathBuf, AsyncState>>>;

/// Everything prepared under the manager lock that the load pipeline needs:
/// the claimed slot, the empty entry, the optional pre-supplied buffer and the
/// optional fallback entry.
struct LoadUnit {
    path: PathBuf,
    res: Box<dyn Resource>,
    bytes: Option<Vec<u8>>,
    reads_from_path: bool,
    fallback: Option<(Box<dyn Resource>, Vec<u8>)>,
}

pub struct ResourceSystemShared {
    registry: Arc<RwLock<Registry>>,
    sched: Arc<JobSystemShared>,
    dispatch: Arc<DispatchQueue>,
    entries: EntryMap,
    pending: Arc<AtomicUsize>,
}

impl ResourceSystemShared {
    /// Requests an asynchronous load of the file at `path` and returns
    /// immediately. Idempotent: a path that is already loaded, loading or
    /// failed is left untouched. Problems that can be detected up front (no
    /// matching loader, empty path) are logged, and the path simply never
    /// reaches `Loaded`.
    pub fn pre_load_file<P: AsRef<Path>>(&self, path: P, flags: u32) {
        match self.prepare(path.as_ref(), None, flags) {
            Ok(Some(unit)) => self.submit(unit),
            Ok(None) => {}
            Err(err) => warn!("Ignoring load request: {}", err),
        }
    }

    /// Like `pre_load_file`, but decodes a pre-supplied in-memory buffer
    /// instead of reading from the filesystem. Rejected (logged, no slot
    /// created) when the matching loader requires real path semantics.
    pub fn pre_load_bytes<P: AsRef<Path>>(&self, path: P, bytes: Vec<u8>, flags: u32) {
        match self.prepare(path.as_ref(), Some(bytes), flags) {
            Ok(Some(unit)) => self.submit(unit),
            Ok(None) => {}
            Err(err) => warn!("Ignoring load request: {}", err),
        }
    }

    /// Recursively enumerates regular files under `path` and requests an
    /// asynchronous load for each. Never waits; poll [`pending`] for overall
    /// completion.
    ///
    /// [`pending`]: #method.pending
    pub fn pre_load_folder<P: AsRef<Path>>(&self, path: P) {
        for entry in WalkDir::new(path.as_ref()) {
            match entry {
                Ok(v) => {
                    if v.file_type().is_file() {
                        self.pre_load_file(v.path(), 0);
                    }
                }
                Err(err) => warn!("Skipping unreadable directory entry: {}", err),
            }
        }
    }

    /// Requests asynchronous loads for a batch of `(path, flags)` pairs.
    pub fn pre_load_list<P: AsRef<Path>>(&self, files: &[(P, u32)]) {
        for (path, flags) in files {
            let path: &Path = path.as_ref();
            self.pre_load_file(path, *flags);
        }
    }

    /// Returns the typed resource at `path` if - and only if - it has reached
    /// `Loaded`. Returns `None` for paths that are still loading, failed, of a
    /// different type, or were never requested.
    pub fn get_file<T, P>(&self, path: P) -> Option<Arc<T>>
    where
        T: Resource,
        P: AsRef<Path>,
    {
        let path = path_util::normalize(path.as_ref());
        let entries = self.entries.lock().unwrap();

        match entries.get(&path) {
            Some(AsyncState::Ok(res)) => res.clone().into_any().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Loads `path` synchronously on the calling thread, bypassing the job
    /// pool, and returns the ready resource. Intended for startup-time loading
    /// before the frame loop exists, or for tooling - never for the per-frame
    /// hot path.
    ///
    /// If the path is already loaded the existing resource is returned; if an
    /// asynchronous load is in flight, the dispatch queue is drained until it
    /// completes.
    ///
    /// # Panics
    ///
    /// Panics when called off the dispatch thread: the upload phase runs
    /// inline here, and that is only legal on the thread owning the device.
    pub fn load_file<T, P>(&self, path: P, flags: u32) -> Result<Arc<T>>
    where
        T: Resource,
        P: AsRef<Path>,
    {
        let token = self.dispatch.token();
        let normalized = path_util::normalize(path.as_ref());

        loop {
            enum Probe {
                Ready(Arc<dyn Resource>),
                Failed,
                InFlight,
                Absent,
            }

            let probe = {
                let entries = self.entries.lock().unwrap();
                match entries.get(&normalized) {
                    Some(AsyncState::Ok(res)) => Probe::Ready(res.clone()),
                    Some(AsyncState::Err) => Probe::Failed,
                    Some(AsyncState::Loading) => Probe::InFlight,
                    None => Probe::Absent,
                }
            };

            match probe {
                Probe::Ready(res) => {
                    return res
                        .into_any()
                        .downcast::<T>()
                        .map_err(|_| Error::TypeMismatch(normalized));
                }
                Probe::Failed => return Err(Error::NotLoaded(normalized)),
                Probe::InFlight => {
                    // Help the queued upload along, then re-check.
                    self.dispatch.drain();
                    thread::yield_now();
                }
                Probe::Absent => match self.prepare(path.as_ref(), None, flags)? {
                    Some(unit) => return self.load_sync(unit, &token),
                    // Lost the claim to a concurrent request; probe again.
                    None => {}
                },
            }
        }
    }

    /// Checks if the resource at `path` has reached `Loaded`.
    pub fn is_loaded<P: AsRef<Path>>(&self, path: P) -> bool {
        self.status(path) == LoadStatus::Loaded
    }

    /// Checks if a load for `path` is still in flight.
    pub fn is_loading<P: AsRef<Path>>(&self, path: P) -> bool {
        self.status(path) == LoadStatus::Loading
    }

    /// The lifecycle status of `path` as observed by the manager.
    pub fn status<P: AsRef<Path>>(&self, path: P) -> LoadStatus {
        let path = path_util::normalize(path.as_ref());

        match self.entries.lock().unwrap().get(&path) {
            None => LoadStatus::None,
            Some(AsyncState::Loading) => LoadStatus::Loading,
            Some(AsyncState::Ok(_)) => LoadStatus::Loaded,
            Some(AsyncState::Err) => LoadStatus::Failed,
        }
    }

    /// The number of loads submitted but not yet terminal. Polling this down
    /// to zero is the cheap way to block until every preload has finished.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// The number of resources currently in `Loaded`.
    pub fn loaded_count(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .filter(|v| match v {
                AsyncState::Ok(_) => true,
                _ => false,
            })
            .count()
    }

    /// A snapshot of every loaded path.
    pub fn loaded_files(&self) -> Vec<PathBuf> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, v)| match v {
                AsyncState::Ok(_) => true,
                _ => false,
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Drops the slot of `path`, allowing a later request to load it afresh.
    /// Refused while a load is in flight.
    pub fn unload<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path_util::normalize(path.as_ref());
        let mut entries = self.entries.lock().unwrap();

        match entries.get(&path) {
            Some(AsyncState::Loading) => {
                warn!("Refusing to unload {:?} while its load is in flight.", path);
                false
            }
            Some(_) => {
                entries.remove(&path);
                true
            }
            None => false,
        }
    }

    /// Claims the slot for `path` and assembles everything the load pipeline
    /// needs. Returns `Ok(None)` when the slot is already occupied.
    fn prepare(
        &self,
        path: &Path,
        bytes: Option<Vec<u8>>,
        flags: u32,
    ) -> Result<Option<LoadUnit>> {
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyPath);
        }

        let path = path_util::normalize(path);
        let ext = path_util::extension(&path)
            .ok_or_else(|| Error::NoLoaderFound(String::new(), path.clone()))?;

        let registry = self.registry.read().unwrap();
        let loader = registry
            .find(&ext)
            .ok_or_else(|| Error::NoLoaderFound(ext.to_string(), path.clone()))?;

        let supports_buffer = loader.supports_buffer(&ext);
        if bytes.is_some() && !supports_buffer {
            return Err(Error::UnsupportedBuffer(ext.to_string()));
        }

        {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(&path) {
                return Ok(None);
            }

            entries.insert(path.clone(), AsyncState::Loading);
        }

        loader.preload().push(&path, flags);

        let new_entry = || {
            let mut res = loader.create_entry();
            {
                let info = res.info_mut();
                info.status = LoadStatus::Unloaded;
                info.flags = flags;
                info.path = path.clone();
                info.extension = ext.clone();
            }
            res
        };

        let res = new_entry();
        let fallback = loader.fallback().map(|v| (new_entry(), v.to_vec()));

        self.pending.fetch_add(1, Ordering::SeqCst);

        Ok(Some(LoadUnit {
            path,
            res,
            bytes,
            reads_from_path: !supports_buffer,
            fallback,
        }))
    }

    /// Submits a claimed load to the job pool: decode on a worker, then hand
    /// the upload to the dispatch queue.
    ///
    /// The guard settles the slot to `Err` on every exit but the successful
    /// hand-off - including a decode that panics out of the job body - so the
    /// in-flight counter always returns to zero.
    fn submit(&self, unit: LoadUnit) {
        let entries = self.entries.clone();
        let pending = self.pending.clone();
        let dispatch = self.dispatch.clone();

        self.sched.spawn(move || {
            let mut guard = LoadGuard {
                entries,
                pending,
                path: unit.path.clone(),
                armed: true,
            };

            match decode(unit) {
                Ok(res) => {
                    guard.armed = false;

                    let entries = guard.entries.clone();
                    let pending = guard.pending.clone();
                    let path = guard.path.clone();
                    let queue = dispatch.clone();

                    dispatch.run(move || {
                        let token = queue.token();
                        publish(&entries, &pending, path, res, &token);
                    });
                }
                Err(err) => {
                    warn!("Failed to load {:?}: {}.", guard.path, err);
                }
            }
        });
    }

    /// The synchronous pipeline behind `load_file`: decode and upload inline on
    /// the dispatch thread.
    fn load_sync<T: Resource>(&self, unit: LoadUnit, token: &UploadToken) -> Result<Arc<T>> {
        let path = unit.path.clone();

        let mut res = match decode(unit) {
            Ok(res) => res,
            Err(err) => {
                self.entries
                    .lock()
                    .unwrap()
                    .insert(path.clone(), AsyncState::Err);
                self.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Decode(path, err));
            }
        };

        match res.upload(token) {
            Ok(()) => {
                res.info_mut().status = LoadStatus::Loaded;
                let res: Arc<dyn Resource> = Arc::from(res);
                self.entries
                    .lock()
                    .unwrap()
                    .insert(path.clone(), AsyncState::Ok(res.clone()));
                self.pending.fetch_sub(1, Ordering::SeqCst);
                info!("Loaded {:?}.", path);

                res.into_any()
                    .downcast::<T>()
                    .map_err(|_| Error::TypeMismatch(path))
            }
            Err(err) => {
                self.entries
                    .lock()
                    .unwrap()
                    .insert(path.clone(), AsyncState::Err);
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(Error::Upload(path, err))
            }
        }
    }
}

/// Settles a claimed slot to `Err` unless disarmed first. Runs on drop, which
/// covers panics unwinding out of a decode.
struct LoadGuard {
    entries: EntryMap,
    pending: Arc<AtomicUsize>,
    path: PathBuf,
    armed: bool,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.armed {
            self.entries
                .lock()
                .unwrap()
                .insert(self.path.clone(), AsyncState::Err);
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Runs the decode phase of `unit` to completion: read bytes (unless a buffer
/// was pre-supplied or the format streams from its path), fingerprint them and
/// decode, substituting the fallback entry when the primary decode fails.
fn decode(unit: LoadUnit) -> ::std::result::Result<Box<dyn Resource>, ::failure::Error> {
    let LoadUnit {
        path,
        mut res,
        bytes,
        reads_from_path,
        fallback,
    } = unit;

    let read = match bytes {
        Some(buf) => Ok(buf),
        None => {
            if reads_from_path {
                // The entry streams from `info().path` itself.
                Ok(Vec::new())
            } else {
                fs::read(&path).map_err(::failure::Error::from)
            }
        }
    };

    let primary = read.and_then(|buf| {
        if !buf.is_empty() {
            res.info_mut().crc32 = crc32(&buf);
        }

        res.info_mut().status = LoadStatus::Loading;
        res.load(&buf)?;
        Ok(res)
    });

    match primary {
        Ok(res) => Ok(res),
        Err(err) => match fallback {
            Some((mut fb, buf)) => {
                warn!(
                    "Failed to load {:?}: {}. Substituting the fallback asset.",
                    path, err
                );

                fb.info_mut().crc32 = crc32(&buf);
                fb.info_mut().status = LoadStatus::Loading;
                fb.load(&buf)?;
                Ok(fb)
            }
            None => Err(err),
        },
    }
}

/// Runs the upload phase on the dispatch thread and publishes the result. The
/// status write happens before the entry is exposed under the manager lock, so
/// any thread that can see the pointer also sees `Loaded`.
fn publish(
    entries: &EntryMap,
    pending: &Arc<AtomicUsize>,
    path: PathBuf,
    mut res: Box<dyn Resource>,
    token: &UploadToken,
) {
    match res.upload(token) {
        Ok(()) => {
            res.info_mut().status = LoadStatus::Loaded;
            let res: Arc<dyn Resource> = Arc::from(res);
            entries.lock().unwrap().insert(path.clone(), AsyncState::Ok(res));
            info!("Loaded {:?}.", path);
        }
        Err(err) => {
            error!("Failed to upload {:?}: {}.", path, err);
            entries.lock().unwrap().insert(path, AsyncState::Err);
        }
    }

    pending.fetch_sub(1, Ordering::SeqCst);
}
