extern crate charcoal;

use std::any::Any;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use charcoal::dispatch::{DispatchQueue, UploadToken};
use charcoal::res::loaders::{ResourceJson, ResourceSound};
use charcoal::res::registry::{Loader, PreloadList};
use charcoal::res::resource::{LoadStatus, Resource, ResourceInfo};
use charcoal::res::{ResourceSystem, ResourceSystemShared};
use charcoal::sched::{JobSystem, SchedParams};

struct Testbed {
    _sched: JobSystem,
    queue: Arc<DispatchQueue>,
    system: ResourceSystem,
    shared: Arc<ResourceSystemShared>,
    dir: tempfile::TempDir,
}

fn testbed(workers: u32) -> Testbed {
    let _ = env_logger::try_init();

    let sched = JobSystem::new(
        SchedParams {
            workers,
            ..Default::default()
        },
        None,
    );

    let queue = Arc::new(DispatchQueue::new());
    let system = ResourceSystem::new(sched.shared(), queue.clone());
    let shared = system.shared();

    Testbed {
        _sched: sched,
        queue,
        system,
        shared,
        dir: tempfile::tempdir().unwrap(),
    }
}

fn drain_until<F: Fn() -> bool>(queue: &DispatchQueue, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !cond() {
        queue.drain();
        if Instant::now() > deadline {
            panic!("timed out waiting for loads to settle");
        }

        thread::sleep(Duration::from_millis(1));
    }
}

// A minimal resource kind for probing manager behavior.
struct ProbeResource {
    info: ResourceInfo,
    payload: Vec<u8>,
    uploads: Option<Arc<Mutex<Vec<PathBuf>>>>,
}

impl Resource for ProbeResource {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.info
    }

    fn load(&mut self, bytes: &[u8]) -> charcoal::errors::Result<()> {
        self.payload = bytes.to_vec();
        Ok(())
    }

    fn upload(&mut self, _: &UploadToken) -> charcoal::errors::Result<()> {
        if let Some(ref uploads) = self.uploads {
            uploads.lock().unwrap().push(self.info.path.clone());
        }

        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// Claims `.count` files and counts factory invocations.
struct CountingLoader {
    preload: Arc<PreloadList>,
    calls: Arc<AtomicUsize>,
}

impl Loader for CountingLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "count"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::new(ProbeResource {
            info: ResourceInfo::default(),
            payload: Vec::new(),
            uploads: None,
        })
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

// Claims `.rec` files and records upload order.
struct RecordingLoader {
    preload: PreloadList,
    uploads: Arc<Mutex<Vec<PathBuf>>>,
}

impl Loader for RecordingLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "rec"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(ProbeResource {
            info: ResourceInfo::default(),
            payload: Vec::new(),
            uploads: Some(self.uploads.clone()),
        })
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

// Claims `.boom` files and panics mid-decode.
struct PanickingLoader {
    preload: PreloadList,
}

struct PanickingResource(ResourceInfo);

impl Resource for PanickingResource {
    fn info(&self) -> &ResourceInfo {
        &self.0
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.0
    }

    fn load(&mut self, _: &[u8]) -> charcoal::errors::Result<()> {
        panic!("decoder exploded");
    }

    fn upload(&mut self, _: &UploadToken) -> charcoal::errors::Result<()> {
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Loader for PanickingLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "boom"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(PanickingResource(ResourceInfo::default()))
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

// Claims `.tex` files; decodes fail unless the bytes carry the blessed magic,
// and the fallback is a tiny checkerboard.
const CHECKERBOARD: [u8; 20] = [
    b'T', b'E', b'X', b'0', // magic
    255, 0, 255, 255, 0, 0, 0, 255, // magenta / black
    0, 0, 0, 255, 255, 0, 255, 255, // black / magenta
];

struct TextureLoader {
    preload: PreloadList,
}

struct TextureResource {
    info: ResourceInfo,
    texels: Vec<u8>,
}

impl Resource for TextureResource {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ResourceInfo {
        &mut self.info
    }

    fn load(&mut self, bytes: &[u8]) -> charcoal::errors::Result<()> {
        if bytes.len() < 4 || &bytes[..4] != b"TEX0" {
            return Err(failure::err_msg("bad texture magic"));
        }

        self.texels = bytes[4..].to_vec();
        Ok(())
    }

    fn upload(&mut self, _: &UploadToken) -> charcoal::errors::Result<()> {
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Loader for TextureLoader {
    fn can_load(&self, ext: &str) -> bool {
        ext == "tex"
    }

    fn create_entry(&self) -> Box<dyn Resource> {
        Box::new(TextureResource {
            info: ResourceInfo::default(),
            texels: Vec::new(),
        })
    }

    fn fallback(&self) -> Option<&[u8]> {
        Some(&CHECKERBOARD)
    }

    fn preload(&self) -> &PreloadList {
        &self.preload
    }
}

#[test]
fn end_to_end_json() {
    let t = testbed(2);

    let dir = t.dir.path().join("content/json");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("test.json");
    fs::write(&path, br#"{"name": "crate", "frames": 4}"#).unwrap();

    t.shared.pre_load_file(&path, 0);

    let shared = t.shared.clone();
    let probe = path.clone();
    drain_until(&t.queue, move || !shared.is_loading(&probe));

    let res = t
        .shared
        .get_file::<ResourceJson, _>(&path)
        .expect("json should be loaded");

    assert_eq!(res.document()["name"], "crate");
    assert_eq!(res.document()["frames"], 4);
    assert_ne!(res.info().crc32, 0);
    assert_eq!(res.info().status, LoadStatus::Loaded);
    assert!(t.shared.is_loaded(&path));

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sprite {
        name: String,
        frames: u32,
    }

    let sprite: Sprite = res.parse().unwrap();
    assert_eq!(
        sprite,
        Sprite {
            name: "crate".into(),
            frames: 4
        }
    );
}

#[test]
fn concurrent_requests_collapse_into_one_load() {
    let t = testbed(4);

    let preload = Arc::new(PreloadList::new());
    let calls = Arc::new(AtomicUsize::new(0));
    t.system.add_loader(CountingLoader {
        preload: preload.clone(),
        calls: calls.clone(),
    });

    let path = t.dir.path().join("x.count");
    fs::write(&path, b"payload").unwrap();

    let mut joins = Vec::new();
    for _ in 0..8 {
        let shared = t.shared.clone();
        let path = path.clone();
        joins.push(thread::spawn(move || {
            for _ in 0..(rand::random::<usize>() % 4 + 1) {
                shared.pre_load_file(&path, 0);
            }
        }));
    }

    for v in joins {
        v.join().unwrap();
    }

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(preload.len(), 1);
    assert_eq!(preload.count(&path), 1);
    assert!(t.shared.is_loaded(&path));
}

#[test]
fn dedup_across_path_normalization() {
    let t = testbed(2);

    let preload = Arc::new(PreloadList::new());
    let calls = Arc::new(AtomicUsize::new(0));
    t.system.add_loader(CountingLoader {
        preload: preload.clone(),
        calls: calls.clone(),
    });

    let dir = t.dir.path().join("sub");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("y.count"), b"payload").unwrap();

    t.shared.pre_load_file(t.dir.path().join("sub/./y.count"), 0);
    t.shared.pre_load_file(t.dir.path().join("sub/y.count"), 0);
    t.shared
        .pre_load_file(t.dir.path().join("sub/nested/../y.count"), 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(preload.len(), 1);
    assert_eq!(t.shared.loaded_count(), 1);
}

#[test]
fn uploads_drain_in_submission_order() {
    // One worker serializes the decode phase, so the uploads are queued in
    // request order before any drain runs.
    let t = testbed(1);

    let uploads = Arc::new(Mutex::new(Vec::new()));
    t.system.add_loader(RecordingLoader {
        preload: PreloadList::new(),
        uploads: uploads.clone(),
    });

    let a = t.dir.path().join("a.rec");
    let b = t.dir.path().join("b.rec");
    fs::write(&a, b"first").unwrap();
    fs::write(&b, b"second").unwrap();

    t.shared.pre_load_file(&a, 0);
    t.shared.pre_load_file(&b, 0);

    // Wait for both uploads to be queued without draining anything.
    let deadline = Instant::now() + Duration::from_secs(5);
    while t.queue.len() < 2 {
        assert!(Instant::now() < deadline, "uploads were never queued");
        thread::sleep(Duration::from_millis(1));
    }

    t.queue.drain();
    assert_eq!(*uploads.lock().unwrap(), vec![a.clone(), b.clone()]);
    assert!(t.shared.is_loaded(&a) && t.shared.is_loaded(&b));
}

#[test]
fn missing_sound_degrades_to_the_fallback_clip() {
    let t = testbed(2);

    let path = t.dir.path().join("missing.ogg");
    t.shared.pre_load_file(&path, 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    let res = t
        .shared
        .get_file::<ResourceSound, _>(&path)
        .expect("fallback should have loaded");

    assert_eq!(t.shared.status(&path), LoadStatus::Loaded);
    assert!(res.is_pcm());
    assert_eq!(res.sample_rate(), 44_100);
    assert!(res.samples().iter().all(|&v| v == 0));
}

#[test]
fn corrupt_wav_degrades_to_the_fallback_clip() {
    let t = testbed(2);

    let path = t.dir.path().join("corrupt.wav");
    fs::write(&path, b"RIFF....WAVEgarbage").unwrap();

    t.shared.pre_load_file(&path, 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    let res = t
        .shared
        .get_file::<ResourceSound, _>(&path)
        .expect("fallback should have loaded");
    assert_eq!(res.samples().len(), 8);
}

#[test]
fn custom_loader_fallback_is_visibly_distinct() {
    let t = testbed(2);

    t.system.add_loader(TextureLoader {
        preload: PreloadList::new(),
    });

    let path = t.dir.path().join("broken.tex");
    fs::write(&path, b"not a texture").unwrap();

    t.shared.pre_load_file(&path, 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    let res = t
        .shared
        .get_file::<TextureResource, _>(&path)
        .expect("checkerboard should have loaded");
    assert_eq!(res.texels, &CHECKERBOARD[4..]);
}

#[test]
fn decode_failure_without_fallback_stays_failed() {
    let t = testbed(2);

    let path = t.dir.path().join("bad.json");
    fs::write(&path, b"{definitely not json").unwrap();

    t.shared.pre_load_file(&path, 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert_eq!(t.shared.status(&path), LoadStatus::Failed);
    assert!(!t.shared.is_loaded(&path));
    assert!(t.shared.get_file::<ResourceJson, _>(&path).is_none());
}

#[test]
fn unknown_extension_is_rejected_up_front() {
    let t = testbed(2);

    let path = t.dir.path().join("thing.xyz");
    fs::write(&path, b"whatever").unwrap();

    t.shared.pre_load_file(&path, 0);

    assert_eq!(t.shared.pending(), 0);
    assert_eq!(t.shared.status(&path), LoadStatus::None);
}

#[test]
fn buffers_for_streamed_formats_are_rejected() {
    let t = testbed(2);

    // `.mp3` demands path semantics; an in-memory buffer cannot be decoded.
    t.shared
        .pre_load_bytes("song.mp3", b"ID3fake".to_vec(), 0);

    assert_eq!(t.shared.pending(), 0);
    assert_eq!(t.shared.status("song.mp3"), LoadStatus::None);
}

#[test]
fn buffers_decode_without_touching_the_filesystem() {
    let t = testbed(2);

    t.shared
        .pre_load_bytes("mem.json", br#"{"inline": true}"#.to_vec(), 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    let res = t
        .shared
        .get_file::<ResourceJson, _>("mem.json")
        .expect("buffer should have decoded");
    assert_eq!(res.document()["inline"], true);
    assert_ne!(res.info().crc32, 0);
}

#[test]
fn blocking_load_returns_the_ready_resource() {
    let t = testbed(2);

    let path = t.dir.path().join("settings.json");
    fs::write(&path, br#"{"vsync": false}"#).unwrap();

    let res = t
        .shared
        .load_file::<ResourceJson, _>(&path, 0)
        .expect("blocking load should succeed");
    assert_eq!(res.document()["vsync"], false);

    // The slot is shared with the non-blocking surface.
    let again = t.shared.get_file::<ResourceJson, _>(&path).unwrap();
    assert!(Arc::ptr_eq(&res, &again));

    // A second blocking load is a lookup, not a reload.
    let third = t.shared.load_file::<ResourceJson, _>(&path, 0).unwrap();
    assert!(Arc::ptr_eq(&res, &third));
}

#[test]
fn blocking_load_joins_an_in_flight_request() {
    let t = testbed(2);

    let path = t.dir.path().join("late.json");
    fs::write(&path, br#"{"late": 1}"#).unwrap();

    t.shared.pre_load_file(&path, 0);
    let res = t
        .shared
        .load_file::<ResourceJson, _>(&path, 0)
        .expect("should resolve the in-flight load");
    assert_eq!(res.document()["late"], 1);
}

#[test]
fn blocking_load_of_a_missing_file_fails() {
    let t = testbed(2);

    let path = t.dir.path().join("nope.json");
    assert!(t.shared.load_file::<ResourceJson, _>(&path, 0).is_err());
    assert_eq!(t.shared.status(&path), LoadStatus::Failed);
}

#[test]
fn a_panicking_decode_is_contained() {
    let t = testbed(1);

    t.system.add_loader(PanickingLoader {
        preload: PreloadList::new(),
    });

    let boom = t.dir.path().join("ka.boom");
    let good = t.dir.path().join("survivor.json");
    fs::write(&boom, b"fuse").unwrap();
    fs::write(&good, br#"{"alive": true}"#).unwrap();

    t.shared.pre_load_file(&boom, 0);
    t.shared.pre_load_file(&good, 0);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    // The bad asset settles to Failed; the unrelated one still loads on the
    // same (sole) worker.
    assert_eq!(t.shared.status(&boom), LoadStatus::Failed);
    assert!(t.shared.is_loaded(&good));
}

#[test]
fn folder_preload_walks_recursively() {
    let t = testbed(2);

    let root = t.dir.path().join("content");
    fs::create_dir_all(root.join("json/sub")).unwrap();
    fs::write(root.join("json/a.json"), b"{}").unwrap();
    fs::write(root.join("json/sub/b.json"), b"[1, 2]").unwrap();
    fs::write(root.join("c.bin"), b"\x00\x01").unwrap();
    // No loader claims this one; it is skipped with a log line.
    fs::write(root.join("readme.txt"), b"hello").unwrap();

    t.shared.pre_load_folder(&root);

    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert_eq!(t.shared.loaded_count(), 3);
    assert!(t.shared.is_loaded(root.join("json/a.json")));
    assert!(t.shared.is_loaded(root.join("json/sub/b.json")));
    assert!(t.shared.is_loaded(root.join("c.bin")));
    assert_eq!(t.shared.status(root.join("readme.txt")), LoadStatus::None);

    let mut files = t.shared.loaded_files();
    files.sort();
    assert_eq!(files.len(), 3);
}

#[test]
fn unload_frees_the_slot_for_a_fresh_load() {
    let t = testbed(2);

    let preload = Arc::new(PreloadList::new());
    let calls = Arc::new(AtomicUsize::new(0));
    t.system.add_loader(CountingLoader {
        preload: preload.clone(),
        calls: calls.clone(),
    });

    let path = t.dir.path().join("z.count");
    fs::write(&path, b"payload").unwrap();

    t.shared.pre_load_file(&path, 0);
    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(t.shared.unload(&path));
    assert_eq!(t.shared.status(&path), LoadStatus::None);

    t.shared.pre_load_file(&path, 0);
    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(t.shared.is_loaded(&path));
}

#[test]
fn typed_views_do_not_cross_resource_kinds() {
    let t = testbed(2);

    let path = t.dir.path().join("typed.json");
    fs::write(&path, b"{}").unwrap();

    t.shared.pre_load_file(&path, 0);
    let shared = t.shared.clone();
    drain_until(&t.queue, move || shared.pending() == 0);

    assert!(t.shared.get_file::<ResourceJson, _>(&path).is_some());
    assert!(t.shared.get_file::<ResourceSound, _>(&path).is_none());
}
