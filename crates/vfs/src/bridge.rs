//! Async bridge between the ProjFS callback threads and the logical
//! filesystem.
//!
//! This is the only component that crosses the boundary between the two
//! scheduling regimes. ProjFS callbacks run on a kernel-controlled thread
//! pool and must never block on host I/O; the logical filesystem is async
//! and cooperative. The bridge therefore exposes three non-blocking fetch
//! entry points that enqueue a request on an unbounded channel, and a
//! dedicated thread that owns a current-thread Tokio runtime — the host
//! event loop — where every logical-filesystem call executes and every
//! resolution lands in the content cache.
//!
//! ```text
//! ProjFS thread                    castfs-bridge thread
//! ─────────────                    ────────────────────
//!     │                                 │
//!     │ fetch_listing(path) ───────────►│ read_dir(path).await
//!     │   (returns immediately)         │ cache.set_listing(...)
//!     │                                 │ listing-updated hook
//! ```
//!
//! Resolution order guarantees: the cache write happens-before the hook
//! fires, so a completion routine that runs from the hook always observes
//! the entry it is completing against.
//!
//! Cancellation is by provider shutdown only: after `stop()`, no new fetches
//! are accepted and in-flight results are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::cache::ContentCache;
use crate::logical::LogicalFilesystem;
use crate::path;
use crate::types::{DirListing, FileContent, FileEntry};

/// Non-blocking fetch surface the engines depend on.
///
/// Implemented by [`AsyncBridge`]; tests substitute recording mocks.
pub trait Fetcher: Send + Sync {
    /// Request metadata for a path.
    fn fetch_info(&self, vpath: &str);
    /// Request the directory listing of a path.
    fn fetch_listing(&self, vpath: &str);
    /// Request the whole-file content of a path.
    fn fetch_content(&self, vpath: &str);
}

enum FetchRequest {
    Info(String),
    Listing(String),
    Content(String),
    Shutdown,
}

type PathHook = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    listing_updated: RwLock<Option<PathHook>>,
    content_ready: RwLock<Option<PathHook>>,
}

impl Hooks {
    fn fire_listing(&self, vpath: &str) {
        if let Some(hook) = self.listing_updated.read().as_ref() {
            hook(vpath);
        }
    }

    fn fire_content(&self, vpath: &str) {
        if let Some(hook) = self.content_ready.read().as_ref() {
            hook(vpath);
        }
    }
}

/// Marshals cache-miss requests onto the host loop and routes results back.
pub struct AsyncBridge {
    tx: mpsc::UnboundedSender<FetchRequest>,
    accepting: Arc<AtomicBool>,
    hooks: Arc<Hooks>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncBridge {
    /// Start the bridge: spawns the host-loop thread and begins accepting
    /// fetches immediately.
    ///
    /// # Arguments
    /// * `fs` - The logical filesystem to consult
    /// * `cache` - The content cache resolutions are written into
    pub fn start(fs: Arc<dyn LogicalFilesystem>, cache: Arc<ContentCache>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<FetchRequest>();
        let accepting = Arc::new(AtomicBool::new(true));
        let hooks = Arc::new(Hooks::default());

        let accepting_worker: Arc<AtomicBool> = accepting.clone();
        let hooks_worker: Arc<Hooks> = hooks.clone();

        let worker: JoinHandle<()> = std::thread::Builder::new()
            .name("castfs-bridge".to_string())
            .spawn(move || {
                // One current-thread runtime: every logical-filesystem call
                // and every completion executes on this single thread.
                let rt: tokio::runtime::Runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("failed to create bridge runtime");

                rt.block_on(run_loop(rx, fs, cache, hooks_worker, accepting_worker));
            })
            .expect("failed to spawn bridge thread");

        Self {
            tx,
            accepting,
            hooks,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Install the hook fired after a listing resolution is cached.
    pub fn set_on_listing_updated<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.hooks.listing_updated.write() = Some(Box::new(hook));
    }

    /// Install the hook fired after a content resolution is cached.
    pub fn set_on_content_ready<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.hooks.content_ready.write() = Some(Box::new(hook));
    }

    /// Stop accepting fetches, let in-flight work finish, and join the host
    /// loop. Results of in-flight fetches are discarded. Idempotent.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.tx.send(FetchRequest::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }

    /// Whether the bridge still accepts fetches.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Inbound write surface. The projection is read-only: the operation is
    /// acknowledged with a denial and never reaches the logical filesystem.
    pub fn submit_write(&self, vpath: &str) -> crate::VfsResult<()> {
        tracing::info!(path = %vpath, "write rejected on read-only projection");
        Err(crate::VfsError::AccessDenied(vpath.to_string()))
    }

    fn submit(&self, request: FetchRequest) {
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        // A closed channel means the loop is gone; nothing left to do.
        let _ = self.tx.send(request);
    }
}

impl Fetcher for AsyncBridge {
    fn fetch_info(&self, vpath: &str) {
        self.submit(FetchRequest::Info(vpath.to_string()));
    }

    fn fetch_listing(&self, vpath: &str) {
        self.submit(FetchRequest::Listing(vpath.to_string()));
    }

    fn fetch_content(&self, vpath: &str) {
        self.submit(FetchRequest::Content(vpath.to_string()));
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<FetchRequest>,
    fs: Arc<dyn LogicalFilesystem>,
    cache: Arc<ContentCache>,
    hooks: Arc<Hooks>,
    accepting: Arc<AtomicBool>,
) {
    while let Some(request) = rx.recv().await {
        if matches!(request, FetchRequest::Shutdown) {
            break;
        }

        let fs: Arc<dyn LogicalFilesystem> = fs.clone();
        let cache: Arc<ContentCache> = cache.clone();
        let hooks: Arc<Hooks> = hooks.clone();
        let accepting: Arc<AtomicBool> = accepting.clone();

        // Spawned onto the same current-thread runtime: requests interleave
        // cooperatively but never in parallel.
        tokio::spawn(async move {
            resolve(request, fs, cache, hooks, accepting).await;
        });
    }
}

async fn resolve(
    request: FetchRequest,
    fs: Arc<dyn LogicalFilesystem>,
    cache: Arc<ContentCache>,
    hooks: Arc<Hooks>,
    accepting: Arc<AtomicBool>,
) {
    match request {
        FetchRequest::Info(vpath) => match fs.stat(&vpath).await {
            Ok(stat) => {
                if !accepting.load(Ordering::SeqCst) {
                    return;
                }
                let entry = FileEntry {
                    name: path::file_name(&vpath).to_string(),
                    hash: stat.hash.clone(),
                    size: if stat.directory() { 0 } else { stat.size },
                    is_directory: stat.directory(),
                    mode: stat.mode,
                    blob_direct: false,
                };
                cache.set_info(&vpath, entry);
            }
            Err(e) => tracing::debug!(path = %vpath, error = %e, "stat fetch failed"),
        },

        FetchRequest::Listing(vpath) => match fs.read_dir(&vpath).await {
            Ok(children) => {
                if !accepting.load(Ordering::SeqCst) {
                    return;
                }
                cache.set_listing(&vpath, DirListing::ingest(children));
                hooks.fire_listing(&vpath);
            }
            Err(e) => tracing::warn!(path = %vpath, error = %e, "listing fetch failed"),
        },

        FetchRequest::Content(vpath) => match fs.read_file(&vpath).await {
            Ok(bytes) => {
                if !accepting.load(Ordering::SeqCst) {
                    return;
                }
                cache.set_content(&vpath, FileContent::new(bytes));
                // Fired even when the body was above the cache limit: the
                // completion routine answers not-found in that case rather
                // than leaving the request suspended.
                hooks.fire_content(&vpath);
            }
            Err(e) => tracing::warn!(path = %vpath, error = %e, "content fetch failed"),
        },

        FetchRequest::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{VfsError, VfsResult};
    use crate::logical::StatInfo;
    use crate::types::DirChild;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FixtureFs {
        files: HashMap<String, Vec<u8>>,
        dirs: HashMap<String, Vec<DirChild>>,
        reads: AtomicUsize,
    }

    impl FixtureFs {
        fn new() -> Self {
            let mut files: HashMap<String, Vec<u8>> = HashMap::new();
            files.insert("/invites/iom_invite.txt".to_string(), b"abc".to_vec());

            let mut dirs: HashMap<String, Vec<DirChild>> = HashMap::new();
            dirs.insert(
                "/".to_string(),
                vec![
                    DirChild::Entry(FileEntry::directory("chats")),
                    DirChild::Entry(FileEntry::directory("invites")),
                ],
            );

            Self {
                files,
                dirs,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LogicalFilesystem for FixtureFs {
        async fn stat(&self, vpath: &str) -> VfsResult<StatInfo> {
            match self.files.get(vpath) {
                Some(data) => Ok(StatInfo {
                    size: data.len() as u64,
                    is_directory: Some(false),
                    mode: 0o100644,
                    hash: None,
                }),
                None => Err(VfsError::NotFound(vpath.to_string())),
            }
        }

        async fn read_dir(&self, vpath: &str) -> VfsResult<Vec<DirChild>> {
            self.dirs
                .get(vpath)
                .cloned()
                .ok_or_else(|| VfsError::NotFound(vpath.to_string()))
        }

        async fn read_file(&self, vpath: &str) -> VfsResult<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(vpath)
                .cloned()
                .ok_or_else(|| VfsError::NotFound(vpath.to_string()))
        }
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn listing_fetch_populates_cache_and_fires_hook() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let bridge = AsyncBridge::start(Arc::new(FixtureFs::new()), cache.clone());

        let fired = Arc::new(AtomicBool::new(false));
        let fired_hook: Arc<AtomicBool> = fired.clone();
        bridge.set_on_listing_updated(move |path| {
            assert_eq!(path, "/");
            fired_hook.store(true, Ordering::SeqCst);
        });

        bridge.fetch_listing("/");

        assert!(wait_for(|| cache.get_listing("/").is_some()));
        assert!(wait_for(|| fired.load(Ordering::SeqCst)));
        let listing: DirListing = cache.get_listing("/").unwrap();
        assert_eq!(listing.entries.len(), 2);
        bridge.stop();
    }

    #[test]
    fn content_fetch_populates_cache_and_fires_hook() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let bridge = AsyncBridge::start(Arc::new(FixtureFs::new()), cache.clone());

        let fired = Arc::new(AtomicBool::new(false));
        let fired_hook: Arc<AtomicBool> = fired.clone();
        bridge.set_on_content_ready(move |_| {
            fired_hook.store(true, Ordering::SeqCst);
        });

        bridge.fetch_content("/invites/iom_invite.txt");

        assert!(wait_for(|| cache.get_content("/invites/iom_invite.txt").is_some()));
        assert!(wait_for(|| fired.load(Ordering::SeqCst)));
        assert_eq!(
            cache.get_content("/invites/iom_invite.txt").unwrap().data.as_ref(),
            b"abc"
        );
        bridge.stop();
    }

    #[test]
    fn info_fetch_populates_info_map() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let bridge = AsyncBridge::start(Arc::new(FixtureFs::new()), cache.clone());

        bridge.fetch_info("/invites/iom_invite.txt");

        assert!(wait_for(|| cache.get_info("/invites/iom_invite.txt").is_some()));
        let info: FileEntry = cache.get_info("/invites/iom_invite.txt").unwrap();
        assert_eq!(info.name, "iom_invite.txt");
        assert_eq!(info.size, 3);
        assert!(!info.is_directory);
        bridge.stop();
    }

    #[test]
    fn failed_fetch_is_dropped() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let bridge = AsyncBridge::start(Arc::new(FixtureFs::new()), cache.clone());

        bridge.fetch_listing("/nope");
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.get_listing("/nope").is_none());
        bridge.stop();
    }

    #[test]
    fn stop_rejects_new_fetches() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let fs = Arc::new(FixtureFs::new());
        let bridge = AsyncBridge::start(fs.clone(), cache.clone());

        bridge.stop();
        assert!(!bridge.is_accepting());

        bridge.fetch_content("/invites/iom_invite.txt");
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(fs.reads.load(Ordering::SeqCst), 0);
        assert!(cache.get_content("/invites/iom_invite.txt").is_none());
    }

    #[test]
    fn writes_are_denied_and_never_forwarded() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let fs = Arc::new(FixtureFs::new());
        let bridge = AsyncBridge::start(fs.clone(), cache);

        let denied = bridge.submit_write("/invites/new.txt");
        assert!(matches!(denied, Err(VfsError::AccessDenied(_))));
        assert_eq!(fs.reads.load(Ordering::SeqCst), 0);
        bridge.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let bridge = AsyncBridge::start(Arc::new(FixtureFs::new()), cache);
        bridge.stop();
        bridge.stop();
    }
}
