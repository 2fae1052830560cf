//! End-to-end projection flows exercised against mock platform seams.
//!
//! The kernel side is simulated by a capacity-bounded entry sink and a
//! recording data port; the host side is a real async bridge over an
//! in-memory logical filesystem. Everything here runs on any platform.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use castfs_projfs::{
    clip_window, regenerates, verdict, CompletionOutcome, ContentCache, DataDeliveryEngine,
    DataPort, DataStream, DirChild, DirListing, EntrySink, EnumerationEngine, Fetcher, FileContent,
    FileEntry, LogicalFilesystem, Notification, ObjectStore, PlaceholderResolver, ProjFsOptions,
    ProviderStats, RawContext, SinkStatus, StatInfo, Verdict, VfsError, VfsResult,
};

const HASH: &str = "f00dbabe00112233445566778899aabbccddeeff00112233445566778899aabb";

// ── Mock kernel seams ─────────────────────────────────────────────────────

struct VecSink {
    capacity: usize,
    filled: Vec<(String, bool, u64)>,
}

impl VecSink {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            filled: Vec::new(),
        }
    }

    fn names(&self) -> Vec<&str> {
        self.filled.iter().map(|(name, _, _)| name.as_str()).collect()
    }
}

impl EntrySink for VecSink {
    fn fill(&mut self, entry: &FileEntry) -> SinkStatus {
        if self.filled.len() >= self.capacity {
            return SinkStatus::BufferFull;
        }
        self.filled
            .push((entry.name.clone(), entry.is_directory, entry.size));
        SinkStatus::Accepted
    }
}

#[derive(Default)]
struct RecordingPort {
    writes: Mutex<Vec<(u64, Vec<u8>)>>,
    completions: Mutex<Vec<(i32, CompletionOutcome)>>,
}

impl DataPort for RecordingPort {
    fn write(&self, _stream: &DataStream, offset: u64, data: &[u8]) -> VfsResult<()> {
        self.writes.lock().unwrap().push((offset, data.to_vec()));
        Ok(())
    }

    fn complete(&self, _stream: &DataStream, command_id: i32, outcome: CompletionOutcome) {
        self.completions.lock().unwrap().push((command_id, outcome));
    }
}

#[derive(Default)]
struct NullFetcher {
    content_requests: AtomicUsize,
}

impl Fetcher for NullFetcher {
    fn fetch_info(&self, _vpath: &str) {}
    fn fetch_listing(&self, _vpath: &str) {}
    fn fetch_content(&self, _vpath: &str) {
        self.content_requests.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Mock host filesystem ──────────────────────────────────────────────────

struct HostFs {
    dirs: HashMap<String, Vec<DirChild>>,
    files: HashMap<String, Vec<u8>>,
}

impl HostFs {
    fn one_instance() -> Self {
        let mut dirs: HashMap<String, Vec<DirChild>> = HashMap::new();
        dirs.insert(
            "/".to_string(),
            vec![
                DirChild::Entry(FileEntry::directory("chats")),
                DirChild::Entry(FileEntry::directory("debug")),
                DirChild::Entry(FileEntry::directory("invites")),
                DirChild::Entry(FileEntry::directory("objects")),
                DirChild::Entry(FileEntry::directory("types")),
            ],
        );
        dirs.insert(
            "/invites".to_string(),
            vec![DirChild::Entry(FileEntry::file("iom_invite.txt", 260))],
        );

        let mut files: HashMap<String, Vec<u8>> = HashMap::new();
        files.insert("/invites/iom_invite.txt".to_string(), b"abc".to_vec());

        Self { dirs, files }
    }
}

#[async_trait]
impl LogicalFilesystem for HostFs {
    async fn stat(&self, vpath: &str) -> VfsResult<StatInfo> {
        if self.dirs.contains_key(vpath) {
            return Ok(StatInfo {
                size: 0,
                is_directory: Some(true),
                mode: 0o040755,
                hash: None,
            });
        }
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
        self.files
            .get(vpath)
            .cloned()
            .ok_or_else(|| VfsError::NotFound(vpath.to_string()))
    }
}

// ── Harness ───────────────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    cache: Arc<ContentCache>,
    stats: Arc<ProviderStats>,
    enumeration: EnumerationEngine,
    delivery: DataDeliveryEngine,
    resolver: PlaceholderResolver,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let store = Arc::new(ObjectStore::new(dir.path()).unwrap());
        let stats = Arc::new(ProviderStats::new());
        let options = ProjFsOptions::new(dir.path().join("root"), dir.path().to_path_buf())
            .with_enum_load_deadline(Duration::from_secs(2))
            .with_enum_load_poll(Duration::from_millis(10));

        Self {
            enumeration: EnumerationEngine::new(cache.clone(), store.clone(), stats.clone(), &options),
            delivery: DataDeliveryEngine::new(cache.clone(), store.clone(), stats.clone()),
            resolver: PlaceholderResolver::new(cache.clone(), store, stats.clone()),
            _dir: dir,
            cache,
            stats,
        }
    }

    fn write_object(&self, body: &[u8]) {
        std::fs::write(self._dir.path().join("objects").join(HASH), body).unwrap();
    }
}

fn match_all(_name: &str, _pattern: &str) -> bool {
    true
}

fn stream() -> DataStream {
    DataStream {
        context: RawContext(0),
        stream_id: 0xFEED,
    }
}

// ── Scenario 1: cold enumeration of the root through the bridge ──────────

#[test]
fn cold_root_enumeration_yields_mount_points_in_order() {
    let harness = Harness::new();
    let bridge = castfs_projfs::AsyncBridge::start(Arc::new(HostFs::one_instance()), harness.cache.clone());

    harness.enumeration.start_session(1);
    let mut sink = VecSink::new(16);
    harness
        .enumeration
        .read_batch(1, "/", None, false, &match_all, &mut sink, &bridge)
        .unwrap();

    assert_eq!(sink.names(), ["chats", "debug", "invites", "objects", "types"]);
    assert!(sink.filled.iter().all(|(_, is_dir, size)| *is_dir && *size == 0));

    // A subsequent callback returns success with no further entries.
    let mut sink2 = VecSink::new(16);
    harness
        .enumeration
        .read_batch(1, "/", None, false, &match_all, &mut sink2, &bridge)
        .unwrap();
    assert!(sink2.filled.is_empty());

    harness.enumeration.end_session(1);
    bridge.stop();
}

// ── Scenario 2: cached placeholder resolution from the parent listing ────

#[test]
fn placeholder_resolves_from_parent_listing_without_host_call() {
    let harness = Harness::new();
    harness.cache.set_listing(
        "/invites",
        DirListing::new(vec![FileEntry::file("iom_invite.txt", 260)]),
    );

    let fetcher = NullFetcher::default();
    let info = harness
        .resolver
        .resolve("/invites/iom_invite.txt", &fetcher)
        .unwrap();

    assert_eq!(info.size, 260);
    assert!(!info.is_directory);
    assert_eq!(fetcher.content_requests.load(Ordering::SeqCst), 0);
}

// ── Scenario 3: deferred read completed after content arrives ────────────

#[test]
fn deferred_read_completes_once_content_is_cached() {
    let harness = Harness::new();
    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    let result = harness.delivery.read(
        "/invites/iom_invite.txt",
        0,
        64,
        stream(),
        42,
        &port,
        &fetcher,
    );
    assert!(matches!(result, Err(VfsError::IoPending)));
    assert_eq!(harness.delivery.pending_len(), 1);
    assert_eq!(fetcher.content_requests.load(Ordering::SeqCst), 1);
    assert!(port.writes.lock().unwrap().is_empty());

    harness
        .cache
        .set_content("/invites/iom_invite.txt", FileContent::new(b"abc".to_vec()));
    harness
        .delivery
        .complete_pending("/invites/iom_invite.txt", &port);

    let writes = port.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0], (0, b"abc".to_vec()));

    let completions = port.completions.lock().unwrap();
    assert_eq!(completions.as_slice(), &[(42, CompletionOutcome::Success)]);

    assert_eq!(harness.delivery.pending_len(), 0);
}

#[test]
fn deferred_read_without_content_completes_not_found() {
    let harness = Harness::new();
    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    let _ = harness
        .delivery
        .read("/missing.txt", 0, 16, stream(), 7, &port, &fetcher);
    harness.delivery.complete_pending("/missing.txt", &port);

    assert_eq!(
        port.completions.lock().unwrap().as_slice(),
        &[(7, CompletionOutcome::NotFound)]
    );
    assert!(port.writes.lock().unwrap().is_empty());
}

#[test]
fn completion_is_exactly_once_per_command() {
    let harness = Harness::new();
    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    let _ = harness.delivery.read("/a.txt", 0, 8, stream(), 1, &port, &fetcher);
    harness.cache.set_content("/a.txt", FileContent::new(b"x".to_vec()));

    harness.delivery.complete_pending("/a.txt", &port);
    harness.delivery.complete_pending("/a.txt", &port);

    assert_eq!(port.completions.lock().unwrap().len(), 1);
}

#[test]
fn shutdown_fails_pending_requests_as_not_found() {
    let harness = Harness::new();
    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    let _ = harness.delivery.read("/a", 0, 8, stream(), 1, &port, &fetcher);
    let _ = harness.delivery.read("/b", 0, 8, stream(), 2, &port, &fetcher);

    harness.delivery.fail_all_pending(&port);

    let mut completions = port.completions.lock().unwrap().clone();
    completions.sort_by_key(|(id, _)| *id);
    assert_eq!(
        completions,
        [(1, CompletionOutcome::NotFound), (2, CompletionOutcome::NotFound)]
    );
    assert_eq!(harness.delivery.pending_len(), 0);
}

// ── Scenario 4: object-store fast path ───────────────────────────────────

#[test]
fn object_read_is_served_from_disk_without_bridge() {
    let harness = Harness::new();
    harness.write_object(b"raw-body");

    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    harness
        .delivery
        .read(
            &format!("/objects/{}/raw.txt", HASH),
            0,
            1024,
            stream(),
            9,
            &port,
            &fetcher,
        )
        .unwrap();

    assert_eq!(fetcher.content_requests.load(Ordering::SeqCst), 0);
    let writes = port.writes.lock().unwrap();
    assert_eq!(writes.as_slice(), &[(0, b"raw-body".to_vec())]);
    // Served without populating the content cache.
    assert!(harness
        .cache
        .get_content(&format!("/objects/{}/raw.txt", HASH))
        .is_none());
}

#[test]
fn object_listing_and_placeholders_come_from_store() {
    let harness = Harness::new();
    harness.write_object(b"12345");
    let fetcher = NullFetcher::default();

    let dir_info = harness
        .resolver
        .resolve(&format!("/objects/{}", HASH), &fetcher)
        .unwrap();
    assert!(dir_info.is_directory);

    let file_info = harness
        .resolver
        .resolve(&format!("/objects/{}/raw.txt", HASH), &fetcher)
        .unwrap();
    assert_eq!(file_info.size, 5);
}

// ── Boundary behavior on read windows ────────────────────────────────────

#[test]
fn read_past_end_is_successful_and_empty() {
    let harness = Harness::new();
    harness
        .cache
        .set_content("/f", FileContent::new(b"0123456789".to_vec()));

    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    harness
        .delivery
        .read("/f", 10, 64, stream(), 1, &port, &fetcher)
        .unwrap();
    assert!(port.writes.lock().unwrap().is_empty());
}

#[test]
fn read_window_is_clipped_to_size() {
    let harness = Harness::new();
    harness
        .cache
        .set_content("/f", FileContent::new(b"0123456789".to_vec()));

    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();

    harness
        .delivery
        .read("/f", 6, 64, stream(), 1, &port, &fetcher)
        .unwrap();

    let writes = port.writes.lock().unwrap();
    assert_eq!(writes.as_slice(), &[(6, b"6789".to_vec())]);
    assert_eq!(clip_window(10, 6, 64), Some(6..10));
}

// ── Scenario 5: tombstone regeneration cache effects ─────────────────────

#[test]
fn close_deleted_on_generated_file_invalidates_caches_for_refetch() {
    let harness = Harness::new();
    let vpath = "/invites/iom_invite.txt";

    harness.cache.set_listing(
        "/invites",
        DirListing::new(vec![FileEntry::file("iom_invite.txt", 260)]),
    );
    harness
        .cache
        .set_content(vpath, FileContent::new(b"abc".to_vec()));

    // The notification policy classifies close-deleted as observed, and the
    // path is under the regeneration policy.
    assert_eq!(verdict(Notification::CloseDeleted), Verdict::Observe);
    assert!(regenerates(vpath));

    harness.cache.invalidate(vpath);

    // With caches dropped, the next stat goes back through the bridge.
    let fetcher = NullFetcher::default();
    assert!(harness.resolver.resolve(vpath, &fetcher).is_none());
    assert!(harness.cache.get_content(vpath).is_none());
    assert!(harness.cache.get_listing("/invites").is_none());

    // Object-store paths are immutable and never regenerated.
    assert!(!regenerates(&format!("/objects/{}/raw.txt", HASH)));
}

// ── Scenario 6: write barrier ────────────────────────────────────────────

#[test]
fn write_class_notifications_are_denied_and_leave_caches_untouched() {
    let harness = Harness::new();
    let entries_before = harness.cache.stats().entries;

    for notification in [
        Notification::NewFileCreated,
        Notification::FileOverwritten,
        Notification::PreDelete,
        Notification::PreRename,
        Notification::PreSetHardlink,
    ] {
        assert_eq!(verdict(notification), Verdict::Deny);
    }

    assert_eq!(harness.cache.stats().entries, entries_before);
}

// ── Stats plumbing across a flow ─────────────────────────────────────────

#[test]
fn stats_count_requests_and_bytes() {
    let harness = Harness::new();
    harness
        .cache
        .set_content("/f", FileContent::new(b"abcdef".to_vec()));

    let port = RecordingPort::default();
    let fetcher = NullFetcher::default();
    harness
        .delivery
        .read("/f", 0, 4, stream(), 1, &port, &fetcher)
        .unwrap();

    let snapshot = harness.stats.snapshot();
    assert_eq!(snapshot.file_data_requests, 1);
    assert_eq!(snapshot.bytes_read, 4);
    assert_eq!(snapshot.cache_hits, 1);
}
