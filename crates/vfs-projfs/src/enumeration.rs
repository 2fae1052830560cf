//! Directory enumeration engine.
//!
//! ProjFS delivers a directory listing through a three-callback protocol:
//! Start creates a session, any number of Get callbacks page entries into
//! kernel buffers, End tears the session down. The engine keeps one
//! [`EnumSession`] per opaque 128-bit session id and guarantees stable order
//! across callbacks: the listing is captured once into the session, so a
//! later re-cache of the same path never disturbs an in-flight enumeration.
//!
//! Session states: FRESH on Start; LOADING while the first Get fetches the
//! listing; READY once captured; EXHAUSTED when the cursor reaches the end.
//! A restart-scan flag returns any state to FRESH. Loading releases the
//! session lock, consults the cache, then the object store for object-space
//! paths, and otherwise asks the bridge and polls the cache on a short
//! period up to a bounded deadline; concurrent Get callbacks for the same
//! session wait on the condition variable instead of fetching twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use castfs_store::{ObjectStore, StoreEntry};
use castfs_vfs::{ContentCache, Fetcher, FileEntry, VfsResult};

use crate::options::ProjFsOptions;
use crate::stats::ProviderStats;

/// Result of offering one entry to the kernel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Entry written; advance the cursor.
    Accepted,
    /// Buffer is full; retry the same entry on the next callback.
    BufferFull,
    /// Entry could not be written; skip it.
    Rejected,
}

/// Destination for paged entries (the kernel dir-entry buffer on Windows).
pub trait EntrySink {
    /// Offer one entry.
    fn fill(&mut self, entry: &FileEntry) -> SinkStatus;
}

/// Per-session enumeration state.
#[derive(Debug, Default)]
struct EnumSession {
    /// Captured entry list; empty until loading completes.
    entries: Vec<FileEntry>,
    /// Next entry to offer. Never regresses except on restart-scan.
    cursor: usize,
    /// A callback is currently fetching the listing.
    loading: bool,
    /// The capture attempt finished (possibly with an empty list).
    complete: bool,
    /// Callback counter; the loop fuse.
    call_count: u32,
}

/// Delivers directory listings of arbitrary size across kernel callbacks.
pub struct EnumerationEngine {
    sessions: Mutex<HashMap<u128, EnumSession>>,
    loading_done: Condvar,
    cache: Arc<ContentCache>,
    store: Arc<ObjectStore>,
    stats: Arc<ProviderStats>,
    load_deadline: Duration,
    load_poll: Duration,
    call_ceiling: u32,
}

impl EnumerationEngine {
    /// Create an engine over the shared cache and store.
    pub fn new(
        cache: Arc<ContentCache>,
        store: Arc<ObjectStore>,
        stats: Arc<ProviderStats>,
        options: &ProjFsOptions,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            loading_done: Condvar::new(),
            cache,
            store,
            stats,
            load_deadline: options.enum_load_deadline,
            load_poll: options.enum_load_poll,
            call_ceiling: options.enum_call_ceiling,
        }
    }

    /// Start a session (StartDirectoryEnumeration).
    pub fn start_session(&self, session_id: u128) {
        ProviderStats::bump(&self.stats.directory_enumerations);
        ProviderStats::bump(&self.stats.active_enumerations);

        let mut sessions = self.sessions.lock();
        if sessions.insert(session_id, EnumSession::default()).is_some() {
            tracing::warn!(session = format_args!("{:032x}", session_id), "enumeration id collision");
        }
    }

    /// End a session (EndDirectoryEnumeration).
    pub fn end_session(&self, session_id: u128) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.remove(&session_id) {
            tracing::debug!(
                session = format_args!("{:032x}", session_id),
                served = session.cursor,
                total = session.entries.len(),
                "enumeration ended"
            );
        }
        drop(sessions);
        self.stats.enumeration_closed();
        // A removed session unblocks anyone waiting on its load.
        self.loading_done.notify_all();
    }

    /// A listing resolution landed in the cache; wake waiting callbacks.
    pub fn notify_listing_updated(&self, vpath: &str) {
        tracing::debug!(path = %vpath, "listing updated");
        self.loading_done.notify_all();
    }

    /// Page entries into `sink` (GetDirectoryEnumeration).
    ///
    /// # Arguments
    /// * `session_id` - Opaque session id from the kernel
    /// * `vpath` - Canonical path being enumerated
    /// * `pattern` - Kernel-supplied search expression, if any
    /// * `restart` - Restart-scan flag from the callback data
    /// * `matches` - Platform file-name-match function
    /// * `sink` - Kernel buffer adapter
    /// * `fetcher` - Bridge used when the listing is not cached
    pub fn read_batch(
        &self,
        session_id: u128,
        vpath: &str,
        pattern: Option<&str>,
        restart: bool,
        matches: &dyn Fn(&str, &str) -> bool,
        sink: &mut dyn EntrySink,
        fetcher: &dyn Fetcher,
    ) -> VfsResult<()> {
        ProviderStats::bump(&self.stats.enumeration_callbacks);

        let mut sessions: MutexGuard<'_, HashMap<u128, EnumSession>> = self.sessions.lock();

        if !sessions.contains_key(&session_id) {
            // Start should have created it; recover rather than fail the call.
            tracing::warn!(
                session = format_args!("{:032x}", session_id),
                path = %vpath,
                "enumeration callback without a session"
            );
            sessions.insert(session_id, EnumSession::default());
        }

        {
            let session: &mut EnumSession = sessions.get_mut(&session_id).expect("session present");

            if restart {
                tracing::debug!(path = %vpath, "restart scan");
                *session = EnumSession::default();
            }

            session.call_count += 1;
            if session.call_count > self.call_ceiling {
                tracing::warn!(
                    path = %vpath,
                    calls = session.call_count,
                    "enumeration call ceiling reached, answering empty"
                );
                return Ok(());
            }
        }

        // Capture the listing if this session has none yet.
        loop {
            let (has_entries, complete, loading) = match sessions.get(&session_id) {
                Some(session) => (
                    !session.entries.is_empty(),
                    session.complete,
                    session.loading,
                ),
                None => return Ok(()), // Ended while we waited.
            };

            if has_entries || complete {
                break;
            }

            if loading {
                // Another callback is fetching; wait for it.
                let deadline: Instant = Instant::now() + self.load_deadline;
                loop {
                    let remaining: Duration = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(());
                    }
                    self.loading_done.wait_for(&mut sessions, remaining);
                    match sessions.get(&session_id) {
                        None => return Ok(()),
                        Some(session) if session.loading => continue,
                        Some(_) => break,
                    }
                }
                continue; // Re-inspect: capture may or may not have landed.
            }

            if let Some(session) = sessions.get_mut(&session_id) {
                session.loading = true;
            }
            let captured: Vec<FileEntry> =
                MutexGuard::unlocked(&mut sessions, || self.load_entries(vpath, fetcher));

            if let Some(session) = sessions.get_mut(&session_id) {
                if session.entries.is_empty() && !session.complete {
                    session.entries = captured;
                }
                session.loading = false;
                session.complete = true;
            }
            self.loading_done.notify_all();
            break;
        }

        // Page from the cursor forward.
        let session: &mut EnumSession = match sessions.get_mut(&session_id) {
            Some(session) => session,
            None => return Ok(()),
        };

        if session.cursor >= session.entries.len() {
            session.complete = true;
            return Ok(());
        }

        while session.cursor < session.entries.len() {
            let entry: &FileEntry = &session.entries[session.cursor];

            if entry.name.is_empty() {
                session.cursor += 1;
                continue;
            }

            if let Some(pattern) = pattern {
                if !pattern.is_empty() && !matches(&entry.name, pattern) {
                    session.cursor += 1;
                    continue;
                }
            }

            match sink.fill(entry) {
                SinkStatus::Accepted => session.cursor += 1,
                SinkStatus::BufferFull => break, // Same entry retried next call.
                SinkStatus::Rejected => {
                    tracing::warn!(path = %vpath, name = %entry.name, "dir entry rejected, skipping");
                    session.cursor += 1;
                }
            }
        }

        Ok(())
    }

    /// Capture the entry list for a path: cache, then object store, then a
    /// bridge fetch polled against the cache up to the deadline.
    fn load_entries(&self, vpath: &str, fetcher: &dyn Fetcher) -> Vec<FileEntry> {
        if let Some(listing) = self.cache.get_listing(vpath) {
            ProviderStats::bump(&self.stats.cache_hits);
            return listing.entries;
        }
        ProviderStats::bump(&self.stats.cache_misses);

        if ObjectStore::is_object_path(vpath) {
            let entries: Vec<FileEntry> = self
                .store
                .list_virtual(vpath)
                .unwrap_or_default()
                .into_iter()
                .map(store_entry_to_file_entry)
                .collect();
            tracing::debug!(path = %vpath, entries = entries.len(), "object-store listing");
            return entries;
        }

        fetcher.fetch_listing(vpath);

        let deadline: Instant = Instant::now() + self.load_deadline;
        loop {
            if let Some(listing) = self.cache.get_listing(vpath) {
                ProviderStats::bump(&self.stats.cache_hits);
                tracing::debug!(path = %vpath, entries = listing.entries.len(), "listing fetched");
                return listing.entries;
            }
            if Instant::now() >= deadline {
                tracing::warn!(path = %vpath, "timed out waiting for directory listing");
                return Vec::new();
            }
            std::thread::sleep(self.load_poll);
        }
    }

    /// Open session count (diagnostics).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

fn store_entry_to_file_entry(entry: StoreEntry) -> FileEntry {
    FileEntry {
        name: entry.name,
        hash: None,
        size: entry.size,
        is_directory: entry.is_directory,
        mode: 0,
        blob_direct: !entry.is_directory,
    }
}
