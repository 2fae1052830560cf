//! Tiered content cache: the synchronous-response buffer.
//!
//! Three maps keyed by canonical path — file info, directory listings, file
//! content — each entry stamped with a monotonic timestamp and live while its
//! age is under the TTL. ProjFS callbacks read under a shared lock; the async
//! bridge (and the embedding host) write under an exclusive lock. Content
//! entries above [`CONTENT_ENTRY_LIMIT`] are not retained, which bounds
//! resident memory; large bodies are re-fetched on demand instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::path;
use crate::types::{DirListing, FileContent, FileEntry};

/// Content entries larger than this are silently not retained.
pub const CONTENT_ENTRY_LIMIT: usize = 1024 * 1024;

/// Expired-entry sweep runs on every Nth info insert.
const SWEEP_EVERY_INFO_SETS: u64 = 100;

/// Soft ceiling on cached listings before a sweep is forced.
const LISTING_SOFT_CEILING: usize = 1000;

/// Soft ceiling on cached content bodies before a sweep is forced.
const CONTENT_SOFT_CEILING: usize = 100;

struct Stamped<T> {
    value: T,
    stamp: Instant,
}

impl<T> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stamp: Instant::now(),
        }
    }

    fn live(&self, ttl: Duration) -> bool {
        self.stamp.elapsed() < ttl
    }
}

struct Maps {
    infos: HashMap<String, Stamped<FileEntry>>,
    listings: HashMap<String, Stamped<DirListing>>,
    contents: HashMap<String, Stamped<FileContent>>,
    ttl: Duration,
    info_sets: u64,
}

impl Maps {
    fn sweep(&mut self) {
        let ttl: Duration = self.ttl;
        self.infos.retain(|_, e| e.live(ttl));
        self.listings.retain(|_, e| e.live(ttl));
        self.contents.retain(|_, e| e.live(ttl));
    }
}

/// Running cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a live entry.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Total entries across all three maps.
    pub entries: usize,
    /// Estimated resident bytes.
    pub approx_bytes: usize,
}

/// Thread-safe, TTL-bounded cache of file info, listings, and content.
pub struct ContentCache {
    maps: RwLock<Maps>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    /// Create a cache with the given liveness window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            maps: RwLock::new(Maps {
                infos: HashMap::new(),
                listings: HashMap::new(),
                contents: HashMap::new(),
                ttl,
                info_sets: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Store file info for a path.
    pub fn set_info(&self, vpath: &str, info: FileEntry) {
        let mut maps = self.maps.write();
        maps.infos.insert(vpath.to_string(), Stamped::new(info));
        maps.info_sets += 1;
        if maps.info_sets % SWEEP_EVERY_INFO_SETS == 0 {
            maps.sweep();
        }
    }

    /// Fetch live file info for a path.
    pub fn get_info(&self, vpath: &str) -> Option<FileEntry> {
        let maps = self.maps.read();
        match maps.infos.get(vpath) {
            Some(entry) if entry.live(maps.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a directory listing. The listing replaces any previous value
    /// atomically; readers never observe a partial update.
    pub fn set_listing(&self, vpath: &str, listing: DirListing) {
        let mut maps = self.maps.write();
        tracing::debug!(path = %vpath, entries = listing.entries.len(), "cache listing");
        maps.listings.insert(vpath.to_string(), Stamped::new(listing));
        if maps.listings.len() > LISTING_SOFT_CEILING {
            maps.sweep();
        }
    }

    /// Fetch a live directory listing for a path.
    pub fn get_listing(&self, vpath: &str) -> Option<DirListing> {
        let maps = self.maps.read();
        match maps.listings.get(vpath) {
            Some(entry) if entry.live(maps.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store file content. Bodies above [`CONTENT_ENTRY_LIMIT`] are ignored.
    pub fn set_content(&self, vpath: &str, content: FileContent) {
        if content.len() > CONTENT_ENTRY_LIMIT {
            tracing::debug!(path = %vpath, bytes = content.len(), "content above cache limit, not retained");
            return;
        }
        let mut maps = self.maps.write();
        maps.contents.insert(vpath.to_string(), Stamped::new(content));
        if maps.contents.len() > CONTENT_SOFT_CEILING {
            maps.sweep();
        }
    }

    /// Fetch live file content for a path.
    pub fn get_content(&self, vpath: &str) -> Option<FileContent> {
        let maps = self.maps.read();
        match maps.contents.get(vpath) {
            Some(entry) if entry.live(maps.ttl) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove a path from all three maps, and the cached listing of its
    /// parent — the parent's listing would otherwise keep resurrecting the
    /// stale child. Idempotent.
    pub fn invalidate(&self, vpath: &str) {
        let mut maps = self.maps.write();
        maps.infos.remove(vpath);
        maps.listings.remove(vpath);
        maps.contents.remove(vpath);
        if let Some(parent) = path::parent(vpath) {
            maps.listings.remove(parent);
        }
    }

    /// Clear all maps.
    pub fn invalidate_all(&self) {
        let mut maps = self.maps.write();
        maps.infos.clear();
        maps.listings.clear();
        maps.contents.clear();
    }

    /// Change the liveness window for subsequent reads.
    pub fn set_ttl(&self, ttl: Duration) {
        self.maps.write().ttl = ttl;
    }

    /// Running counters plus an estimate of resident memory.
    pub fn stats(&self) -> CacheStats {
        let maps = self.maps.read();

        let mut approx: usize = 0;
        for (key, entry) in &maps.infos {
            approx += key.len() + entry.value.name.len() + entry.value.hash.as_ref().map_or(0, String::len);
        }
        for (key, entry) in &maps.listings {
            approx += key.len() + entry.value.approx_bytes();
        }
        for (key, entry) in &maps.contents {
            approx += key.len() + entry.value.len();
        }

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: maps.infos.len() + maps.listings.len() + maps.contents.len(),
            approx_bytes: approx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hour() -> Duration {
        Duration::from_secs(3600)
    }

    #[test]
    fn info_round_trip() {
        let cache = ContentCache::new(hour());
        let info = FileEntry::file("iom_invite.txt", 260);
        cache.set_info("/invites/iom_invite.txt", info.clone());
        assert_eq!(cache.get_info("/invites/iom_invite.txt"), Some(info));
    }

    #[test]
    fn listing_round_trip() {
        let cache = ContentCache::new(hour());
        let listing = DirListing::new(vec![FileEntry::directory("chats"), FileEntry::file("a", 1)]);
        cache.set_listing("/", listing.clone());
        assert_eq!(cache.get_listing("/"), Some(listing));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ContentCache::new(Duration::from_millis(20));
        cache.set_info("/x", FileEntry::file("x", 1));
        thread::sleep(Duration::from_millis(50));
        assert!(cache.get_info("/x").is_none());
    }

    #[test]
    fn ttl_change_applies_to_reads() {
        let cache = ContentCache::new(Duration::from_millis(10));
        cache.set_info("/x", FileEntry::file("x", 1));
        thread::sleep(Duration::from_millis(30));
        cache.set_ttl(hour());
        assert!(cache.get_info("/x").is_some());
    }

    #[test]
    fn oversize_content_not_retained() {
        let cache = ContentCache::new(hour());
        let big = vec![0u8; CONTENT_ENTRY_LIMIT + 1];
        cache.set_content("/big", FileContent::new(big));
        assert!(cache.get_content("/big").is_none());

        let small = vec![1u8; 16];
        cache.set_content("/small", FileContent::new(small));
        assert!(cache.get_content("/small").is_some());
    }

    #[test]
    fn invalidate_removes_entry_and_parent_listing() {
        let cache = ContentCache::new(hour());
        cache.set_info("/invites/a.txt", FileEntry::file("a.txt", 3));
        cache.set_content("/invites/a.txt", FileContent::new(vec![1, 2, 3]));
        cache.set_listing("/invites", DirListing::new(vec![FileEntry::file("a.txt", 3)]));

        cache.invalidate("/invites/a.txt");

        assert!(cache.get_info("/invites/a.txt").is_none());
        assert!(cache.get_content("/invites/a.txt").is_none());
        assert!(cache.get_listing("/invites").is_none());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let cache = ContentCache::new(hour());
        cache.set_info("/x", FileEntry::file("x", 1));
        cache.invalidate("/x");
        cache.invalidate("/x");
        assert!(cache.get_info("/x").is_none());
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = ContentCache::new(hour());
        cache.set_info("/a", FileEntry::file("a", 1));
        cache.set_listing("/", DirListing::default());
        cache.set_content("/a", FileContent::new(vec![0]));

        cache.invalidate_all();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ContentCache::new(hour());
        cache.set_info("/a", FileEntry::file("a", 1));
        let _ = cache.get_info("/a");
        let _ = cache.get_info("/missing");

        let stats: CacheStats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.approx_bytes > 0);
    }
}
