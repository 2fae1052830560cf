//! Placeholder resolution: "does this path exist, and with what metadata".
//!
//! The kernel asks before it creates an on-disk placeholder, and the call
//! sits on Explorer's synchronous critical path — a suspended answer here
//! shows up as a hung window. The resolver therefore only ever answers from
//! what it can reach synchronously (cache, parent listing, object store);
//! on a miss it kicks off an async info fetch and reports not-found, letting
//! the next access succeed from cache.

use std::sync::Arc;

use castfs_store::ObjectStore;
use castfs_vfs::{path, ContentCache, Fetcher};

use crate::stats::ProviderStats;

/// Metadata written into a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderInfo {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Directory flag.
    pub is_directory: bool,
}

impl PlaceholderInfo {
    fn directory() -> Self {
        Self {
            size: 0,
            is_directory: true,
        }
    }

    fn file(size: u64) -> Self {
        Self {
            size,
            is_directory: false,
        }
    }
}

/// Answers GetPlaceholderInfo from cache and object store.
pub struct PlaceholderResolver {
    cache: Arc<ContentCache>,
    store: Arc<ObjectStore>,
    stats: Arc<ProviderStats>,
}

impl PlaceholderResolver {
    /// Create a resolver over the shared cache and store.
    pub fn new(cache: Arc<ContentCache>, store: Arc<ObjectStore>, stats: Arc<ProviderStats>) -> Self {
        Self {
            cache,
            store,
            stats,
        }
    }

    /// Resolve a canonical path to placeholder metadata.
    ///
    /// Resolution order: root-level mount points via the cached root
    /// listing, the per-path info cache, the parent's cached listing, the
    /// object store; otherwise an async fetch is triggered and the call
    /// reports not-found.
    pub fn resolve(&self, vpath: &str, fetcher: &dyn Fetcher) -> Option<PlaceholderInfo> {
        ProviderStats::bump(&self.stats.placeholder_requests);

        // Dynamically mounted top-level namespaces: answered from the root
        // listing so nothing is hardcoded.
        if path::is_single_segment(vpath) {
            if let Some(root) = self.cache.get_listing("/") {
                let name: &str = path::file_name(vpath);
                if let Some(entry) = root.find(name) {
                    if entry.is_directory {
                        ProviderStats::bump(&self.stats.cache_hits);
                        tracing::debug!(path = %vpath, "root mount point");
                        return Some(PlaceholderInfo::directory());
                    }
                }
            }
        }

        if let Some(info) = self.cache.get_info(vpath) {
            ProviderStats::bump(&self.stats.cache_hits);
            return Some(if info.is_directory {
                PlaceholderInfo::directory()
            } else {
                PlaceholderInfo::file(info.size)
            });
        }

        if let Some(parent) = path::parent(vpath) {
            if let Some(listing) = self.cache.get_listing(parent) {
                if let Some(entry) = listing.find(path::file_name(vpath)) {
                    ProviderStats::bump(&self.stats.cache_hits);
                    tracing::debug!(path = %vpath, size = entry.size, "resolved from parent listing");
                    return Some(if entry.is_directory {
                        PlaceholderInfo::directory()
                    } else {
                        PlaceholderInfo::file(entry.size)
                    });
                }
            }
        }

        ProviderStats::bump(&self.stats.cache_misses);

        if ObjectStore::is_object_path(vpath) {
            let meta = self.store.virtual_metadata(vpath);
            if meta.exists {
                return Some(if meta.is_directory {
                    PlaceholderInfo::directory()
                } else {
                    PlaceholderInfo::file(meta.size)
                });
            }
        }

        // Populate the cache for the next access. Deliberately not deferred:
        // a pending placeholder query hangs Explorer.
        fetcher.fetch_info(vpath);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castfs_vfs::{DirListing, FileEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingFetcher {
        info_requests: AtomicUsize,
    }

    impl Fetcher for RecordingFetcher {
        fn fetch_info(&self, _vpath: &str) {
            self.info_requests.fetch_add(1, Ordering::SeqCst);
        }
        fn fetch_listing(&self, _vpath: &str) {}
        fn fetch_content(&self, _vpath: &str) {}
    }

    fn resolver() -> (TempDir, PlaceholderResolver, Arc<ContentCache>) {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ContentCache::new(Duration::from_secs(3600)));
        let store = Arc::new(ObjectStore::new(dir.path()).unwrap());
        let resolver =
            PlaceholderResolver::new(cache.clone(), store, Arc::new(ProviderStats::new()));
        (dir, resolver, cache)
    }

    #[test]
    fn root_mount_point_from_root_listing() {
        let (_dir, resolver, cache) = resolver();
        cache.set_listing(
            "/",
            DirListing::new(vec![FileEntry::directory("invites"), FileEntry::file("x", 1)]),
        );
        let fetcher = RecordingFetcher::default();

        let info = resolver.resolve("/invites", &fetcher).unwrap();
        assert!(info.is_directory);
        assert_eq!(info.size, 0);

        // A root-level plain file does not take the mount-point path but
        // still resolves through the parent listing.
        let info = resolver.resolve("/x", &fetcher).unwrap();
        assert!(!info.is_directory);
        assert_eq!(fetcher.info_requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn per_path_info_cache_wins() {
        let (_dir, resolver, cache) = resolver();
        cache.set_info("/invites/iom_invite.txt", FileEntry::file("iom_invite.txt", 260));
        let fetcher = RecordingFetcher::default();

        let info = resolver.resolve("/invites/iom_invite.txt", &fetcher).unwrap();
        assert_eq!(info.size, 260);
        assert!(!info.is_directory);
    }

    #[test]
    fn parent_listing_synthesizes_metadata() {
        let (_dir, resolver, cache) = resolver();
        cache.set_listing(
            "/invites",
            DirListing::new(vec![FileEntry::file("iom_invite.txt", 260)]),
        );
        let fetcher = RecordingFetcher::default();

        let info = resolver.resolve("/invites/iom_invite.txt", &fetcher).unwrap();
        assert_eq!(info.size, 260);
        assert!(!info.is_directory);
        assert_eq!(fetcher.info_requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn object_store_answers_object_paths() {
        let (dir, resolver, _cache) = resolver();
        let hash = "ab".repeat(32);
        std::fs::write(dir.path().join("objects").join(&hash), b"12345").unwrap();
        let fetcher = RecordingFetcher::default();

        let dir_info = resolver.resolve(&format!("/objects/{}", hash), &fetcher).unwrap();
        assert!(dir_info.is_directory);

        let file_info = resolver
            .resolve(&format!("/objects/{}/raw.txt", hash), &fetcher)
            .unwrap();
        assert!(!file_info.is_directory);
        assert_eq!(file_info.size, 5);
    }

    #[test]
    fn miss_triggers_fetch_and_reports_not_found() {
        let (_dir, resolver, _cache) = resolver();
        let fetcher = RecordingFetcher::default();

        assert!(resolver.resolve("/chats/hello.txt", &fetcher).is_none());
        assert_eq!(fetcher.info_requests.load(Ordering::SeqCst), 1);
    }
}
