//! Provider statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for a provider instance.
///
/// Counters are relaxed atomics: they are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct ProviderStats {
    /// GetPlaceholderInfo callbacks received.
    pub placeholder_requests: AtomicU64,
    /// GetFileData callbacks received.
    pub file_data_requests: AtomicU64,
    /// Enumeration sessions started.
    pub directory_enumerations: AtomicU64,
    /// GetDirectoryEnumeration callbacks received.
    pub enumeration_callbacks: AtomicU64,
    /// Enumeration sessions currently open.
    pub active_enumerations: AtomicU64,
    /// Bytes served through the data-write path.
    pub bytes_read: AtomicU64,
    /// Requests answered from cache or store.
    pub cache_hits: AtomicU64,
    /// Requests that had to go through the bridge.
    pub cache_misses: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub placeholder_requests: u64,
    pub file_data_requests: u64,
    pub directory_enumerations: u64,
    pub enumeration_callbacks: u64,
    pub active_enumerations: u64,
    pub bytes_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ProviderStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add served bytes.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Decrement the active-enumeration gauge.
    pub fn enumeration_closed(&self) {
        self.active_enumerations.fetch_sub(1, Ordering::Relaxed);
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            placeholder_requests: self.placeholder_requests.load(Ordering::Relaxed),
            file_data_requests: self.file_data_requests.load(Ordering::Relaxed),
            directory_enumerations: self.directory_enumerations.load(Ordering::Relaxed),
            enumeration_callbacks: self.enumeration_callbacks.load(Ordering::Relaxed),
            active_enumerations: self.active_enumerations.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_bumps() {
        let stats = ProviderStats::new();
        ProviderStats::bump(&stats.placeholder_requests);
        ProviderStats::bump(&stats.placeholder_requests);
        stats.add_bytes(512);

        let snap: StatsSnapshot = stats.snapshot();
        assert_eq!(snap.placeholder_requests, 2);
        assert_eq!(snap.bytes_read, 512);
        assert_eq!(snap.file_data_requests, 0);
    }

    #[test]
    fn active_gauge_goes_up_and_down() {
        let stats = ProviderStats::new();
        ProviderStats::bump(&stats.active_enumerations);
        ProviderStats::bump(&stats.active_enumerations);
        stats.enumeration_closed();

        assert_eq!(stats.snapshot().active_enumerations, 1);
    }
}
