//! Configuration options for the ProjFS provider.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a projection instance.
#[derive(Debug, Clone)]
pub struct ProjFsOptions {
    /// Virtualization root path (the directory projected into Explorer).
    pub root_path: PathBuf,

    /// Root directory of the content-addressed object store.
    pub store_path: PathBuf,

    /// Liveness window for the content cache.
    pub cache_ttl: Duration,

    /// Deadline for an enumeration waiting on a listing fetch.
    pub enum_load_deadline: Duration,

    /// Cache poll period while waiting on a listing fetch.
    pub enum_load_poll: Duration,

    /// Per-session callback ceiling; past it the enumeration answers empty
    /// to break kernel-side retry loops.
    pub enum_call_ceiling: u32,

    /// ProjFS pool thread count (0 = let ProjFS decide).
    pub pool_thread_count: u32,

    /// ProjFS concurrent thread count (0 = let ProjFS decide).
    pub concurrent_thread_count: u32,
}

impl ProjFsOptions {
    /// Create options with the given projection root and store path.
    ///
    /// # Arguments
    /// * `root_path` - Virtualization root directory
    /// * `store_path` - Object store instance directory
    pub fn new(root_path: PathBuf, store_path: PathBuf) -> Self {
        Self {
            root_path,
            store_path,
            cache_ttl: Duration::from_secs(3600),
            enum_load_deadline: Duration::from_secs(5),
            enum_load_poll: Duration::from_millis(100),
            enum_call_ceiling: 100,
            pool_thread_count: 0,
            concurrent_thread_count: 0,
        }
    }

    /// Build options from a parsed configuration file.
    pub fn from_config(config: &castfs_vfs::ProviderConfig) -> Self {
        let mut options: ProjFsOptions = Self::new(
            config.virtual_root.clone(),
            config.instance_path.clone(),
        );
        options.cache_ttl = config.cache_ttl();
        options
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the enumeration load deadline.
    pub fn with_enum_load_deadline(mut self, deadline: Duration) -> Self {
        self.enum_load_deadline = deadline;
        self
    }

    /// Set the enumeration cache poll period.
    pub fn with_enum_load_poll(mut self, poll: Duration) -> Self {
        self.enum_load_poll = poll;
        self
    }

    /// Set the per-session callback ceiling.
    pub fn with_enum_call_ceiling(mut self, ceiling: u32) -> Self {
        self.enum_call_ceiling = ceiling;
        self
    }
}
