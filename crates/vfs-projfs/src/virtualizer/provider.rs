//! ProjFS provider lifecycle.
//!
//! Owns the virtualization instance: marks the projection root, registers
//! the callback set and whole-tree notification mask, starts the async
//! bridge, and tears everything down in LIFO order on stop. Also carries the
//! host-facing surface recovered from the original embedding: cache
//! pre-population, pending-request completion, tombstone invalidation, and
//! diagnostics.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_REPARSE_POINT_ENCOUNTERED};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjDeleteFile, PrjMarkDirectoryAsPlaceholder, PrjStartVirtualizing, PrjStopVirtualizing,
    PRJ_NOTIFICATION_MAPPING, PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_DELETED,
    PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_MODIFIED, PRJ_NOTIFY_FILE_OVERWRITTEN,
    PRJ_NOTIFY_FILE_RENAMED, PRJ_NOTIFY_HARDLINK_CREATED, PRJ_NOTIFY_NEW_FILE_CREATED,
    PRJ_NOTIFY_PRE_DELETE, PRJ_NOTIFY_PRE_RENAME, PRJ_NOTIFY_PRE_SET_HARDLINK, PRJ_NOTIFY_TYPES,
    PRJ_STARTVIRTUALIZING_FLAGS, PRJ_STARTVIRTUALIZING_OPTIONS,
};

use castfs_store::ObjectStore;
use castfs_vfs::{
    path, AsyncBridge, ContentCache, DirChild, DirListing, FileContent, FileEntry,
    LogicalFilesystem, VfsError, VfsResult,
};

use crate::delivery::DataDeliveryEngine;
use crate::enumeration::EnumerationEngine;
use crate::options::ProjFsOptions;
use crate::resolver::PlaceholderResolver;
use crate::stats::{ProviderStats, StatsSnapshot};
use crate::util::wstr::string_to_wide;
use crate::virtualizer::callbacks::{build_callbacks, CallbackContext};
use crate::virtualizer::ports::ProjFsDataPort;
use crate::virtualizer::sendable::SendableContext;

struct RunningState {
    namespace: SendableContext,
    bridge: Arc<AsyncBridge>,
    /// Instance context handed to ProjFS; freed after PrjStopVirtualizing.
    context_ptr: *mut CallbackContext,
}

/// The virtualization host.
pub struct ProjFsProvider {
    options: ProjFsOptions,
    fs: Arc<dyn LogicalFilesystem>,
    cache: Arc<ContentCache>,
    store: Arc<ObjectStore>,
    stats: Arc<ProviderStats>,
    enumeration: Arc<EnumerationEngine>,
    delivery: Arc<DataDeliveryEngine>,
    resolver: Arc<PlaceholderResolver>,
    running: RwLock<Option<RunningState>>,
    last_error: RwLock<Option<String>>,
}

// The raw context pointer is only touched under the `running` lock, and the
// platform handles it wraps are documented cross-thread-safe.
unsafe impl Send for ProjFsProvider {}
unsafe impl Sync for ProjFsProvider {}

impl ProjFsProvider {
    /// Create a provider over a logical filesystem and the configured
    /// object store. Nothing is projected until [`start`](Self::start).
    pub fn new(fs: Arc<dyn LogicalFilesystem>, options: ProjFsOptions) -> VfsResult<Self> {
        let cache: Arc<ContentCache> = Arc::new(ContentCache::new(options.cache_ttl));
        let store: Arc<ObjectStore> = Arc::new(ObjectStore::new(&options.store_path)?);
        let stats: Arc<ProviderStats> = Arc::new(ProviderStats::new());

        let enumeration: Arc<EnumerationEngine> = Arc::new(EnumerationEngine::new(
            cache.clone(),
            store.clone(),
            stats.clone(),
            &options,
        ));
        let delivery: Arc<DataDeliveryEngine> = Arc::new(DataDeliveryEngine::new(
            cache.clone(),
            store.clone(),
            stats.clone(),
        ));
        let resolver: Arc<PlaceholderResolver> = Arc::new(PlaceholderResolver::new(
            cache.clone(),
            store.clone(),
            stats.clone(),
        ));

        Ok(Self {
            options,
            fs,
            cache,
            store,
            stats,
            enumeration,
            delivery,
            resolver,
            running: RwLock::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Start projecting: mark the root, register callbacks, start the
    /// bridge, begin virtualization.
    pub fn start(&self) -> VfsResult<()> {
        let mut running = self.running.write();
        if running.is_some() {
            self.record_error("already running");
            return Err(VfsError::Busy);
        }

        std::fs::create_dir_all(&self.options.root_path)?;

        // Residual projection state from a crashed previous instance makes
        // the kernel silently ignore the new instance's callbacks.
        clear_stale_projection_state(&self.options.root_path);

        let instance_id: GUID = GUID::new().map_err(|e| {
            self.record_error(&format!("GUID generation failed: {e}"));
            VfsError::Platform {
                operation: "CoCreateGuid".to_string(),
                code: e.code().0,
            }
        })?;

        let root: String = self.options.root_path.to_string_lossy().into_owned();
        let root_wide: Vec<u16> = string_to_wide(&root);

        let marked = unsafe {
            PrjMarkDirectoryAsPlaceholder(
                PCWSTR::from_raw(root_wide.as_ptr()),
                PCWSTR::null(),
                None,
                &instance_id,
            )
        };
        if let Err(e) = marked {
            // An existing projection root surfaces as a reparse point; that
            // is the expected state on restart.
            if e.code() != windows::core::HRESULT::from(ERROR_REPARSE_POINT_ENCOUNTERED) {
                self.record_error(&format!("PrjMarkDirectoryAsPlaceholder failed: 0x{:08X}", e.code().0));
                return Err(VfsError::Platform {
                    operation: "PrjMarkDirectoryAsPlaceholder".to_string(),
                    code: e.code().0,
                });
            }
        }
        tracing::info!(root = %root, "projection root marked");

        // The bridge comes up before virtualization so the first callback
        // already has somewhere to send fetches.
        let bridge: Arc<AsyncBridge> = Arc::new(AsyncBridge::start(self.fs.clone(), self.cache.clone()));

        let enumeration: Arc<EnumerationEngine> = self.enumeration.clone();
        bridge.set_on_listing_updated(move |vpath| {
            enumeration.notify_listing_updated(vpath);
        });

        let delivery: Arc<DataDeliveryEngine> = self.delivery.clone();
        bridge.set_on_content_ready(move |vpath| {
            delivery.complete_pending(vpath, &ProjFsDataPort);
        });

        let context = Box::new(CallbackContext::new(
            self.enumeration.clone(),
            self.delivery.clone(),
            self.resolver.clone(),
            self.cache.clone(),
            bridge.clone(),
        ));
        let context_ptr: *mut CallbackContext = Box::into_raw(context);

        let callbacks = build_callbacks();
        let mut mappings: [PRJ_NOTIFICATION_MAPPING; 1] = [PRJ_NOTIFICATION_MAPPING {
            NotificationBitMask: write_barrier_mask(),
            // Null root applies the mapping to the entire tree.
            NotificationRoot: PCWSTR::null(),
        }];

        let start_options = PRJ_STARTVIRTUALIZING_OPTIONS {
            Flags: PRJ_STARTVIRTUALIZING_FLAGS(0),
            PoolThreadCount: self.options.pool_thread_count,
            ConcurrentThreadCount: self.options.concurrent_thread_count,
            NotificationMappings: mappings.as_mut_ptr(),
            NotificationMappingsCount: mappings.len() as u32,
        };

        let namespace = unsafe {
            PrjStartVirtualizing(
                PCWSTR::from_raw(root_wide.as_ptr()),
                &callbacks,
                Some(context_ptr as *const core::ffi::c_void),
                Some(&start_options),
            )
        };

        let namespace = match namespace {
            Ok(namespace) => namespace,
            Err(e) => {
                // Roll back in reverse order of bring-up.
                bridge.stop();
                unsafe { drop(Box::from_raw(context_ptr)) };
                self.record_error(&format!("PrjStartVirtualizing failed: 0x{:08X}", e.code().0));
                return Err(VfsError::Platform {
                    operation: "PrjStartVirtualizing".to_string(),
                    code: e.code().0,
                });
            }
        };

        *running = Some(RunningState {
            namespace: SendableContext::new(namespace),
            bridge,
            context_ptr,
        });

        tracing::info!(root = %root, "virtualization started");
        Ok(())
    }

    /// Stop projecting. Idempotent; tears down in LIFO order relative to
    /// start. No callback fires after this returns.
    pub fn stop(&self) {
        let state: RunningState = match self.running.write().take() {
            Some(state) => state,
            None => return,
        };

        unsafe { PrjStopVirtualizing(state.namespace.inner()) };

        // With callbacks quiesced, flush anything still suspended rather
        // than leaving the kernel waiting on completions that never come.
        self.delivery.fail_all_pending(&ProjFsDataPort);

        state.bridge.stop();

        unsafe { drop(Box::from_raw(state.context_ptr)) };

        tracing::info!("virtualization stopped");
    }

    /// Whether the projection is live.
    pub fn is_running(&self) -> bool {
        self.running.read().is_some()
    }

    /// Running counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Diagnostics from the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Drive any suspended data requests for `vpath` to completion against
    /// the content now in cache.
    pub fn complete_pending(&self, vpath: &str) {
        self.delivery.complete_pending(vpath, &ProjFsDataPort);
    }

    /// Ask the platform to forget a prior deletion of `vpath` so regenerated
    /// content can reappear; also drops the local caches for the path.
    ///
    /// # Returns
    /// True when the tombstone is gone (or never existed).
    pub fn invalidate_tombstone(&self, vpath: &str) -> bool {
        let running = self.running.read();
        let state: &RunningState = match running.as_ref() {
            Some(state) => state,
            None => {
                tracing::warn!(path = %vpath, "cannot invalidate tombstone, provider not running");
                return false;
            }
        };

        let cleared: bool = invalidate_tombstone_raw(state.namespace, vpath);
        if cleared {
            self.cache.invalidate(vpath);
        }
        cleared
    }

    // --- Host push surface: the embedding host pre-populates the cache ---

    /// Pre-populate the listing for a path (host-side population is the
    /// authoritative ingest path).
    pub fn set_cached_listing(&self, vpath: &str, children: Vec<DirChild>) {
        self.cache.set_listing(vpath, DirListing::ingest(children));
        self.enumeration.notify_listing_updated(vpath);
    }

    /// Pre-populate file info for a path.
    pub fn set_cached_info(&self, vpath: &str, info: FileEntry) {
        self.cache.set_info(vpath, info.normalized());
    }

    /// Pre-populate content for a path.
    pub fn set_cached_content(&self, vpath: &str, data: Vec<u8>) {
        self.cache.set_content(vpath, FileContent::new(data));
    }

    /// Shared cache handle (diagnostics and embedding-host use).
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Object-store reader handle.
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    fn record_error(&self, message: &str) {
        tracing::error!("{message}");
        *self.last_error.write() = Some(message.to_string());
    }
}

impl Drop for ProjFsProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The whole-tree notification mask enforcing the write barrier: every
/// mutating pre-operation is intercepted, every mutation post-operation is
/// observed.
fn write_barrier_mask() -> PRJ_NOTIFY_TYPES {
    PRJ_NOTIFY_TYPES(
        PRJ_NOTIFY_NEW_FILE_CREATED.0
            | PRJ_NOTIFY_FILE_OVERWRITTEN.0
            | PRJ_NOTIFY_PRE_DELETE.0
            | PRJ_NOTIFY_PRE_RENAME.0
            | PRJ_NOTIFY_PRE_SET_HARDLINK.0
            | PRJ_NOTIFY_FILE_RENAMED.0
            | PRJ_NOTIFY_HARDLINK_CREATED.0
            | PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_MODIFIED.0
            | PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_DELETED.0,
    )
}

/// Remove the hidden projection-state directory a crashed instance leaves
/// behind. Failure to clear it makes the kernel bind the directory to the
/// dead instance id and ignore the new callbacks.
fn clear_stale_projection_state(root: &Path) {
    let marker_dir = root.join(".projfs");
    let marker_file = marker_dir.join("placeholder");

    if let Err(e) = std::fs::remove_file(&marker_file) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %marker_file.display(), error = %e, "stale marker file not removed");
        }
    }
    if let Err(e) = std::fs::remove_dir_all(&marker_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %marker_dir.display(), error = %e, "stale marker dir not removed");
        }
    }
}

/// Tombstone invalidation against a raw namespace handle; shared between the
/// provider surface and the close-deleted notification path.
pub(crate) fn invalidate_tombstone_raw(namespace: SendableContext, vpath: &str) -> bool {
    use windows::Win32::Storage::ProjectedFileSystem::{
        PRJ_UPDATE_ALLOW_DIRTY_METADATA, PRJ_UPDATE_ALLOW_TOMBSTONE, PRJ_UPDATE_TYPES,
    };

    let relative: String = path::to_platform_relative(vpath);
    let relative_wide: Vec<u16> = string_to_wide(&relative);

    let deleted = unsafe {
        PrjDeleteFile(
            namespace.inner(),
            PCWSTR::from_raw(relative_wide.as_ptr()),
            PRJ_UPDATE_TYPES(PRJ_UPDATE_ALLOW_DIRTY_METADATA.0 | PRJ_UPDATE_ALLOW_TOMBSTONE.0),
            None,
        )
    };

    match deleted {
        Ok(()) => {
            tracing::debug!(path = %vpath, "tombstone invalidated");
            true
        }
        // No tombstone to clear is success.
        Err(e) if e.code() == windows::core::HRESULT::from(ERROR_FILE_NOT_FOUND) => true,
        Err(e) => {
            tracing::warn!(path = %vpath, error = %e, "PrjDeleteFile failed");
            false
        }
    }
}
