//! ProjFS provider for castfs: projects the content-addressed object store
//! and the host-assembled logical namespaces into a directory hierarchy
//! visible to Windows Explorer and anything speaking Win32 file APIs.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: virtualizer (ProjFS FFI: lifecycle, callback thunks, ports)   [Windows]
//! Layer 1: engines (enumeration, placeholder resolution, data delivery,
//!          notification policy)                                          [portable]
//! Layer 0: castfs-vfs (cache, async bridge, path/data model) and
//!          castfs-store (direct-disk object reader)                      [portable]
//! ```
//!
//! The engines reach the platform only through small seams — [`EntrySink`]
//! for the kernel dir-entry buffer, [`DataPort`] for aligned writes and
//! deferred completion, and the file-name matcher — so everything above the
//! FFI builds and tests on every platform. The `virtualizer` module, which
//! binds those seams to `windows::Win32::Storage::ProjectedFileSystem`,
//! compiles only on Windows.
//!
//! # Example
//!
//! ```ignore
//! use castfs_projfs::{ProjFsOptions, ProjFsProvider};
//!
//! let options = ProjFsOptions::new(r"C:\one\files".into(), r"C:\one\instance".into());
//! let provider = ProjFsProvider::new(host_fs, options)?;
//! provider.start()?;
//! // ... Explorer now sees the projection ...
//! provider.stop();
//! ```

pub mod delivery;
pub mod enumeration;
pub mod options;
pub mod pending;
pub mod policy;
pub mod resolver;
pub mod stats;
pub mod util;

#[cfg(target_os = "windows")]
pub mod virtualizer;

pub use delivery::{clip_window, CompletionOutcome, DataDeliveryEngine, DataPort};
pub use enumeration::{EntrySink, EnumerationEngine, SinkStatus};
pub use options::ProjFsOptions;
pub use pending::{DataStream, PendingRead, PendingRequests, RawContext};
pub use policy::{regenerates, verdict, Notification, Verdict};
pub use resolver::{PlaceholderInfo, PlaceholderResolver};
pub use stats::{ProviderStats, StatsSnapshot};

#[cfg(target_os = "windows")]
pub use virtualizer::ProjFsProvider;

// Re-export the shared primitives for embedders.
pub use castfs_store::ObjectStore;
pub use castfs_vfs::{
    AsyncBridge, ContentCache, DirChild, DirListing, FileContent, FileEntry, Fetcher,
    LogicalFilesystem, ProviderConfig, StatInfo, VfsError, VfsResult,
};
