//! Shared virtual-filesystem primitives for castfs.
//!
//! This crate holds everything the projection provider needs that is not
//! tied to a platform API: the canonical path model, the data model for
//! projected entries, the tiered TTL content cache, the logical-filesystem
//! trait the embedding host implements, and the async bridge that marshals
//! cache-miss requests from platform callback threads onto the host loop.
//!
//! # Architecture
//!
//! ```text
//! castfs-projfs (provider, platform callbacks)
//!       │ reads                 │ requests
//!       ▼                       ▼
//! ContentCache ◄──writes── AsyncBridge ──calls──► dyn LogicalFilesystem
//! ```

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod logical;
pub mod path;
pub mod types;

pub use bridge::{AsyncBridge, Fetcher};
pub use cache::{CacheStats, ContentCache, CONTENT_ENTRY_LIMIT};
pub use config::ProviderConfig;
pub use error::{VfsError, VfsResult};
pub use logical::{LogicalFilesystem, StatInfo};
pub use types::{DirChild, DirListing, FileContent, FileEntry};
