//! Synchronous, read-only view over the castfs content-addressed store.
//!
//! The instance directory has three top-level areas — `objects/`, `vheads/`,
//! `rmaps/` — of which only `objects/` is read here. Objects are flat files
//! named by their 64-hex content hash. On top of that layout this crate
//! projects a small synthetic namespace:
//!
//! ```text
//! /objects                          directory of object hashes
//! /objects/<64-hex>                 directory per object
//! /objects/<64-hex>/raw.txt         raw body
//! /objects/<64-hex>/type.txt        derived object type
//! /objects/<64-hex>/pretty.html     body wrapped in minimal HTML
//! /objects/<64-hex>/json.txt        JSON summary (hash + type)
//! ```
//!
//! Everything is direct-disk and synchronous: this is the fast path that
//! lets the provider answer object requests without touching the async
//! bridge. Object metadata and derived types are memoized.

mod reader;

pub use reader::{ObjectMetadata, ObjectStore, StoreEntry, OBJECT_NAMESPACE};
