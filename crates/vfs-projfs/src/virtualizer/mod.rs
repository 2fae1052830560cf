//! Windows ProjFS virtualizer.
//!
//! Binds the platform-independent engines to the real
//! `windows::Win32::Storage::ProjectedFileSystem` API: lifecycle, callback
//! thunks, and the aligned-buffer write/completion port.

mod callbacks;
mod ports;
mod provider;
mod sendable;

pub use provider::ProjFsProvider;
