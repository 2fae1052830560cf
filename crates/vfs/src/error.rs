//! Error types shared across the castfs crates.

use std::fmt;

/// Errors that can occur during virtual-filesystem operations.
///
/// Callback bodies never propagate these upward; the virtualizer translates
/// every variant into a platform status code at the FFI boundary.
#[derive(Debug)]
pub enum VfsError {
    /// The path does not exist in the cache, the logical filesystem, or the
    /// object store.
    NotFound(String),

    /// A write-class operation was attempted against the read-only projection.
    AccessDenied(String),

    /// A data request has been accepted and will be completed later.
    IoPending,

    /// The provider is stopped or stopping.
    Busy,

    /// The platform allocator refused a buffer.
    OutOfMemory,

    /// Any other failure from the platform API.
    Platform {
        /// Operation that failed.
        operation: String,
        /// Platform error code (HRESULT on Windows).
        code: i32,
    },

    /// IO error.
    Io(std::io::Error),

    /// Path conversion error (UTF-16 <-> UTF-8).
    PathConversion(String),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound(path) => write!(f, "not found: {}", path),
            VfsError::AccessDenied(path) => write!(f, "access denied: {}", path),
            VfsError::IoPending => write!(f, "operation pending"),
            VfsError::Busy => write!(f, "provider is stopped or stopping"),
            VfsError::OutOfMemory => write!(f, "platform allocator refused a buffer"),
            VfsError::Platform { operation, code } => {
                write!(f, "platform error in {}: 0x{:08X}", operation, code)
            }
            VfsError::Io(e) => write!(f, "IO error: {}", e),
            VfsError::PathConversion(msg) => write!(f, "path conversion error: {}", msg),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        VfsError::Io(e)
    }
}

/// Convenience result alias used throughout the castfs crates.
pub type VfsResult<T> = Result<T, VfsError>;
