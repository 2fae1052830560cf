//! The logical filesystem consumed by the provider.
//!
//! The provider never walks a real directory tree; it projects whatever the
//! embedding host assembles behind this trait — chat namespaces, object
//! dumps, invitation artifacts. All methods are async and run on the bridge's
//! single-threaded host loop; nothing in the callback path calls them
//! directly.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{VfsError, VfsResult};
use crate::types::DirChild;

/// POSIX directory bit, used when `is_directory` is not supplied.
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Result of a `stat` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatInfo {
    /// Size in bytes.
    pub size: u64,
    /// Directory flag; when absent, the mode bits decide.
    #[serde(alias = "isDirectory")]
    pub is_directory: Option<bool>,
    /// Permission/mode bits.
    pub mode: u32,
    /// Content hash, when the entry is object-backed.
    pub hash: Option<String>,
}

impl StatInfo {
    /// Whether the entry is a directory, falling back to the POSIX directory
    /// bit when the flag is missing.
    pub fn directory(&self) -> bool {
        self.is_directory
            .unwrap_or(self.mode & S_IFMT == S_IFDIR)
    }
}

/// The interface the core consumes from the embedding host.
#[async_trait]
pub trait LogicalFilesystem: Send + Sync {
    /// Metadata for a canonical virtual path.
    async fn stat(&self, vpath: &str) -> VfsResult<StatInfo>;

    /// Children of a canonical virtual path.
    async fn read_dir(&self, vpath: &str) -> VfsResult<Vec<DirChild>>;

    /// Whole-file content of a canonical virtual path.
    async fn read_file(&self, vpath: &str) -> VfsResult<Vec<u8>>;

    /// Write surface, exposed but never called for read-only projections.
    async fn write_file(&self, vpath: &str, _data: &[u8]) -> VfsResult<()> {
        Err(VfsError::AccessDenied(vpath.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_flag_wins_over_mode() {
        let stat = StatInfo {
            is_directory: Some(false),
            mode: S_IFDIR,
            ..Default::default()
        };
        assert!(!stat.directory());
    }

    #[test]
    fn mode_bits_decide_when_flag_missing() {
        let dir = StatInfo {
            mode: S_IFDIR | 0o755,
            ..Default::default()
        };
        let file = StatInfo {
            mode: 0o100644,
            ..Default::default()
        };
        assert!(dir.directory());
        assert!(!file.directory());
    }
}
