//! Data model for projected entries, listings, and file content.

use bytes::Bytes;
use serde::Deserialize;

/// Attributes of a single projected entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileEntry {
    /// Display name (path tail).
    pub name: String,
    /// Content hash, when the entry is backed by the object store.
    #[serde(alias = "contentHash")]
    pub hash: Option<String>,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this entry is a directory.
    #[serde(alias = "isDirectory")]
    pub is_directory: bool,
    /// Permission/mode bits reported by the logical filesystem.
    pub mode: u32,
    /// True iff the bytes live in the object store under the known layout
    /// and can be read directly from disk.
    #[serde(alias = "isBlobDirect")]
    pub blob_direct: bool,
}

impl Default for FileEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            hash: None,
            size: 0,
            is_directory: false,
            mode: 0,
            blob_direct: false,
        }
    }
}

impl FileEntry {
    /// Create a file entry.
    ///
    /// # Arguments
    /// * `name` - Display name
    /// * `size` - Size in bytes
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Create a directory entry. Directories always report size 0 and are
    /// never blob-direct.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            ..Default::default()
        }
    }

    /// Re-establish the directory invariant after deserializing from an
    /// untrusted host: a directory has size 0 and is not blob-direct.
    pub fn normalized(mut self) -> Self {
        if self.is_directory {
            self.size = 0;
            self.blob_direct = false;
        }
        self
    }
}

/// A child entry as supplied by the logical filesystem's `read_dir`.
///
/// Hosts may supply either a bare base name or a full entry object; the
/// ingest path canonicalizes both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirChild {
    /// Bare base name. Ingested as a non-directory entry of size 0; hosts
    /// supply the object form when metadata matters.
    Name(String),
    /// Full entry object.
    Entry(FileEntry),
}

/// An ordered sequence of entries with unique names.
///
/// Order is stable for the lifetime of the cached listing; enumeration
/// sessions capture a snapshot, so a later re-cache of the same path never
/// disturbs an in-flight enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Entries in stable order.
    pub entries: Vec<FileEntry>,
}

impl DirListing {
    /// Build a listing from already-sanitized entries.
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self { entries }
    }

    /// Sanitize and ingest host-supplied children.
    ///
    /// Empty names and names containing path separators are dropped here, at
    /// the source; the enumeration engine treats its captured list as already
    /// sanitized. Duplicate names keep the first occurrence.
    pub fn ingest(children: Vec<DirChild>) -> Self {
        let mut entries: Vec<FileEntry> = Vec::with_capacity(children.len());
        for child in children {
            let entry: FileEntry = match child {
                DirChild::Name(name) => FileEntry::file(name, 0),
                DirChild::Entry(entry) => entry.normalized(),
            };
            if entry.name.is_empty() {
                continue;
            }
            if entry.name.contains('/') || entry.name.contains('\\') {
                tracing::warn!(name = %entry.name, "dropping listing entry with path separator");
                continue;
            }
            if entries.iter().any(|e| e.name == entry.name) {
                continue;
            }
            entries.push(entry);
        }
        Self { entries }
    }

    /// Look up a child by name.
    pub fn find(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Approximate heap footprint, for cache accounting.
    pub(crate) fn approx_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.name.len() + e.hash.as_ref().map_or(0, String::len) + 32)
            .sum()
    }
}

/// An immutable byte buffer plus the hash it materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// File bytes.
    pub data: Bytes,
    /// Content hash, when known.
    pub hash: Option<String>,
}

impl FileContent {
    /// Wrap raw bytes with no known hash.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            hash: None,
        }
    }

    /// Wrap raw bytes with the hash they materialize.
    pub fn with_hash(data: impl Into<Bytes>, hash: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            hash: Some(hash.into()),
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_invariant_enforced() {
        let entry = FileEntry {
            name: "docs".to_string(),
            size: 4096,
            is_directory: true,
            blob_direct: true,
            ..Default::default()
        }
        .normalized();

        assert_eq!(entry.size, 0);
        assert!(!entry.blob_direct);
    }

    #[test]
    fn ingest_accepts_both_child_forms() {
        let listing = DirListing::ingest(vec![
            DirChild::Name("plain.txt".to_string()),
            DirChild::Entry(FileEntry::directory("sub")),
        ]);

        assert_eq!(listing.entries.len(), 2);
        assert!(!listing.entries[0].is_directory);
        assert!(listing.entries[1].is_directory);
    }

    #[test]
    fn ingest_drops_empty_and_separator_names() {
        let listing = DirListing::ingest(vec![
            DirChild::Name(String::new()),
            DirChild::Name("a/b".to_string()),
            DirChild::Name("a\\b".to_string()),
            DirChild::Name("ok".to_string()),
        ]);

        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].name, "ok");
    }

    #[test]
    fn ingest_keeps_first_duplicate() {
        let listing = DirListing::ingest(vec![
            DirChild::Entry(FileEntry::file("x", 10)),
            DirChild::Entry(FileEntry::file("x", 99)),
        ]);

        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].size, 10);
    }

    #[test]
    fn entry_object_form_deserializes_with_aliases() {
        let json = r#"{"name":"inbox","isDirectory":true,"size":12}"#;
        let child: DirChild = serde_json::from_str(json).unwrap();
        match child {
            DirChild::Entry(e) => {
                let e = e.normalized();
                assert!(e.is_directory);
                assert_eq!(e.size, 0);
            }
            DirChild::Name(_) => panic!("expected object form"),
        }
    }

    #[test]
    fn string_form_deserializes() {
        let child: DirChild = serde_json::from_str(r#""plain.txt""#).unwrap();
        assert!(matches!(child, DirChild::Name(name) if name == "plain.txt"));
    }
}
