//! Direct-disk object store reader.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use regex::Regex;

/// Canonical prefix of the object namespace in the virtual tree.
pub const OBJECT_NAMESPACE: &str = "/objects";

/// Synthetic children of each `/objects/<hash>` directory.
const OBJECT_VIEWS: [&str; 4] = ["raw.txt", "type.txt", "pretty.html", "json.txt"];

/// Bytes of the raw body consulted for type derivation.
const TYPE_PROBE_BYTES: usize = 100;

fn hash_in_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/objects/([0-9a-fA-F]{64})(?:/|$)").expect("hash pattern"))
}

fn itemtype_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"itemtype="[^"]*/([^/"]+)""#).expect("itemtype pattern"))
}

/// Metadata for an object or a synthetic view over one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Whether the backing object exists on disk.
    pub exists: bool,
    /// Size in bytes (the backing object's size for synthetic views).
    pub size: u64,
    /// Whether the virtual path is a directory.
    pub is_directory: bool,
    /// Derived object type tag.
    pub type_tag: String,
}

impl ObjectMetadata {
    fn absent() -> Self {
        Self {
            exists: false,
            size: 0,
            is_directory: false,
            type_tag: "UNKNOWN".to_string(),
        }
    }

    fn directory() -> Self {
        Self {
            exists: true,
            size: 0,
            is_directory: true,
            type_tag: "DIRECTORY".to_string(),
        }
    }
}

/// An entry in a synthetic object-store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Entry name.
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

/// Synchronous, read-only reader for the content-addressed instance layout.
pub struct ObjectStore {
    objects_dir: PathBuf,
    meta_cache: Mutex<HashMap<String, ObjectMetadata>>,
    type_cache: Mutex<HashMap<String, String>>,
}

impl ObjectStore {
    /// Open (creating if absent) the store areas under `instance_path`.
    ///
    /// # Arguments
    /// * `instance_path` - Root directory of the object store
    pub fn new(instance_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let root: &Path = instance_path.as_ref();
        let objects_dir: PathBuf = root.join("objects");

        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(root.join("vheads"))?;
        fs::create_dir_all(root.join("rmaps"))?;

        Ok(Self {
            objects_dir,
            meta_cache: Mutex::new(HashMap::new()),
            type_cache: Mutex::new(HashMap::new()),
        })
    }

    /// True for any virtual path inside the object namespace.
    pub fn is_object_path(vpath: &str) -> bool {
        vpath == OBJECT_NAMESPACE || vpath.starts_with("/objects/")
    }

    /// Extract the 64-hex object hash from a virtual path, if present.
    pub fn extract_hash(vpath: &str) -> Option<&str> {
        hash_in_path_re()
            .captures(vpath)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Read the whole raw body of an object.
    pub fn read_object(&self, hash: &str) -> Option<Vec<u8>> {
        fs::read(self.objects_dir.join(hash)).ok()
    }

    /// Names of all objects currently on disk.
    pub fn list_objects(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let entries = match fs::read_dir(&self.objects_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list objects directory");
                return names;
            }
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names
    }

    /// Size and type of an object, memoized.
    pub fn object_metadata(&self, hash: &str) -> ObjectMetadata {
        if let Some(cached) = self.meta_cache.lock().unwrap().get(hash) {
            return cached.clone();
        }

        let object_path: PathBuf = self.objects_dir.join(hash);
        let metadata: ObjectMetadata = match fs::metadata(&object_path) {
            Ok(meta) if meta.is_file() => ObjectMetadata {
                exists: true,
                size: meta.len(),
                is_directory: false,
                type_tag: self.object_type(hash),
            },
            _ => ObjectMetadata::absent(),
        };

        self.meta_cache
            .lock()
            .unwrap()
            .insert(hash.to_string(), metadata.clone());
        metadata
    }

    /// Derive the object type from the first bytes of the body, memoized.
    ///
    /// An `itemtype="…/<Type>"` attribute in the header wins; otherwise a
    /// body that looks like structured markup is a character LOB and
    /// anything else a binary LOB.
    pub fn object_type(&self, hash: &str) -> String {
        if let Some(cached) = self.type_cache.lock().unwrap().get(hash) {
            return cached.clone();
        }

        let header: String = self.read_probe(hash);
        let type_tag: String = derive_type(&header);

        self.type_cache
            .lock()
            .unwrap()
            .insert(hash.to_string(), type_tag.clone());
        type_tag
    }

    /// Synthetic listing for a virtual path inside the object namespace.
    ///
    /// # Returns
    /// `None` when the path is outside the namespace or malformed.
    pub fn list_virtual(&self, vpath: &str) -> Option<Vec<StoreEntry>> {
        if vpath == OBJECT_NAMESPACE {
            let entries: Vec<StoreEntry> = self
                .list_objects()
                .into_iter()
                .map(|name| StoreEntry {
                    name,
                    size: 0,
                    is_directory: true,
                })
                .collect();
            return Some(entries);
        }

        let hash: &str = Self::extract_hash(vpath)?;
        if vpath != format!("/objects/{}", hash) {
            return None;
        }
        let meta: ObjectMetadata = self.object_metadata(hash);
        if !meta.exists {
            return None;
        }

        Some(
            OBJECT_VIEWS
                .iter()
                .map(|view| StoreEntry {
                    name: (*view).to_string(),
                    size: meta.size,
                    is_directory: false,
                })
                .collect(),
        )
    }

    /// Metadata for any virtual path inside the object namespace.
    pub fn virtual_metadata(&self, vpath: &str) -> ObjectMetadata {
        if vpath == OBJECT_NAMESPACE {
            return ObjectMetadata::directory();
        }

        let hash: &str = match Self::extract_hash(vpath) {
            Some(hash) => hash,
            None => return ObjectMetadata::absent(),
        };

        let object_meta: ObjectMetadata = self.object_metadata(hash);
        if !object_meta.exists {
            return ObjectMetadata::absent();
        }

        if vpath == format!("/objects/{}", hash) {
            return ObjectMetadata::directory();
        }

        match vpath.rsplit('/').next() {
            Some(leaf) if OBJECT_VIEWS.contains(&leaf) => ObjectMetadata {
                exists: true,
                // The object size stands in for every view; the real view
                // size is only known once the body is rendered.
                size: object_meta.size,
                is_directory: false,
                type_tag: object_meta.type_tag,
            },
            _ => ObjectMetadata::absent(),
        }
    }

    /// Render the body of a synthetic object view.
    pub fn read_virtual(&self, vpath: &str) -> Option<Vec<u8>> {
        let hash: &str = Self::extract_hash(vpath)?;
        let leaf: &str = vpath.rsplit('/').next()?;

        match leaf {
            "raw.txt" => self.read_object(hash),
            "type.txt" => Some(self.object_type(hash).into_bytes()),
            "pretty.html" => {
                let body: Vec<u8> = self.read_object(hash)?;
                let text: String = String::from_utf8_lossy(&body).into_owned();
                Some(format!("<html><body><pre>{}</pre></body></html>", text).into_bytes())
            }
            "json.txt" => {
                if !self.object_metadata(hash).exists {
                    return None;
                }
                let summary = serde_json::json!({
                    "hash": hash,
                    "type": self.object_type(hash),
                });
                Some(summary.to_string().into_bytes())
            }
            _ => None,
        }
    }

    fn read_probe(&self, hash: &str) -> String {
        let mut buffer: [u8; TYPE_PROBE_BYTES] = [0; TYPE_PROBE_BYTES];
        let read: usize = match fs::File::open(self.objects_dir.join(hash)) {
            Ok(mut file) => file.read(&mut buffer).unwrap_or(0),
            Err(_) => 0,
        };
        String::from_utf8_lossy(&buffer[..read]).into_owned()
    }
}

/// Type derivation heuristic over the first bytes of a body.
fn derive_type(header: &str) -> String {
    if let Some(captures) = itemtype_re().captures(header) {
        return captures[1].to_string();
    }
    if header.contains("<div") || header.contains("itemscope") {
        return "CLOB".to_string();
    }
    "BLOB".to_string()
}
