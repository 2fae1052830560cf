//! Suspended GetFileData requests awaiting content.
//!
//! When a data callback misses the cache it captures everything needed to
//! resume — the command id, the byte window, and the opaque platform handles
//! — and answers IO-pending. The map below holds those captures until the
//! bridge reports the content cached, at which point each matching request
//! is taken out (exactly once) and completed.

use std::collections::HashMap;

use parking_lot::Mutex;

use castfs_vfs::path;

/// Opaque virtualization-context handle, stored as a raw word so the
/// platform-independent engines never name the platform type.
///
/// ProjFS documents that data writes and command completion may happen from
/// any thread, which is what makes carrying this across threads sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContext(pub usize);

/// The handles a data request needs to resume: the virtualization context
/// and the data-stream id of the originating callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStream {
    /// Virtualization context of the originating callback.
    pub context: RawContext,
    /// Data-stream id of the originating callback.
    pub stream_id: u128,
}

/// A suspended GetFileData call.
#[derive(Debug, Clone)]
pub struct PendingRead {
    /// Canonical virtual path of the requested file.
    pub vpath: String,
    /// Byte offset of the requested window.
    pub offset: u64,
    /// Length of the requested window.
    pub length: u32,
    /// Handles required to resume.
    pub stream: DataStream,
}

/// Command-id-keyed store of suspended reads.
#[derive(Default)]
pub struct PendingRequests {
    map: Mutex<HashMap<i32, PendingRead>>,
}

impl PendingRequests {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a suspended read under its command id.
    ///
    /// The kernel may issue further GetFileData calls for the same file while
    /// the first is pending; each gets its own command id and its own entry.
    pub fn insert(&self, command_id: i32, read: PendingRead) {
        let previous = self.map.lock().insert(command_id, read);
        if previous.is_some() {
            tracing::warn!(command_id, "pending request replaced an existing command id");
        }
    }

    /// Remove and return every request whose path matches `vpath` after
    /// normalization. Entries leave the map before they are completed; a
    /// request completes at most once.
    pub fn take_for_path(&self, vpath: &str) -> Vec<(i32, PendingRead)> {
        let wanted: String = path::canonicalize(vpath);
        let mut map = self.map.lock();

        let ids: Vec<i32> = map
            .iter()
            .filter(|(_, read)| path::canonicalize(&read.vpath) == wanted)
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| map.remove(&id).map(|read| (id, read)))
            .collect()
    }

    /// Remove and return all requests (provider shutdown).
    pub fn drain(&self) -> Vec<(i32, PendingRead)> {
        self.map.lock().drain().collect()
    }

    /// Number of suspended reads.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    /// True when nothing is suspended.
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(vpath: &str) -> PendingRead {
        PendingRead {
            vpath: vpath.to_string(),
            offset: 0,
            length: 64,
            stream: DataStream {
                context: RawContext(0),
                stream_id: 7,
            },
        }
    }

    #[test]
    fn take_matches_normalized_paths() {
        let pending = PendingRequests::new();
        pending.insert(42, read("invites\\iom_invite.txt"));
        pending.insert(43, read("/invites/iom_invite.txt"));
        pending.insert(44, read("/other.txt"));

        let taken: Vec<(i32, PendingRead)> = pending.take_for_path("/invites/iom_invite.txt");
        let mut ids: Vec<i32> = taken.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();

        assert_eq!(ids, [42, 43]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn take_is_exactly_once() {
        let pending = PendingRequests::new();
        pending.insert(1, read("/a"));

        assert_eq!(pending.take_for_path("/a").len(), 1);
        assert!(pending.take_for_path("/a").is_empty());
    }

    #[test]
    fn drain_empties_the_map() {
        let pending = PendingRequests::new();
        pending.insert(1, read("/a"));
        pending.insert(2, read("/b"));

        assert_eq!(pending.drain().len(), 2);
        assert!(pending.is_empty());
    }
}
