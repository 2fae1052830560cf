//! Write-barrier notification policy.
//!
//! The projection is read-only to applications: every pre-operation
//! notification that would mutate projected state is denied, informational
//! notifications are allowed, and post-operation notifications are observed.
//! One observed event does real work — close-deleted on a dynamically
//! generated file starts the tombstone/regeneration protocol, so the file
//! can reappear on its next access.

use castfs_store::ObjectStore;

/// Platform-independent mirror of the ProjFS notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    FileOpened,
    NewFileCreated,
    FileOverwritten,
    PreDelete,
    PreRename,
    PreSetHardlink,
    FileRenamed,
    HardlinkCreated,
    CloseNoModification,
    CloseModified,
    CloseDeleted,
    PreConvertToFull,
    /// Anything the mirror does not know about.
    Unknown(u32),
}

/// What the callback answers for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Informational; allow the operation.
    Allow,
    /// Write-class operation against the read-only projection; deny.
    Deny,
    /// Post-operation event; allow, and possibly act on it.
    Observe,
}

/// Classify a notification.
pub fn verdict(notification: Notification) -> Verdict {
    match notification {
        Notification::FileOpened
        | Notification::CloseNoModification
        | Notification::PreConvertToFull => Verdict::Allow,

        Notification::NewFileCreated
        | Notification::FileOverwritten
        | Notification::PreDelete
        | Notification::PreRename
        | Notification::PreSetHardlink => Verdict::Deny,

        Notification::FileRenamed
        | Notification::HardlinkCreated
        | Notification::CloseModified
        | Notification::CloseDeleted => Verdict::Observe,

        // Default to denial rather than letting an unclassified mutation
        // through the write barrier.
        Notification::Unknown(_) => Verdict::Deny,
    }
}

/// Whether a close-deleted path is under the dynamic-regeneration policy.
///
/// Object-store paths are immutable disk state and are never regenerated;
/// everything else in the tree is assembled by the logical filesystem and
/// reappears on the next access once the caches and the platform tombstone
/// are invalidated.
pub fn regenerates(vpath: &str) -> bool {
    !ObjectStore::is_object_path(vpath)
}
