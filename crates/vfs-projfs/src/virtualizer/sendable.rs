//! Sendable wrapper for the ProjFS context handle.

use windows::Win32::Storage::ProjectedFileSystem::PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT;

use crate::pending::RawContext;

/// ProjFS context wrapper that is Send + Sync.
///
/// # Safety
///
/// ProjFS documents that `PrjCompleteCommand` and `PrjWriteFileData` may be
/// called from any thread, so the context handle is safe to send across
/// threads for these operations. The handle stays valid from
/// `PrjStartVirtualizing` until `PrjStopVirtualizing` returns, and the
/// provider never completes a command after stop.
#[derive(Clone, Copy)]
pub struct SendableContext(PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT);

unsafe impl Send for SendableContext {}
unsafe impl Sync for SendableContext {}

impl SendableContext {
    /// Wrap a context handle.
    pub fn new(context: PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT) -> Self {
        Self(context)
    }

    /// The wrapped handle.
    pub fn inner(&self) -> PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT {
        self.0
    }

    /// Erase to the raw word carried inside platform-independent state.
    pub fn to_raw(&self) -> RawContext {
        RawContext(self.0 .0 as usize)
    }

    /// Rebuild from the raw word.
    pub fn from_raw(raw: RawContext) -> Self {
        Self(PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT(raw.0 as _))
    }
}
