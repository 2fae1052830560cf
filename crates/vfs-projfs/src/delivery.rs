//! On-demand file-data delivery.
//!
//! Serves the bytes of a projected file either immediately — from the
//! content cache or the object store — or by suspending the request and
//! resuming it once the bridge has cached the content. The platform side of
//! the transaction (aligned buffers, data writes, command completion) is
//! behind the [`DataPort`] trait; the Windows implementation lives in the
//! virtualizer, tests substitute a recorder.

use std::ops::Range;
use std::sync::Arc;

use castfs_store::ObjectStore;
use castfs_vfs::{ContentCache, Fetcher, VfsError, VfsResult};

use crate::pending::{DataStream, PendingRead, PendingRequests};
use crate::stats::ProviderStats;

/// Outcome delivered through the platform completion primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The window was written (possibly zero bytes past end-of-file).
    Success,
    /// No content exists for the path.
    NotFound,
    /// The platform allocator refused a buffer.
    OutOfMemory,
}

/// Platform write/completion surface.
///
/// `write` is expected to allocate the platform-aligned buffer, copy, write,
/// and release the buffer on every exit path. `complete` delivers the result
/// of a previously suspended command; the engine never completes a command
/// twice.
pub trait DataPort: Send + Sync {
    /// Write `data` at `offset` into the request's data stream.
    fn write(&self, stream: &DataStream, offset: u64, data: &[u8]) -> VfsResult<()>;

    /// Complete a suspended command.
    fn complete(&self, stream: &DataStream, command_id: i32, outcome: CompletionOutcome);
}

/// Clip a requested window against the content size.
///
/// # Returns
/// The in-bounds byte range, or `None` when the offset is at or past the
/// end (a successful zero-byte read).
pub fn clip_window(content_len: usize, offset: u64, length: u32) -> Option<Range<usize>> {
    if offset >= content_len as u64 {
        return None;
    }
    let start: usize = offset as usize;
    let end: usize = (offset + length as u64).min(content_len as u64) as usize;
    Some(start..end)
}

/// Serves file bytes on demand; suspends cache misses for later completion.
pub struct DataDeliveryEngine {
    cache: Arc<ContentCache>,
    store: Arc<ObjectStore>,
    pending: PendingRequests,
    stats: Arc<ProviderStats>,
}

impl DataDeliveryEngine {
    /// Create a delivery engine over the shared cache and store.
    pub fn new(cache: Arc<ContentCache>, store: Arc<ObjectStore>, stats: Arc<ProviderStats>) -> Self {
        Self {
            cache,
            store,
            pending: PendingRequests::new(),
            stats,
        }
    }

    /// Serve a GetFileData request.
    ///
    /// # Arguments
    /// * `vpath` - Canonical virtual path
    /// * `offset`, `length` - Requested byte window
    /// * `stream` - Platform handles of the originating callback
    /// * `command_id` - Command id for deferred completion
    /// * `port` - Platform write surface
    /// * `fetcher` - Bridge used on cache miss
    ///
    /// # Returns
    /// `Ok(())` when the window was written synchronously;
    /// `Err(IoPending)` when the request was suspended.
    pub fn read(
        &self,
        vpath: &str,
        offset: u64,
        length: u32,
        stream: DataStream,
        command_id: i32,
        port: &dyn DataPort,
        fetcher: &dyn Fetcher,
    ) -> VfsResult<()> {
        ProviderStats::bump(&self.stats.file_data_requests);

        // Cached content wins.
        if let Some(content) = self.cache.get_content(vpath) {
            ProviderStats::bump(&self.stats.cache_hits);
            return self.write_window(&content.data, offset, length, &stream, port);
        }

        // Direct-disk fast path for the object namespace.
        if ObjectStore::is_object_path(vpath) {
            if let Some(body) = self.store.read_virtual(vpath) {
                return self.write_window(&body, offset, length, &stream, port);
            }
        }

        ProviderStats::bump(&self.stats.cache_misses);
        tracing::debug!(path = %vpath, offset, length, command_id, "content not cached, deferring");

        self.pending.insert(
            command_id,
            PendingRead {
                vpath: vpath.to_string(),
                offset,
                length,
                stream,
            },
        );
        fetcher.fetch_content(vpath);

        Err(VfsError::IoPending)
    }

    /// Complete every suspended request for `vpath` against the content now
    /// in cache. Requests are removed before completion; each completes
    /// exactly once.
    pub fn complete_pending(&self, vpath: &str, port: &dyn DataPort) {
        let taken: Vec<(i32, PendingRead)> = self.pending.take_for_path(vpath);
        if taken.is_empty() {
            return;
        }

        let content = self.cache.get_content(vpath);
        tracing::debug!(
            path = %vpath,
            requests = taken.len(),
            cached = content.is_some(),
            "completing pending requests"
        );

        for (command_id, read) in taken {
            let outcome: CompletionOutcome = match &content {
                None => CompletionOutcome::NotFound,
                Some(content) => {
                    match clip_window(content.len(), read.offset, read.length) {
                        // Offset at or past end: success with no data.
                        None => CompletionOutcome::Success,
                        Some(window) => {
                            let slice: &[u8] = &content.data[window];
                            match port.write(&read.stream, read.offset, slice) {
                                Ok(()) => {
                                    self.stats.add_bytes(slice.len() as u64);
                                    ProviderStats::bump(&self.stats.cache_hits);
                                    CompletionOutcome::Success
                                }
                                Err(VfsError::OutOfMemory) => CompletionOutcome::OutOfMemory,
                                Err(e) => {
                                    tracing::warn!(command_id, error = %e, "deferred write failed");
                                    CompletionOutcome::NotFound
                                }
                            }
                        }
                    }
                }
            };
            port.complete(&read.stream, command_id, outcome);
        }
    }

    /// Complete every suspended request as not-found (provider shutdown).
    pub fn fail_all_pending(&self, port: &dyn DataPort) {
        for (command_id, read) in self.pending.drain() {
            port.complete(&read.stream, command_id, CompletionOutcome::NotFound);
        }
    }

    /// Number of currently suspended requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn write_window(
        &self,
        body: &[u8],
        offset: u64,
        length: u32,
        stream: &DataStream,
        port: &dyn DataPort,
    ) -> VfsResult<()> {
        let window: Range<usize> = match clip_window(body.len(), offset, length) {
            Some(window) => window,
            None => return Ok(()), // Nothing to write.
        };

        let slice: &[u8] = &body[window];
        port.write(stream, offset, slice)?;
        self.stats.add_bytes(slice.len() as u64);
        Ok(())
    }
}
