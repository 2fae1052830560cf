//! Platform ports: aligned-buffer data writes, command completion, and the
//! kernel dir-entry buffer adapter.

use std::ffi::c_void;

use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{BOOLEAN, ERROR_FILE_NOT_FOUND, ERROR_INSUFFICIENT_BUFFER, E_OUTOFMEMORY, S_OK};
use windows::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjAllocateAlignedBuffer, PrjCompleteCommand, PrjFillDirEntryBuffer, PrjFreeAlignedBuffer,
    PrjWriteFileData, PRJ_DIR_ENTRY_BUFFER_HANDLE, PRJ_FILE_BASIC_INFO,
};

use castfs_vfs::{FileEntry, VfsError, VfsResult};

use crate::delivery::{CompletionOutcome, DataPort};
use crate::enumeration::{EntrySink, SinkStatus};
use crate::pending::DataStream;
use crate::resolver::PlaceholderInfo;
use crate::util::filetime::now_filetime_i64;
use crate::util::wstr::string_to_wide;
use crate::virtualizer::sendable::SendableContext;

/// Pack a GUID into the 128-bit form carried by platform-independent state.
pub fn guid_to_u128(guid: &GUID) -> u128 {
    ((guid.data1 as u128) << 96)
        | ((guid.data2 as u128) << 80)
        | ((guid.data3 as u128) << 64)
        | (u64::from_be_bytes(guid.data4) as u128)
}

/// Unpack a 128-bit id back into a GUID.
pub fn guid_from_u128(value: u128) -> GUID {
    GUID {
        data1: (value >> 96) as u32,
        data2: (value >> 80) as u16,
        data3: (value >> 64) as u16,
        data4: (value as u64).to_be_bytes(),
    }
}

/// Basic info for a placeholder or directory entry. Timestamps are
/// synthesized as "now"; no persisted times are maintained.
pub fn basic_info(size: u64, is_directory: bool) -> PRJ_FILE_BASIC_INFO {
    let filetime: i64 = now_filetime_i64();
    PRJ_FILE_BASIC_INFO {
        IsDirectory: BOOLEAN(if is_directory { 1 } else { 0 }),
        FileSize: if is_directory { 0 } else { size as i64 },
        CreationTime: filetime,
        LastAccessTime: filetime,
        LastWriteTime: filetime,
        ChangeTime: filetime,
        FileAttributes: if is_directory {
            FILE_ATTRIBUTE_DIRECTORY.0
        } else {
            FILE_ATTRIBUTE_NORMAL.0
        },
    }
}

impl PlaceholderInfo {
    /// The platform form of this placeholder metadata.
    pub(crate) fn to_basic_info(self) -> PRJ_FILE_BASIC_INFO {
        basic_info(self.size, self.is_directory)
    }
}

/// Data port backed by the ProjFS aligned-buffer and completion primitives.
pub struct ProjFsDataPort;

impl DataPort for ProjFsDataPort {
    fn write(&self, stream: &DataStream, offset: u64, data: &[u8]) -> VfsResult<()> {
        let context = SendableContext::from_raw(stream.context);
        let stream_guid: GUID = guid_from_u128(stream.stream_id);

        unsafe {
            let aligned: *mut c_void = PrjAllocateAlignedBuffer(context.inner(), data.len());
            if aligned.is_null() {
                return Err(VfsError::OutOfMemory);
            }

            std::ptr::copy_nonoverlapping(data.as_ptr(), aligned as *mut u8, data.len());

            let result = PrjWriteFileData(
                context.inner(),
                &stream_guid,
                aligned,
                offset,
                data.len() as u32,
            );

            PrjFreeAlignedBuffer(aligned);

            result.map_err(|e| VfsError::Platform {
                operation: "PrjWriteFileData".to_string(),
                code: e.code().0,
            })
        }
    }

    fn complete(&self, stream: &DataStream, command_id: i32, outcome: CompletionOutcome) {
        let context = SendableContext::from_raw(stream.context);
        let result: HRESULT = match outcome {
            CompletionOutcome::Success => S_OK,
            CompletionOutcome::NotFound => HRESULT::from(ERROR_FILE_NOT_FOUND),
            CompletionOutcome::OutOfMemory => E_OUTOFMEMORY,
        };

        let completed = unsafe { PrjCompleteCommand(context.inner(), command_id, result, None) };
        match completed {
            Ok(()) => {
                tracing::debug!(command_id, outcome = ?outcome, "command completed");
            }
            Err(e) => {
                tracing::warn!(command_id, error = %e, "PrjCompleteCommand failed");
            }
        }
    }
}

/// Kernel dir-entry buffer adapter for the enumeration engine.
pub struct DirEntrySink {
    handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
}

impl DirEntrySink {
    /// Wrap the buffer handle of one GetDirectoryEnumeration callback.
    pub fn new(handle: PRJ_DIR_ENTRY_BUFFER_HANDLE) -> Self {
        Self { handle }
    }
}

impl EntrySink for DirEntrySink {
    fn fill(&mut self, entry: &FileEntry) -> SinkStatus {
        let name_wide: Vec<u16> = string_to_wide(&entry.name);
        let info: PRJ_FILE_BASIC_INFO = basic_info(entry.size, entry.is_directory);

        let filled = unsafe {
            PrjFillDirEntryBuffer(PCWSTR::from_raw(name_wide.as_ptr()), Some(&info), self.handle)
        };

        match filled {
            Ok(()) => SinkStatus::Accepted,
            Err(e) if e.code() == HRESULT::from(ERROR_INSUFFICIENT_BUFFER) => SinkStatus::BufferFull,
            Err(e) => {
                tracing::warn!(name = %entry.name, error = %e, "PrjFillDirEntryBuffer failed");
                SinkStatus::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_round_trip() {
        let guid = GUID {
            data1: 0x0123_4567,
            data2: 0x89AB,
            data3: 0xCDEF,
            data4: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(guid_from_u128(guid_to_u128(&guid)), guid);
    }

    #[test]
    fn basic_info_directory_shape() {
        let info: PRJ_FILE_BASIC_INFO = basic_info(4096, true);
        assert_eq!(info.IsDirectory.as_bool(), true);
        assert_eq!(info.FileSize, 0);
        assert_eq!(info.FileAttributes, FILE_ATTRIBUTE_DIRECTORY.0);
    }

    #[test]
    fn basic_info_file_shape() {
        let info: PRJ_FILE_BASIC_INFO = basic_info(260, false);
        assert_eq!(info.IsDirectory.as_bool(), false);
        assert_eq!(info.FileSize, 260);
        assert_eq!(info.FileAttributes, FILE_ATTRIBUTE_NORMAL.0);
        assert!(info.CreationTime > 0);
    }
}
