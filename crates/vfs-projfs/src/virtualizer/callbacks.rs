//! ProjFS callback thunks.
//!
//! These are the `extern "system"` entry points the kernel driver invokes on
//! its own thread pool. Each thunk recovers the strongly-typed
//! [`CallbackContext`] from the opaque instance-context pointer, normalizes
//! the kernel path, and delegates to the platform-independent engines.
//! Thunks never propagate errors or unwind across the FFI boundary: every
//! failure maps to a platform status, with unexpected ones answered as
//! file-not-found.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{
    BOOLEAN, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, E_OUTOFMEMORY, S_OK,
};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjWritePlaceholderInfo, PRJ_CALLBACKS, PRJ_CALLBACK_DATA,
    PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN, PRJ_DIR_ENTRY_BUFFER_HANDLE, PRJ_NOTIFICATION,
    PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_DELETED,
    PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_MODIFIED,
    PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_NO_MODIFICATION, PRJ_NOTIFICATION_FILE_OPENED,
    PRJ_NOTIFICATION_FILE_OVERWRITTEN, PRJ_NOTIFICATION_FILE_PRE_CONVERT_TO_FULL,
    PRJ_NOTIFICATION_FILE_RENAMED, PRJ_NOTIFICATION_HARDLINK_CREATED,
    PRJ_NOTIFICATION_NEW_FILE_CREATED, PRJ_NOTIFICATION_PARAMETERS, PRJ_NOTIFICATION_PRE_DELETE,
    PRJ_NOTIFICATION_PRE_RENAME, PRJ_NOTIFICATION_PRE_SET_HARDLINK, PRJ_PLACEHOLDER_INFO,
};

use castfs_vfs::{path, AsyncBridge, ContentCache, VfsError};

use crate::delivery::DataDeliveryEngine;
use crate::enumeration::EnumerationEngine;
use crate::pending::DataStream;
use crate::policy::{self, Notification, Verdict};
use crate::resolver::PlaceholderResolver;
use crate::util::pattern::name_matches;
use crate::util::wstr::pcwstr_to_string;
use crate::virtualizer::ports::{guid_to_u128, DirEntrySink, ProjFsDataPort};
use crate::virtualizer::provider::invalidate_tombstone_raw;
use crate::virtualizer::sendable::SendableContext;

/// Everything the thunks need, allocated once per start and handed to the
/// platform as the instance context. Must outlive the virtualization
/// instance; the provider frees it after `PrjStopVirtualizing` returns.
pub struct CallbackContext {
    pub enumeration: Arc<EnumerationEngine>,
    pub delivery: Arc<DataDeliveryEngine>,
    pub resolver: Arc<PlaceholderResolver>,
    pub cache: Arc<ContentCache>,
    pub bridge: Arc<AsyncBridge>,
}

impl CallbackContext {
    pub fn new(
        enumeration: Arc<EnumerationEngine>,
        delivery: Arc<DataDeliveryEngine>,
        resolver: Arc<PlaceholderResolver>,
        cache: Arc<ContentCache>,
        bridge: Arc<AsyncBridge>,
    ) -> Self {
        Self {
            enumeration,
            delivery,
            resolver,
            cache,
            bridge,
        }
    }
}

/// Build the callback registration. CancelCommand stays unregistered: the
/// only cancellation the provider honors is its own shutdown, which
/// completes outstanding commands itself.
pub fn build_callbacks() -> PRJ_CALLBACKS {
    PRJ_CALLBACKS {
        StartDirectoryEnumerationCallback: Some(start_dir_enum_cb),
        EndDirectoryEnumerationCallback: Some(end_dir_enum_cb),
        GetDirectoryEnumerationCallback: Some(get_dir_enum_cb),
        GetPlaceholderInfoCallback: Some(get_placeholder_info_cb),
        GetFileDataCallback: Some(get_file_data_cb),
        QueryFileNameCallback: Some(query_file_name_cb),
        NotificationCallback: Some(notification_cb),
        ..Default::default()
    }
}

/// Run a callback body, translating panics into file-not-found. Unwinding
/// across the FFI boundary is never an option.
fn guarded(body: impl FnOnce() -> HRESULT) -> HRESULT {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("callback panicked; answering file-not-found");
            HRESULT::from(ERROR_FILE_NOT_FOUND)
        }
    }
}

unsafe fn context_of<'a>(callback_data: *const PRJ_CALLBACK_DATA) -> &'a CallbackContext {
    &*((*callback_data).InstanceContext as *const CallbackContext)
}

unsafe fn virtual_path_of(callback_data: *const PRJ_CALLBACK_DATA) -> Result<String, VfsError> {
    let relative: String = pcwstr_to_string((*callback_data).FilePathName)?;
    Ok(path::canonicalize(&relative))
}

pub unsafe extern "system" fn start_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);
        let session: u128 = guid_to_u128(&*enumeration_id);

        match virtual_path_of(callback_data) {
            Ok(vpath) => tracing::debug!(path = %vpath, session = format_args!("{:032x}", session), "start enumeration"),
            Err(e) => tracing::warn!(error = %e, "start enumeration with unconvertible path"),
        }

        ctx.enumeration.start_session(session);
        S_OK
    })
}

pub unsafe extern "system" fn get_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
    search_expression: PCWSTR,
    dir_entry_buffer_handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);
        let session: u128 = guid_to_u128(&*enumeration_id);

        let vpath: String = match virtual_path_of(callback_data) {
            Ok(vpath) => vpath,
            Err(e) => {
                tracing::warn!(error = %e, "enumeration path conversion failed");
                return HRESULT::from(ERROR_FILE_NOT_FOUND);
            }
        };

        let restart: bool =
            ((*callback_data).Flags.0 & PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN.0) != 0;
        let pattern: Option<String> = if search_expression.is_null() {
            None
        } else {
            pcwstr_to_string(search_expression).ok()
        };

        let mut sink = DirEntrySink::new(dir_entry_buffer_handle);
        let matcher = |name: &str, pattern: &str| name_matches(name, pattern);

        match ctx.enumeration.read_batch(
            session,
            &vpath,
            pattern.as_deref(),
            restart,
            &matcher,
            &mut sink,
            &*ctx.bridge,
        ) {
            Ok(()) => S_OK,
            Err(e) => {
                tracing::error!(path = %vpath, error = %e, "enumeration failed");
                HRESULT::from(ERROR_FILE_NOT_FOUND)
            }
        }
    })
}

pub unsafe extern "system" fn end_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);
        ctx.enumeration.end_session(guid_to_u128(&*enumeration_id));
        S_OK
    })
}

pub unsafe extern "system" fn get_placeholder_info_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);

        let vpath: String = match virtual_path_of(callback_data) {
            Ok(vpath) => vpath,
            Err(_) => return HRESULT::from(ERROR_FILE_NOT_FOUND),
        };

        tracing::debug!(path = %vpath, "get placeholder info");

        let info = match ctx.resolver.resolve(&vpath, &*ctx.bridge) {
            Some(info) => info,
            None => return HRESULT::from(ERROR_FILE_NOT_FOUND),
        };

        let placeholder = PRJ_PLACEHOLDER_INFO {
            FileBasicInfo: info.to_basic_info(),
            ..Default::default()
        };

        // The write takes the kernel's own (relative) spelling of the path.
        let written = PrjWritePlaceholderInfo(
            (*callback_data).NamespaceVirtualizationContext,
            (*callback_data).FilePathName,
            &placeholder,
            std::mem::size_of::<PRJ_PLACEHOLDER_INFO>() as u32,
        );

        match written {
            Ok(()) => S_OK,
            Err(e) => {
                tracing::warn!(path = %vpath, error = %e, "PrjWritePlaceholderInfo failed");
                e.code()
            }
        }
    })
}

pub unsafe extern "system" fn get_file_data_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    byte_offset: u64,
    length: u32,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);

        let vpath: String = match virtual_path_of(callback_data) {
            Ok(vpath) => vpath,
            Err(_) => return HRESULT::from(ERROR_FILE_NOT_FOUND),
        };

        tracing::debug!(path = %vpath, offset = byte_offset, length, "get file data");

        let stream = DataStream {
            context: SendableContext::new((*callback_data).NamespaceVirtualizationContext).to_raw(),
            stream_id: guid_to_u128(&(*callback_data).DataStreamId),
        };

        match ctx.delivery.read(
            &vpath,
            byte_offset,
            length,
            stream,
            (*callback_data).CommandId,
            &ProjFsDataPort,
            &*ctx.bridge,
        ) {
            Ok(()) => S_OK,
            Err(VfsError::IoPending) => HRESULT::from(ERROR_IO_PENDING),
            Err(VfsError::OutOfMemory) => E_OUTOFMEMORY,
            Err(e) => {
                tracing::debug!(path = %vpath, error = %e, "file data unavailable");
                HRESULT::from(ERROR_FILE_NOT_FOUND)
            }
        }
    })
}

/// Case-insensitive name queries are unsupported; the kernel falls back to
/// enumeration-based resolution.
pub unsafe extern "system" fn query_file_name_cb(
    _callback_data: *const PRJ_CALLBACK_DATA,
) -> HRESULT {
    HRESULT::from(ERROR_FILE_NOT_FOUND)
}

pub unsafe extern "system" fn notification_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    is_directory: BOOLEAN,
    notification: PRJ_NOTIFICATION,
    _destination_file_name: PCWSTR,
    _operation_parameters: *mut PRJ_NOTIFICATION_PARAMETERS,
) -> HRESULT {
    guarded(|| {
        let ctx: &CallbackContext = context_of(callback_data);

        let vpath: String = match virtual_path_of(callback_data) {
            Ok(vpath) => vpath,
            Err(_) => return HRESULT::from(ERROR_ACCESS_DENIED),
        };

        let kind: Notification = map_notification(notification);
        tracing::debug!(
            path = %vpath,
            kind = ?kind,
            directory = is_directory.as_bool(),
            "notification"
        );

        match policy::verdict(kind) {
            Verdict::Allow => S_OK,
            Verdict::Deny => {
                tracing::info!(path = %vpath, kind = ?kind, "blocked write operation");
                HRESULT::from(ERROR_ACCESS_DENIED)
            }
            Verdict::Observe => {
                if kind == Notification::CloseDeleted && policy::regenerates(&vpath) {
                    // Tombstone repair: forget the deletion locally and on the
                    // platform so the next access regenerates the file.
                    ctx.cache.invalidate(&vpath);
                    invalidate_tombstone_raw(
                        SendableContext::new((*callback_data).NamespaceVirtualizationContext),
                        &vpath,
                    );
                }
                S_OK
            }
        }
    })
}

fn map_notification(notification: PRJ_NOTIFICATION) -> Notification {
    match notification {
        PRJ_NOTIFICATION_FILE_OPENED => Notification::FileOpened,
        PRJ_NOTIFICATION_NEW_FILE_CREATED => Notification::NewFileCreated,
        PRJ_NOTIFICATION_FILE_OVERWRITTEN => Notification::FileOverwritten,
        PRJ_NOTIFICATION_PRE_DELETE => Notification::PreDelete,
        PRJ_NOTIFICATION_PRE_RENAME => Notification::PreRename,
        PRJ_NOTIFICATION_PRE_SET_HARDLINK => Notification::PreSetHardlink,
        PRJ_NOTIFICATION_FILE_RENAMED => Notification::FileRenamed,
        PRJ_NOTIFICATION_HARDLINK_CREATED => Notification::HardlinkCreated,
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_NO_MODIFICATION => Notification::CloseNoModification,
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_MODIFIED => Notification::CloseModified,
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_DELETED => Notification::CloseDeleted,
        PRJ_NOTIFICATION_FILE_PRE_CONVERT_TO_FULL => Notification::PreConvertToFull,
        other => Notification::Unknown(other.0 as u32),
    }
}
