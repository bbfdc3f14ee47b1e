//! Versioned function table.
//!
//! A host that loads the library dynamically fetches the table once with
//! `sinet_get_api` and checks `size` before touching a field, using
//! `sinet_member_exists`. New entries are only ever appended, so a host
//! built against an older table keeps working with a newer library.

use std::os::raw::c_char;

use crate::config::*;
use crate::postdata::*;
use crate::types::*;
use crate::*;

/// Bumped whenever entries are appended.
pub const SINET_API_VERSION: u32 = 1;

#[repr(C)]
pub struct SinetApi {
    /// `size_of::<SinetApi>()` as compiled into the library.
    pub size: usize,
    pub version: u32,

    pub free_string: extern "C" fn(*mut c_char),

    pub config_new: extern "C" fn() -> *mut SinetConfig,
    pub config_add_ref: extern "C" fn(*mut SinetConfig) -> i32,
    pub config_release: extern "C" fn(*mut SinetConfig) -> i32,
    pub config_get_refct: extern "C" fn(*mut SinetConfig) -> i32,
    pub config_get_strvar: extern "C" fn(*mut SinetConfig, i32) -> *mut c_char,
    pub config_set_strvar: extern "C" fn(*mut SinetConfig, i32, *const c_char) -> bool,
    pub config_remove_strvar: extern "C" fn(*mut SinetConfig, i32) -> bool,

    pub pool_new: extern "C" fn(*mut SinetConfig) -> *mut SinetPool,
    pub pool_add_ref: extern "C" fn(*mut SinetPool) -> i32,
    pub pool_release: extern "C" fn(*mut SinetPool) -> i32,
    pub pool_get_refct: extern "C" fn(*mut SinetPool) -> i32,
    pub pool_execute: extern "C" fn(*mut SinetPool, *mut SinetTask),
    pub pool_cancel: extern "C" fn(*mut SinetPool, *mut SinetTask),
    pub pool_is_running: extern "C" fn(*mut SinetPool, *mut SinetTask) -> bool,
    pub pool_is_queued: extern "C" fn(*mut SinetPool, *mut SinetTask) -> bool,
    pub pool_is_running_or_queued: extern "C" fn(*mut SinetPool, *mut SinetTask) -> bool,
    pub pool_is_finished: extern "C" fn(*mut SinetPool, *mut SinetTask) -> bool,
    pub pool_clear_all: extern "C" fn(*mut SinetPool),

    pub task_new: extern "C" fn() -> *mut SinetTask,
    pub task_add_ref: extern "C" fn(*mut SinetTask) -> i32,
    pub task_release: extern "C" fn(*mut SinetTask) -> i32,
    pub task_get_refct: extern "C" fn(*mut SinetTask) -> i32,
    pub task_add_request: extern "C" fn(*mut SinetTask, *mut SinetRequest),
    pub task_get_request: extern "C" fn(*mut SinetTask, usize) -> *mut SinetRequest,
    pub task_get_request_count: extern "C" fn(*mut SinetTask) -> usize,
    pub task_get_status: extern "C" fn(*mut SinetTask) -> SinetTaskStatus,
    pub task_get_error_code: extern "C" fn(*mut SinetTask) -> i32,
    pub task_wait: extern "C" fn(*mut SinetTask, u32) -> SinetTaskStatus,
    pub task_get_id: extern "C" fn(*mut SinetTask) -> *mut c_char,

    pub request_new: extern "C" fn() -> *mut SinetRequest,
    pub request_add_ref: extern "C" fn(*mut SinetRequest) -> i32,
    pub request_release: extern "C" fn(*mut SinetRequest) -> i32,
    pub request_get_refct: extern "C" fn(*mut SinetRequest) -> i32,
    pub request_set_method: extern "C" fn(*mut SinetRequest, *const c_char) -> bool,
    pub request_get_method: extern "C" fn(*mut SinetRequest) -> *mut c_char,
    pub request_set_url: extern "C" fn(*mut SinetRequest, *const c_char),
    pub request_get_url: extern "C" fn(*mut SinetRequest) -> *mut c_char,
    pub request_set_header: extern "C" fn(*mut SinetRequest, *const c_char, *const c_char),
    pub request_set_headers_json: extern "C" fn(*mut SinetRequest, *const c_char) -> bool,
    pub request_get_headers_json: extern "C" fn(*mut SinetRequest) -> *mut c_char,
    pub request_get_response_headers_json: extern "C" fn(*mut SinetRequest) -> *mut c_char,
    pub request_get_response_header: extern "C" fn(*mut SinetRequest, *const c_char) -> *mut c_char,
    pub request_set_postdata: extern "C" fn(*mut SinetRequest, *mut SinetPostData),
    pub request_get_postdata: extern "C" fn(*mut SinetRequest) -> *mut SinetPostData,
    pub request_set_outmode: extern "C" fn(*mut SinetRequest, SinetOutMode) -> bool,
    pub request_get_outmode: extern "C" fn(*mut SinetRequest) -> SinetOutMode,
    pub request_set_outfile: extern "C" fn(*mut SinetRequest, *const c_char),
    pub request_get_outfile: extern "C" fn(*mut SinetRequest) -> *mut c_char,
    pub request_get_response_size: extern "C" fn(*mut SinetRequest) -> usize,
    pub request_copy_response_buffer: extern "C" fn(*mut SinetRequest, *mut u8, usize) -> usize,
    pub request_get_response_errcode: extern "C" fn(*mut SinetRequest) -> i32,
    pub request_get_response_status: extern "C" fn(*mut SinetRequest) -> i32,

    pub postdata_new: extern "C" fn() -> *mut SinetPostData,
    pub postdata_add_ref: extern "C" fn(*mut SinetPostData) -> i32,
    pub postdata_release: extern "C" fn(*mut SinetPostData) -> i32,
    pub postdata_get_refct: extern "C" fn(*mut SinetPostData) -> i32,
    pub postdata_clear: extern "C" fn(*mut SinetPostData),
    pub postdata_add_elem: extern "C" fn(*mut SinetPostData, *mut SinetPostDataElem),
    pub postdata_remove_elem: extern "C" fn(*mut SinetPostData, *mut SinetPostDataElem) -> bool,
    pub postdata_get_elem_count: extern "C" fn(*mut SinetPostData) -> usize,
    pub postdata_get_elem: extern "C" fn(*mut SinetPostData, usize) -> *mut SinetPostDataElem,

    pub postdata_elem_new: extern "C" fn() -> *mut SinetPostDataElem,
    pub postdata_elem_add_ref: extern "C" fn(*mut SinetPostDataElem) -> i32,
    pub postdata_elem_release: extern "C" fn(*mut SinetPostDataElem) -> i32,
    pub postdata_elem_get_refct: extern "C" fn(*mut SinetPostDataElem) -> i32,
    pub postdata_elem_set_name: extern "C" fn(*mut SinetPostDataElem, *const c_char),
    pub postdata_elem_get_name: extern "C" fn(*mut SinetPostDataElem) -> *mut c_char,
    pub postdata_elem_set_to_empty: extern "C" fn(*mut SinetPostDataElem),
    pub postdata_elem_set_to_file: extern "C" fn(*mut SinetPostDataElem, *const c_char),
    pub postdata_elem_set_to_buffer: extern "C" fn(*mut SinetPostDataElem, *const u8, usize),
    pub postdata_elem_set_to_text: extern "C" fn(*mut SinetPostDataElem, *const c_char),
    pub postdata_elem_get_type: extern "C" fn(*mut SinetPostDataElem) -> SinetPostDataElemType,
    pub postdata_elem_get_file: extern "C" fn(*mut SinetPostDataElem) -> *mut c_char,
    pub postdata_elem_get_text: extern "C" fn(*mut SinetPostDataElem) -> *mut c_char,
    pub postdata_elem_get_buffer_size: extern "C" fn(*mut SinetPostDataElem) -> usize,
    pub postdata_elem_copy_buffer: extern "C" fn(*mut SinetPostDataElem, *mut u8, usize) -> usize,
}

static API: SinetApi = SinetApi {
    size: std::mem::size_of::<SinetApi>(),
    version: SINET_API_VERSION,

    free_string: sinet_free_string,

    config_new: sinet_config_new,
    config_add_ref: sinet_config_add_ref,
    config_release: sinet_config_release,
    config_get_refct: sinet_config_get_refct,
    config_get_strvar: sinet_config_get_strvar,
    config_set_strvar: sinet_config_set_strvar,
    config_remove_strvar: sinet_config_remove_strvar,

    pool_new: sinet_pool_new,
    pool_add_ref: sinet_pool_add_ref,
    pool_release: sinet_pool_release,
    pool_get_refct: sinet_pool_get_refct,
    pool_execute: sinet_pool_execute,
    pool_cancel: sinet_pool_cancel,
    pool_is_running: sinet_pool_is_running,
    pool_is_queued: sinet_pool_is_queued,
    pool_is_running_or_queued: sinet_pool_is_running_or_queued,
    pool_is_finished: sinet_pool_is_finished,
    pool_clear_all: sinet_pool_clear_all,

    task_new: sinet_task_new,
    task_add_ref: sinet_task_add_ref,
    task_release: sinet_task_release,
    task_get_refct: sinet_task_get_refct,
    task_add_request: sinet_task_add_request,
    task_get_request: sinet_task_get_request,
    task_get_request_count: sinet_task_get_request_count,
    task_get_status: sinet_task_get_status,
    task_get_error_code: sinet_task_get_error_code,
    task_wait: sinet_task_wait,
    task_get_id: sinet_task_get_id,

    request_new: sinet_request_new,
    request_add_ref: sinet_request_add_ref,
    request_release: sinet_request_release,
    request_get_refct: sinet_request_get_refct,
    request_set_method: sinet_request_set_method,
    request_get_method: sinet_request_get_method,
    request_set_url: sinet_request_set_url,
    request_get_url: sinet_request_get_url,
    request_set_header: sinet_request_set_header,
    request_set_headers_json: sinet_request_set_headers_json,
    request_get_headers_json: sinet_request_get_headers_json,
    request_get_response_headers_json: sinet_request_get_response_headers_json,
    request_get_response_header: sinet_request_get_response_header,
    request_set_postdata: sinet_request_set_postdata,
    request_get_postdata: sinet_request_get_postdata,
    request_set_outmode: sinet_request_set_outmode,
    request_get_outmode: sinet_request_get_outmode,
    request_set_outfile: sinet_request_set_outfile,
    request_get_outfile: sinet_request_get_outfile,
    request_get_response_size: sinet_request_get_response_size,
    request_copy_response_buffer: sinet_request_copy_response_buffer,
    request_get_response_errcode: sinet_request_get_response_errcode,
    request_get_response_status: sinet_request_get_response_status,

    postdata_new: sinet_postdata_new,
    postdata_add_ref: sinet_postdata_add_ref,
    postdata_release: sinet_postdata_release,
    postdata_get_refct: sinet_postdata_get_refct,
    postdata_clear: sinet_postdata_clear,
    postdata_add_elem: sinet_postdata_add_elem,
    postdata_remove_elem: sinet_postdata_remove_elem,
    postdata_get_elem_count: sinet_postdata_get_elem_count,
    postdata_get_elem: sinet_postdata_get_elem,

    postdata_elem_new: sinet_postdata_elem_new,
    postdata_elem_add_ref: sinet_postdata_elem_add_ref,
    postdata_elem_release: sinet_postdata_elem_release,
    postdata_elem_get_refct: sinet_postdata_elem_get_refct,
    postdata_elem_set_name: sinet_postdata_elem_set_name,
    postdata_elem_get_name: sinet_postdata_elem_get_name,
    postdata_elem_set_to_empty: sinet_postdata_elem_set_to_empty,
    postdata_elem_set_to_file: sinet_postdata_elem_set_to_file,
    postdata_elem_set_to_buffer: sinet_postdata_elem_set_to_buffer,
    postdata_elem_set_to_text: sinet_postdata_elem_set_to_text,
    postdata_elem_get_type: sinet_postdata_elem_get_type,
    postdata_elem_get_file: sinet_postdata_elem_get_file,
    postdata_elem_get_text: sinet_postdata_elem_get_text,
    postdata_elem_get_buffer_size: sinet_postdata_elem_get_buffer_size,
    postdata_elem_copy_buffer: sinet_postdata_elem_copy_buffer,
};

/// The library's function table. Valid for the life of the process.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_get_api() -> *const SinetApi {
    &API
}

/// `true` when a field at `offset` spanning `field_size` bytes lies inside a
/// struct of `struct_size` bytes.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_member_exists(struct_size: usize, offset: usize, field_size: usize) -> bool {
    offset
        .checked_add(field_size)
        .is_some_and(|end| end <= struct_size)
}
