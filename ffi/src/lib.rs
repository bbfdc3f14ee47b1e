//! C-ABI wrapper around `sinet-core`.
//!
//! # Overview
//! Exposes pools, tasks, requests, post data and config through `extern "C"`
//! functions so any language with a C FFI can drive transfers without linking
//! against Rust types directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `ffi_guard` so panics
//!   never cross the FFI boundary.
//! - Objects are reference counted handles. Each type has `*_add_ref`,
//!   `*_release` and `*_get_refct`; creation returns a count of 1.
//! - Null handles degrade to no-ops, zero, `false` or null.
//! - Returned strings are owned by the caller and freed with
//!   `sinet_free_string`.

pub mod api;
pub mod config;
pub mod postdata;
pub mod types;

use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::c_char;
use std::time::Duration;

use sinet_core::{HttpConfig, HttpTransport, OutputMode, Pool, PoolConfig, Request, Task};

use types::*;

/// Free a string returned by any `sinet_*` function. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_free_string(s: *mut c_char) {
    if !s.is_null() {
        ffi_guard((), || {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Create a pool with an HTTP transport and start its coordinator thread.
///
/// `config` may be null. Polling intervals come from the environment.
/// Returns null if the transport or the thread cannot be created.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_new(config: *mut SinetConfig) -> *mut SinetPool {
    ffi_guard(std::ptr::null_mut(), || {
        let http = HttpConfig::from_config(&config::snapshot(config));
        let pool = HttpTransport::new(http)
            .and_then(|transport| Pool::new(transport, PoolConfig::from_env()));
        match pool {
            Ok(pool) => new_handle(SinetPool { inner: pool }),
            Err(err) => {
                tracing::warn!(error = %err, "pool creation failed");
                std::ptr::null_mut()
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_add_ref(pool: *mut SinetPool) -> i32 {
    ffi_guard(0, || add_ref(pool))
}

/// Releasing the last reference stops the coordinator and cancels
/// outstanding tasks.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_release(pool: *mut SinetPool) -> i32 {
    ffi_guard(0, || release(pool))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_get_refct(pool: *mut SinetPool) -> i32 {
    ffi_guard(0, || refct(pool))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_execute(pool: *mut SinetPool, task: *mut SinetTask) {
    ffi_guard((), || {
        if let (Some(pool), Some(task)) = (borrow(pool), borrow(task)) {
            pool.inner.execute(&task.inner);
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_cancel(pool: *mut SinetPool, task: *mut SinetTask) {
    ffi_guard((), || {
        if let (Some(pool), Some(task)) = (borrow(pool), borrow(task)) {
            pool.inner.cancel(&task.inner);
        }
    })
}

fn pool_query(pool: *mut SinetPool, task: *mut SinetTask, f: fn(&Pool, &Task) -> bool) -> bool {
    ffi_guard(false, || match (borrow(pool), borrow(task)) {
        (Some(pool), Some(task)) => f(&pool.inner, &task.inner),
        _ => false,
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_is_running(pool: *mut SinetPool, task: *mut SinetTask) -> bool {
    pool_query(pool, task, Pool::is_running)
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_is_queued(pool: *mut SinetPool, task: *mut SinetTask) -> bool {
    pool_query(pool, task, Pool::is_queued)
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_is_running_or_queued(
    pool: *mut SinetPool,
    task: *mut SinetTask,
) -> bool {
    pool_query(pool, task, Pool::is_running_or_queued)
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_is_finished(pool: *mut SinetPool, task: *mut SinetTask) -> bool {
    pool_query(pool, task, Pool::is_finished)
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_pool_clear_all(pool: *mut SinetPool) {
    ffi_guard((), || {
        if let Some(pool) = borrow(pool) {
            pool.inner.clear_all();
        }
    })
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_new() -> *mut SinetTask {
    ffi_guard(std::ptr::null_mut(), || {
        new_handle(SinetTask { inner: Task::new() })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_add_ref(task: *mut SinetTask) -> i32 {
    ffi_guard(0, || add_ref(task))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_release(task: *mut SinetTask) -> i32 {
    ffi_guard(0, || release(task))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_refct(task: *mut SinetTask) -> i32 {
    ffi_guard(0, || refct(task))
}

/// Append `request`. The task shares it; the caller keeps its reference.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_add_request(task: *mut SinetTask, request: *mut SinetRequest) {
    ffi_guard((), || {
        if let (Some(task), Some(request)) = (borrow(task), borrow(request)) {
            task.inner.add_request(request.inner.clone());
        }
    })
}

/// Returns a new reference to request `index`, or null when out of range.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_request(task: *mut SinetTask, index: usize) -> *mut SinetRequest {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(task).and_then(|t| t.inner.request(index)) {
            Some(request) => new_handle(SinetRequest { inner: request }),
            None => std::ptr::null_mut(),
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_request_count(task: *mut SinetTask) -> usize {
    ffi_guard(0, || borrow(task).map_or(0, |t| t.inner.request_count()))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_status(task: *mut SinetTask) -> SinetTaskStatus {
    ffi_guard(SinetTaskStatus::Created, || {
        borrow(task).map_or(SinetTaskStatus::Created, |t| t.inner.status().into())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_error_code(task: *mut SinetTask) -> i32 {
    ffi_guard(0, || borrow(task).map_or(0, |t| t.inner.error_code()))
}

/// Block until the task reaches a terminal status or `timeout_ms` elapses.
/// Returns the status observed last.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_wait(task: *mut SinetTask, timeout_ms: u32) -> SinetTaskStatus {
    ffi_guard(SinetTaskStatus::Created, || match borrow(task) {
        Some(task) => task
            .inner
            .wait(Duration::from_millis(u64::from(timeout_ms)))
            .into(),
        None => SinetTaskStatus::Created,
    })
}

/// Free the result with `sinet_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_task_get_id(task: *mut SinetTask) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(task) {
        Some(task) => into_c_string(task.inner.id().to_string()),
        None => std::ptr::null_mut(),
    })
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_new() -> *mut SinetRequest {
    ffi_guard(std::ptr::null_mut(), || {
        new_handle(SinetRequest {
            inner: Request::new(),
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_add_ref(request: *mut SinetRequest) -> i32 {
    ffi_guard(0, || add_ref(request))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_release(request: *mut SinetRequest) -> i32 {
    ffi_guard(0, || release(request))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_refct(request: *mut SinetRequest) -> i32 {
    ffi_guard(0, || refct(request))
}

/// Set the method by name, case-insensitively. Returns `false` for an
/// unknown method, leaving the previous one in place.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_method(request: *mut SinetRequest, method: *const c_char) -> bool {
    ffi_guard(false, || {
        let (Some(request), Some(method)) = (borrow(request), str_arg(method)) else {
            return false;
        };
        match method.parse() {
            Ok(method) => {
                request.inner.set_method(method);
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "rejected request method");
                false
            }
        }
    })
}

/// The effective method. Free the result with `sinet_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_method(request: *mut SinetRequest) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(request) {
        Some(request) => into_c_string(request.inner.method().as_str().to_string()),
        None => std::ptr::null_mut(),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_url(request: *mut SinetRequest, url: *const c_char) {
    ffi_guard((), || {
        if let (Some(request), Some(url)) = (borrow(request), str_arg(url)) {
            request.inner.set_url(url);
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_url(request: *mut SinetRequest) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(request) {
        Some(request) => into_c_string(request.inner.url()),
        None => std::ptr::null_mut(),
    })
}

/// Set one request header, replacing any previous value for `key`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_header(
    request: *mut SinetRequest,
    key: *const c_char,
    value: *const c_char,
) {
    ffi_guard((), || {
        if let (Some(request), Some(key), Some(value)) =
            (borrow(request), str_arg(key), str_arg(value))
        {
            request.inner.set_header(key, value);
        }
    })
}

/// Replace all request headers with a JSON object of strings.
/// Returns `false` if the JSON does not parse.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_headers_json(
    request: *mut SinetRequest,
    json: *const c_char,
) -> bool {
    ffi_guard(false, || {
        let (Some(request), Some(json)) = (borrow(request), str_arg(json)) else {
            return false;
        };
        match serde_json::from_str::<HashMap<String, String>>(json) {
            Ok(headers) => {
                request.inner.set_headers(headers);
                true
            }
            Err(_) => false,
        }
    })
}

/// Request headers as a JSON object.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_headers_json(request: *mut SinetRequest) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(request) {
        Some(request) => headers_json(&request.inner.headers()),
        None => std::ptr::null_mut(),
    })
}

/// Response headers as a JSON object.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_response_headers_json(
    request: *mut SinetRequest,
) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(request) {
        Some(request) => headers_json(&request.inner.response_headers()),
        None => std::ptr::null_mut(),
    })
}

/// One response header by case-insensitive name, or null when absent.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_response_header(
    request: *mut SinetRequest,
    name: *const c_char,
) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        let (Some(request), Some(name)) = (borrow(request), str_arg(name)) else {
            return std::ptr::null_mut();
        };
        request
            .inner
            .response_headers()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map_or(std::ptr::null_mut(), |(_, v)| into_c_string(v))
    })
}

fn headers_json(headers: &HashMap<String, String>) -> *mut c_char {
    match serde_json::to_string(headers) {
        Ok(json) => into_c_string(json),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Attach `postdata`, or detach with null. The request shares the list.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_postdata(
    request: *mut SinetRequest,
    postdata: *mut SinetPostData,
) {
    ffi_guard((), || {
        if let Some(request) = borrow(request) {
            request
                .inner
                .set_postdata(borrow(postdata).map(|p| p.inner.clone()));
        }
    })
}

/// Returns a new reference to the attached post data, or null.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_postdata(request: *mut SinetRequest) -> *mut SinetPostData {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(request).and_then(|r| r.inner.postdata()) {
            Some(postdata) => new_handle(SinetPostData { inner: postdata }),
            None => std::ptr::null_mut(),
        }
    })
}

/// Switch output mode. `File` only succeeds once a path was given with
/// `sinet_request_set_outfile`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_outmode(request: *mut SinetRequest, mode: SinetOutMode) -> bool {
    ffi_guard(false, || {
        let Some(request) = borrow(request) else {
            return false;
        };
        match (mode, request.inner.output()) {
            (SinetOutMode::Buffer, _) => {
                request.inner.set_output(OutputMode::Buffer);
                true
            }
            (SinetOutMode::File, OutputMode::File(_)) => true,
            (SinetOutMode::File, OutputMode::Buffer) => false,
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_outmode(request: *mut SinetRequest) -> SinetOutMode {
    ffi_guard(SinetOutMode::Buffer, || {
        match borrow(request).map(|r| r.inner.output()) {
            Some(OutputMode::File(_)) => SinetOutMode::File,
            _ => SinetOutMode::Buffer,
        }
    })
}

/// Stream the response into `path` and switch to file mode.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_set_outfile(request: *mut SinetRequest, path: *const c_char) {
    ffi_guard((), || {
        if let (Some(request), Some(path)) = (borrow(request), str_arg(path)) {
            request.inner.set_output(OutputMode::File(path.into()));
        }
    })
}

/// Null in buffer mode.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_outfile(request: *mut SinetRequest) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(request).map(|r| r.inner.output()) {
            Some(OutputMode::File(path)) => into_c_string(path.to_string_lossy().into_owned()),
            _ => std::ptr::null_mut(),
        }
    })
}

/// Total response bytes received, in either output mode.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_response_size(request: *mut SinetRequest) -> usize {
    ffi_guard(0, || borrow(request).map_or(0, |r| r.inner.response_size()))
}

/// Copy up to `cap` bytes of the buffered response into `dst`.
/// Returns the number of bytes copied.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_copy_response_buffer(
    request: *mut SinetRequest,
    dst: *mut u8,
    cap: usize,
) -> usize {
    ffi_guard(0, || {
        let Some(request) = borrow(request) else { return 0 };
        if dst.is_null() {
            return 0;
        }
        let buffer = request.inner.response_buffer();
        let n = buffer.len().min(cap);
        // SAFETY: the caller guarantees `dst` has room for `cap` bytes.
        unsafe { std::ptr::copy_nonoverlapping(buffer.as_ptr(), dst, n) };
        n
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_response_errcode(request: *mut SinetRequest) -> i32 {
    ffi_guard(0, || borrow(request).map_or(0, |r| r.inner.response_errcode()))
}

/// HTTP status of the response, 0 before headers arrive.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_request_get_response_status(request: *mut SinetRequest) -> i32 {
    ffi_guard(0, || {
        borrow(request).map_or(0, |r| i32::from(r.inner.response_status()))
    })
}
