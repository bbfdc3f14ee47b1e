//! Handle types and conversions for the FFI boundary.
//!
//! # Design
//! Every object crosses the boundary as a pointer produced by
//! `Arc::into_raw`, so the C side's add-ref / release map directly onto the
//! `Arc` strong count and a handle stays valid for as long as C holds a
//! reference, independent of what the pool does with the task. Inside Rust
//! the core types keep their own shared ownership; these wrappers exist only
//! at the boundary.

use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use sinet_core::{Config, PostData, PostDataElem, PostDataElemType, Pool, Request, Task, TaskStatus};

/// Opaque handle to a `Pool` with its coordinator thread.
pub struct SinetPool {
    pub(crate) inner: Pool,
}

/// Opaque handle to a `Task`.
pub struct SinetTask {
    pub(crate) inner: Task,
}

/// Opaque handle to a `Request`.
pub struct SinetRequest {
    pub(crate) inner: Request,
}

/// Opaque handle to a `PostData` list.
pub struct SinetPostData {
    pub(crate) inner: PostData,
}

/// Opaque handle to one `PostDataElem`.
pub struct SinetPostDataElem {
    pub(crate) inner: PostDataElem,
}

/// Opaque handle to a `Config` string store.
pub struct SinetConfig {
    pub(crate) inner: Mutex<Config>,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Task status as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinetTaskStatus {
    Created = 0,
    Queued = 1,
    Running = 2,
    Canceled = 3,
    Completed = 4,
}

impl From<TaskStatus> for SinetTaskStatus {
    fn from(s: TaskStatus) -> Self {
        match s {
            TaskStatus::Created => SinetTaskStatus::Created,
            TaskStatus::Queued => SinetTaskStatus::Queued,
            TaskStatus::Running => SinetTaskStatus::Running,
            TaskStatus::Canceled => SinetTaskStatus::Canceled,
            TaskStatus::Completed => SinetTaskStatus::Completed,
        }
    }
}

/// Where a request's response bytes go.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinetOutMode {
    Buffer = 0,
    File = 1,
}

/// Kind of value held by a post-data element.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinetPostDataElemType {
    Empty = 0,
    File = 1,
    Buffer = 2,
    Text = 3,
}

impl From<PostDataElemType> for SinetPostDataElemType {
    fn from(t: PostDataElemType) -> Self {
        match t {
            PostDataElemType::Empty => SinetPostDataElemType::Empty,
            PostDataElemType::File => SinetPostDataElemType::File,
            PostDataElemType::Buffer => SinetPostDataElemType::Buffer,
            PostDataElemType::Text => SinetPostDataElemType::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Reference counting
// ---------------------------------------------------------------------------

/// Move `value` behind a new handle with a reference count of 1.
pub(crate) fn new_handle<T>(value: T) -> *mut T {
    Arc::into_raw(Arc::new(value)) as *mut T
}

/// Borrow the object behind `handle` for the duration of one call.
pub(crate) fn borrow<'a, T>(handle: *const T) -> Option<&'a T> {
    // SAFETY: non-null handles come from `new_handle` and are kept alive by
    // the caller's reference for the duration of the call.
    unsafe { handle.as_ref() }
}

pub(crate) fn refct<T>(handle: *const T) -> i32 {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: see `borrow`; the `Arc` is never dropped here.
    let arc = ManuallyDrop::new(unsafe { Arc::from_raw(handle) });
    Arc::strong_count(&arc) as i32
}

/// Returns the count after the increment.
pub(crate) fn add_ref<T>(handle: *const T) -> i32 {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: see `borrow`.
    unsafe { Arc::increment_strong_count(handle) };
    refct(handle)
}

/// Returns the count after the decrement; 0 means the object is gone.
pub(crate) fn release<T>(handle: *const T) -> i32 {
    if handle.is_null() {
        return 0;
    }
    let remaining = refct(handle) - 1;
    // SAFETY: the caller gives up one reference it owns.
    unsafe { Arc::decrement_strong_count(handle) };
    remaining
}

// ---------------------------------------------------------------------------
// Strings and panics
// ---------------------------------------------------------------------------

/// Read a borrowed C string. Null and invalid UTF-8 read as `None`.
pub(crate) fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    // SAFETY: the caller passes a NUL-terminated string that outlives the call.
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Hand a string to C. Free it with `sinet_free_string`.
pub(crate) fn into_c_string(s: String) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

/// Run `f`, turning a panic into `fallback` so it never unwinds into C.
pub(crate) fn ffi_guard<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(fallback)
}
