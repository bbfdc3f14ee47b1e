//! `SinetPostData` and `SinetPostDataElem` exports.

use std::os::raw::c_char;

use sinet_core::{PostData, PostDataElem};

use crate::types::*;

// ---------------------------------------------------------------------------
// PostData
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_new() -> *mut SinetPostData {
    ffi_guard(std::ptr::null_mut(), || {
        new_handle(SinetPostData {
            inner: PostData::new(),
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_add_ref(postdata: *mut SinetPostData) -> i32 {
    ffi_guard(0, || add_ref(postdata))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_release(postdata: *mut SinetPostData) -> i32 {
    ffi_guard(0, || release(postdata))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_get_refct(postdata: *mut SinetPostData) -> i32 {
    ffi_guard(0, || refct(postdata))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_clear(postdata: *mut SinetPostData) {
    ffi_guard((), || {
        if let Some(postdata) = borrow(postdata) {
            postdata.inner.clear();
        }
    })
}

/// Append `elem`. The list shares the element; the caller keeps its reference.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_add_elem(
    postdata: *mut SinetPostData,
    elem: *mut SinetPostDataElem,
) {
    ffi_guard((), || {
        if let (Some(postdata), Some(elem)) = (borrow(postdata), borrow(elem)) {
            postdata.inner.add_elem(elem.inner.clone());
        }
    })
}

/// Remove `elem` by identity. Returns `true` if it was in the list.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_remove_elem(
    postdata: *mut SinetPostData,
    elem: *mut SinetPostDataElem,
) -> bool {
    ffi_guard(false, || match (borrow(postdata), borrow(elem)) {
        (Some(postdata), Some(elem)) => postdata.inner.remove_elem(&elem.inner),
        _ => false,
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_get_elem_count(postdata: *mut SinetPostData) -> usize {
    ffi_guard(0, || borrow(postdata).map_or(0, |p| p.inner.element_count()))
}

/// Returns a new reference to element `index`, or null when out of range.
/// The returned handle shares state with the element in the list.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_get_elem(
    postdata: *mut SinetPostData,
    index: usize,
) -> *mut SinetPostDataElem {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(postdata).and_then(|p| p.inner.element(index)) {
            Some(elem) => new_handle(SinetPostDataElem { inner: elem }),
            None => std::ptr::null_mut(),
        }
    })
}

// ---------------------------------------------------------------------------
// PostDataElem
// ---------------------------------------------------------------------------

/// Create an empty, unnamed element.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_new() -> *mut SinetPostDataElem {
    ffi_guard(std::ptr::null_mut(), || {
        new_handle(SinetPostDataElem {
            inner: PostDataElem::new(),
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_add_ref(elem: *mut SinetPostDataElem) -> i32 {
    ffi_guard(0, || add_ref(elem))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_release(elem: *mut SinetPostDataElem) -> i32 {
    ffi_guard(0, || release(elem))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_refct(elem: *mut SinetPostDataElem) -> i32 {
    ffi_guard(0, || refct(elem))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_set_name(elem: *mut SinetPostDataElem, name: *const c_char) {
    ffi_guard((), || {
        if let (Some(elem), Some(name)) = (borrow(elem), str_arg(name)) {
            elem.inner.set_name(name);
        }
    })
}

/// Free the result with `sinet_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_name(elem: *mut SinetPostDataElem) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || match borrow(elem) {
        Some(elem) => into_c_string(elem.inner.name()),
        None => std::ptr::null_mut(),
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_set_to_empty(elem: *mut SinetPostDataElem) {
    ffi_guard((), || {
        if let Some(elem) = borrow(elem) {
            elem.inner.set_to_empty();
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_set_to_file(
    elem: *mut SinetPostDataElem,
    path: *const c_char,
) {
    ffi_guard((), || {
        if let (Some(elem), Some(path)) = (borrow(elem), str_arg(path)) {
            elem.inner.set_to_file(path);
        }
    })
}

/// Copy `len` bytes from `bytes` into the element. A null `bytes` with a
/// zero `len` stores an empty buffer.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_set_to_buffer(
    elem: *mut SinetPostDataElem,
    bytes: *const u8,
    len: usize,
) {
    ffi_guard((), || {
        let Some(elem) = borrow(elem) else { return };
        if bytes.is_null() {
            if len == 0 {
                elem.inner.set_to_buffer(Vec::new());
            }
            return;
        }
        // SAFETY: the caller guarantees `bytes` points to `len` readable bytes.
        let src = unsafe { std::slice::from_raw_parts(bytes, len) };
        elem.inner.set_to_buffer(src.to_vec());
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_set_to_text(
    elem: *mut SinetPostDataElem,
    text: *const c_char,
) {
    ffi_guard((), || {
        if let (Some(elem), Some(text)) = (borrow(elem), str_arg(text)) {
            elem.inner.set_to_text(text);
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_type(
    elem: *mut SinetPostDataElem,
) -> SinetPostDataElemType {
    ffi_guard(SinetPostDataElemType::Empty, || {
        borrow(elem).map_or(SinetPostDataElemType::Empty, |e| e.inner.elem_type().into())
    })
}

/// Null unless the element holds a file path.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_file(elem: *mut SinetPostDataElem) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(elem).and_then(|e| e.inner.file_path()) {
            Some(path) => into_c_string(path.to_string_lossy().into_owned()),
            None => std::ptr::null_mut(),
        }
    })
}

/// Null unless the element holds text.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_text(elem: *mut SinetPostDataElem) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        match borrow(elem).and_then(|e| e.inner.text_value()) {
            Some(text) => into_c_string(text),
            None => std::ptr::null_mut(),
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_get_buffer_size(elem: *mut SinetPostDataElem) -> usize {
    ffi_guard(0, || borrow(elem).map_or(0, |e| e.inner.buffer_size()))
}

/// Copy up to `cap` buffer bytes into `dst`. Returns the number copied.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_postdata_elem_copy_buffer(
    elem: *mut SinetPostDataElem,
    dst: *mut u8,
    cap: usize,
) -> usize {
    ffi_guard(0, || {
        let Some(elem) = borrow(elem) else { return 0 };
        if dst.is_null() || cap == 0 {
            return 0;
        }
        // SAFETY: the caller guarantees `dst` has room for `cap` bytes.
        let dst = unsafe { std::slice::from_raw_parts_mut(dst, cap) };
        elem.inner.copy_buffer_to(dst)
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};

    use super::*;
    use crate::sinet_free_string;

    fn take_string(s: *mut c_char) -> String {
        assert!(!s.is_null());
        let out = unsafe { CStr::from_ptr(s) }.to_str().unwrap().to_string();
        sinet_free_string(s);
        out
    }

    #[test]
    fn element_value_kinds() {
        let elem = sinet_postdata_elem_new();
        assert_eq!(sinet_postdata_elem_get_type(elem), SinetPostDataElemType::Empty);

        let text = CString::new("hello").unwrap();
        sinet_postdata_elem_set_to_text(elem, text.as_ptr());
        assert_eq!(sinet_postdata_elem_get_type(elem), SinetPostDataElemType::Text);
        assert_eq!(take_string(sinet_postdata_elem_get_text(elem)), "hello");
        assert!(sinet_postdata_elem_get_file(elem).is_null());

        let bytes = [9u8, 8, 7, 6];
        sinet_postdata_elem_set_to_buffer(elem, bytes.as_ptr(), bytes.len());
        assert_eq!(sinet_postdata_elem_get_type(elem), SinetPostDataElemType::Buffer);
        assert_eq!(sinet_postdata_elem_get_buffer_size(elem), 4);
        let mut dst = [0u8; 2];
        assert_eq!(sinet_postdata_elem_copy_buffer(elem, dst.as_mut_ptr(), dst.len()), 2);
        assert_eq!(dst, [9, 8]);

        let path = CString::new("/tmp/upload.bin").unwrap();
        sinet_postdata_elem_set_to_file(elem, path.as_ptr());
        assert_eq!(sinet_postdata_elem_get_type(elem), SinetPostDataElemType::File);
        assert_eq!(take_string(sinet_postdata_elem_get_file(elem)), "/tmp/upload.bin");
        assert_eq!(sinet_postdata_elem_get_buffer_size(elem), 0);

        let name = CString::new("field").unwrap();
        sinet_postdata_elem_set_name(elem, name.as_ptr());
        assert_eq!(take_string(sinet_postdata_elem_get_name(elem)), "field");

        sinet_postdata_elem_set_to_empty(elem);
        assert_eq!(sinet_postdata_elem_get_type(elem), SinetPostDataElemType::Empty);
        assert_eq!(sinet_postdata_elem_release(elem), 0);
    }

    #[test]
    fn list_shares_elements_with_handles() {
        let postdata = sinet_postdata_new();
        let elem = sinet_postdata_elem_new();
        sinet_postdata_add_elem(postdata, elem);
        assert_eq!(sinet_postdata_get_elem_count(postdata), 1);

        // The list keeps the element alive after the caller lets go.
        let got = sinet_postdata_get_elem(postdata, 0);
        let text = CString::new("shared").unwrap();
        sinet_postdata_elem_set_to_text(got, text.as_ptr());
        assert_eq!(take_string(sinet_postdata_elem_get_text(elem)), "shared");
        assert!(sinet_postdata_get_elem(postdata, 1).is_null());

        assert!(sinet_postdata_remove_elem(postdata, got));
        assert!(!sinet_postdata_remove_elem(postdata, elem));
        assert_eq!(sinet_postdata_get_elem_count(postdata), 0);

        sinet_postdata_add_elem(postdata, elem);
        sinet_postdata_clear(postdata);
        assert_eq!(sinet_postdata_get_elem_count(postdata), 0);

        sinet_postdata_elem_release(got);
        sinet_postdata_elem_release(elem);
        assert_eq!(sinet_postdata_release(postdata), 0);
    }

    #[test]
    fn null_handles_degrade() {
        let null_pd: *mut SinetPostData = std::ptr::null_mut();
        let null_elem: *mut SinetPostDataElem = std::ptr::null_mut();
        sinet_postdata_clear(null_pd);
        sinet_postdata_add_elem(null_pd, null_elem);
        assert_eq!(sinet_postdata_get_elem_count(null_pd), 0);
        assert!(sinet_postdata_get_elem(null_pd, 0).is_null());
        assert_eq!(sinet_postdata_elem_get_type(null_elem), SinetPostDataElemType::Empty);
        assert!(sinet_postdata_elem_get_name(null_elem).is_null());
        assert_eq!(
            sinet_postdata_elem_copy_buffer(null_elem, std::ptr::null_mut(), 4),
            0
        );
    }
}
