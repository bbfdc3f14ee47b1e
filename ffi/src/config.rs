//! `SinetConfig`: the string variable store passed to `sinet_pool_new`.

use std::os::raw::c_char;
use std::sync::Mutex;

use sinet_core::Config;

use crate::types::*;

/// Create an empty config. Reference count starts at 1.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_new() -> *mut SinetConfig {
    ffi_guard(std::ptr::null_mut(), || {
        new_handle(SinetConfig {
            inner: Mutex::new(Config::new()),
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_add_ref(config: *mut SinetConfig) -> i32 {
    ffi_guard(0, || add_ref(config))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_release(config: *mut SinetConfig) -> i32 {
    ffi_guard(0, || release(config))
}

#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_get_refct(config: *mut SinetConfig) -> i32 {
    ffi_guard(0, || refct(config))
}

/// Returns a copy of variable `id`, or null when unset. Free with
/// `sinet_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_get_strvar(config: *mut SinetConfig, id: i32) -> *mut c_char {
    ffi_guard(std::ptr::null_mut(), || {
        let Some(config) = borrow(config) else {
            return std::ptr::null_mut();
        };
        let vars = config.inner.lock().unwrap_or_else(|e| e.into_inner());
        match vars.get_strvar(id) {
            Some(value) => into_c_string(value.to_string()),
            None => std::ptr::null_mut(),
        }
    })
}

/// Set variable `id`. A null or non-UTF-8 value is rejected.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_set_strvar(
    config: *mut SinetConfig,
    id: i32,
    value: *const c_char,
) -> bool {
    ffi_guard(false, || {
        let (Some(config), Some(value)) = (borrow(config), str_arg(value)) else {
            return false;
        };
        let mut vars = config.inner.lock().unwrap_or_else(|e| e.into_inner());
        vars.set_strvar(id, value);
        true
    })
}

/// Returns `true` if the variable existed.
#[unsafe(no_mangle)]
pub extern "C" fn sinet_config_remove_strvar(config: *mut SinetConfig, id: i32) -> bool {
    ffi_guard(false, || {
        let Some(config) = borrow(config) else {
            return false;
        };
        let mut vars = config.inner.lock().unwrap_or_else(|e| e.into_inner());
        vars.remove_strvar(id)
    })
}

/// Snapshot of the store for building a transport.
pub(crate) fn snapshot(config: *mut SinetConfig) -> Config {
    match borrow(config) {
        Some(config) => config
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone(),
        None => Config::new(),
    }
}
