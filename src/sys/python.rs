//! CPython very high level layer bindings.
//!
//! Linking against `libpython` is handled by `pyo3-ffi`'s build script.

#![allow(non_snake_case)]

use libc::{c_char, size_t, wchar_t};

pub use libc::{fclose, fopen, fread, free, fseek, ftell, malloc, rewind};
pub use pyo3_ffi::{
    PyCompilerFlags, PyMem_RawFree, PyRun_AnyFileExFlags, PyRun_SimpleStringFlags, Py_Main,
};

/// Returns a string that must be released with `PyMem_RawFree`.
///
/// NOTE: `pyo3-ffi` declares the `size` output as `Py_ssize_t`, while the C
/// API declares it as `size_t`. The memory error sentinel is `(size_t)-1`, so
/// it is read back as unsigned; both types have the same width.
pub unsafe fn Py_DecodeLocale(arg: *const c_char, size: *mut size_t) -> *mut wchar_t {
    pyo3_ffi::Py_DecodeLocale(arg, size.cast())
}
