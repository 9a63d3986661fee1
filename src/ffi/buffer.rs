//! C heap allocated, NUL-terminated byte buffers.

use crate::{error::Error, sys};
use libc::c_char;
use std::{
    alloc::{self, Layout},
    borrow::Cow,
    ffi::OsStr,
    fmt::{self, Debug, Formatter},
    path::Path,
    ptr::{self, NonNull},
    slice,
};

/// A byte buffer allocated with the C `malloc` and released with `free`.
///
/// The buffer always holds one extra trailing NUL byte past its length, so it
/// can be passed where the interpreter expects a C string. Note that the
/// interpreter stops reading at the first NUL, so interior NUL bytes truncate
/// the string as seen from the other side.
pub struct CBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl CBuffer {
    /// Marshals the specified bytes into a new buffer.
    ///
    /// Running out of memory here is unrecoverable and aborts the process.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        let mut buffer = match Self::alloc(bytes.len()) {
            Ok(buffer) => buffer,
            Err(_) => alloc::handle_alloc_error(
                Layout::array::<u8>(bytes.len()).unwrap_or_else(|_| Layout::new::<u8>()),
            ),
        };
        buffer.as_mut_slice().copy_from_slice(bytes);
        buffer
    }

    /// Marshals an OS string into a new buffer.
    pub fn from_os_str(s: &OsStr) -> Self {
        Self::new(os_str_bytes(s))
    }

    /// Marshals a path into a new buffer.
    pub fn from_path(path: &Path) -> Self {
        Self::from_os_str(path.as_os_str())
    }

    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Result<Self, Error> {
        let mut buffer = Self::alloc(len)?;
        // SAFETY: `alloc` returns storage for `len` bytes.
        unsafe { ptr::write_bytes(buffer.as_mut_ptr(), 0, len) };
        Ok(buffer)
    }

    /// Allocates storage for `len` bytes plus the terminator, leaving all but
    /// the terminator uninitialized.
    fn alloc(len: usize) -> Result<Self, Error> {
        let size = len.checked_add(1).ok_or(Error::Allocation { size: len })?;
        let ptr = unsafe { sys::malloc(size) }.cast::<u8>();
        let ptr = NonNull::new(ptr).ok_or(Error::Allocation { size })?;

        // SAFETY: The allocation is `len + 1` bytes long.
        unsafe { ptr.as_ptr().add(len).write(0) };
        log::trace!("allocated {} byte C buffer", size);

        Ok(Self { ptr, len })
    }

    /// Returns the number of bytes in the buffer, excluding the terminator.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the buffer as a C string pointer.
    pub fn as_ptr(&self) -> *const c_char {
        self.ptr.as_ptr().cast()
    }

    /// Returns the buffer as a mutable pointer to its first byte.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the buffer contents, excluding the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: Every constructor initializes the first `len` bytes before
        // handing out the buffer.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for CBuffer {
    fn drop(&mut self) {
        unsafe { sys::free(self.ptr.as_ptr().cast()) };
    }
}

impl Debug for CBuffer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}

#[cfg(unix)]
fn os_str_bytes(s: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(s.as_bytes())
}

#[cfg(not(unix))]
fn os_str_bytes(s: &OsStr) -> Cow<'_, [u8]> {
    match s.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

#[cfg(all(test, not(feature = "python")))]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn marshals_nul_terminated_copy() {
        let buffer = CBuffer::new("print('hi')");
        assert_eq!(buffer.len(), 11);
        assert_eq!(
            unsafe { CStr::from_ptr(buffer.as_ptr()) }.to_bytes(),
            b"print('hi')"
        );
    }

    #[test]
    fn empty_buffer_is_just_a_terminator() {
        let buffer = CBuffer::zeroed(0).unwrap();
        assert_eq!(buffer.len(), 0);
        assert_eq!(unsafe { *buffer.as_ptr() }, 0);
    }

    #[test]
    fn zeroed_reports_allocation_failure() {
        sys::fail_allocation_of(33);
        let err = CBuffer::zeroed(32).unwrap_err();
        assert!(matches!(err, Error::Allocation { size: 33 }));
        assert_eq!(sys::probe().allocations, 0);
    }

    #[test]
    fn drop_releases_through_free() {
        let before = sys::probe().allocations;
        let buffer = CBuffer::from_path(Path::new("/tmp/script.py"));
        assert_eq!(sys::probe().allocations, before + 1);
        drop(buffer);
        assert_eq!(sys::probe().allocations, before);
    }
}
