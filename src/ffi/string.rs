//! Locale decoded wide strings and argument vectors.

use crate::{error::Error, ffi::buffer::CBuffer, sys};
use libc::{c_int, wchar_t};
use std::{
    ffi::OsStr,
    fmt::{self, Debug, Formatter},
    iter,
    ptr::{self, NonNull},
};

/// `Py_DecodeLocale` reports a memory error by setting its size output to
/// `(size_t)-1`.
const DECODE_MEMORY_ERROR: usize = usize::MAX;

/// Why a byte string could not be decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The bytes are not valid in the current locale.
    Invalid,
    /// The interpreter's raw allocator is out of memory.
    OutOfMemory,
}

/// A wide string allocated by `Py_DecodeLocale` and released with
/// `PyMem_RawFree`.
pub struct RawWideString {
    ptr: NonNull<wchar_t>,
}

impl RawWideString {
    /// Decodes a marshaled byte string with the current locale.
    pub fn decode_locale(arg: &CBuffer) -> Result<Self, DecodeError> {
        let mut size: usize = 0;
        let ptr = unsafe { sys::Py_DecodeLocale(arg.as_ptr(), &mut size) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr }),
            None if size == DECODE_MEMORY_ERROR => Err(DecodeError::OutOfMemory),
            None => Err(DecodeError::Invalid),
        }
    }

    pub fn as_ptr(&self) -> *mut wchar_t {
        self.ptr.as_ptr()
    }
}

impl Drop for RawWideString {
    fn drop(&mut self) {
        unsafe { sys::PyMem_RawFree(self.ptr.as_ptr().cast()) };
    }
}

impl Debug for RawWideString {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("RawWideString").field(&self.ptr).finish()
    }
}

/// A NULL-terminated `argv` of decoded wide strings for `Py_Main`.
#[derive(Debug)]
pub struct ArgVector {
    args: Vec<RawWideString>,
    argv: Vec<*mut wchar_t>,
}

impl ArgVector {
    /// Decodes every argument in order, stopping at the first one that
    /// cannot be decoded. Arguments decoded up to that point are released
    /// before returning.
    pub fn decode<I, S>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args = args
            .into_iter()
            .enumerate()
            .map(|(position, arg)| {
                let arg = arg.as_ref();
                let marshaled = CBuffer::from_os_str(arg);
                RawWideString::decode_locale(&marshaled).map_err(|err| match err {
                    DecodeError::Invalid => Error::Decoding {
                        arg: arg.to_owned(),
                        position,
                    },
                    DecodeError::OutOfMemory => Error::Allocation {
                        size: marshaled.len() + 1,
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let argv = args
            .iter()
            .map(RawWideString::as_ptr)
            .chain(iter::once(ptr::null_mut()))
            .collect();

        Ok(Self { args, argv })
    }

    /// Returns the number of arguments.
    pub fn argc(&self) -> c_int {
        self.args.len() as c_int
    }

    pub fn as_mut_ptr(&mut self) -> *mut *mut wchar_t {
        self.argv.as_mut_ptr()
    }
}
