//! Host-side failures that prevent a foreign entry point from running.

use std::{ffi::OsString, io, path::PathBuf};

/// Result type for operations that fail before reaching the interpreter.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error detected on the host side of the embedding boundary.
///
/// Whenever one of these is returned, the interpreter entry point was never
/// called and every resource acquired so far has already been released.
/// Failures *inside* the interpreter are reported as a [`Status`] instead.
///
/// [`Status`]: crate::Status
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument could not be decoded with the current locale.
    #[error("fail to call Py_DecodeLocale on argument {position} {arg:?}")]
    Decoding { arg: OsString, position: usize },

    /// A script could not be opened.
    #[error("fail to open '{}': {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A foreign buffer could not be allocated.
    #[error("memory alloc fails for {size} bytes")]
    Allocation { size: usize },

    /// A script could not be read into memory in its entirety.
    #[error("entire read of '{}' fails: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Returns the status to report for a call that never reached the
    /// interpreter.
    pub fn status(&self) -> i32 {
        match self {
            Error::Decoding { .. } | Error::FileOpen { .. } => -1,
            Error::Allocation { .. } | Error::Read { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn sentinel_statuses() {
        let open = Error::FileOpen {
            path: "missing.py".into(),
            source: io::ErrorKind::NotFound.into(),
        };
        assert_eq!(open.status(), -1);
        assert_eq!(Error::Allocation { size: 8 }.status(), 1);
    }

    #[test]
    fn file_errors_keep_their_cause() {
        let err = Error::Read {
            path: "script.py".into(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "read 3 of 4 bytes"),
        };
        assert_eq!(
            err.to_string(),
            "entire read of 'script.py' fails: read 3 of 4 bytes"
        );
        assert!(err.source().is_some());
    }
}
