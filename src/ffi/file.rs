//! C stdio file handles shared with the interpreter.

use crate::{error::Error, ffi::buffer::CBuffer, sys};
use libc::{c_char, FILE, SEEK_END};
use std::{
    convert::TryFrom,
    io,
    mem::MaybeUninit,
    path::{Path, PathBuf},
    ptr::NonNull,
};

/// The mode a script file is opened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Text,
    Binary,
}

impl Mode {
    fn as_ptr(self) -> *const c_char {
        let mode: &'static [u8] = match self {
            Mode::Text => b"r\0",
            Mode::Binary => b"rb\0",
        };
        mode.as_ptr().cast()
    }
}

/// A `FILE` stream opened with the C runtime the interpreter is linked
/// against, closed exactly once when dropped.
#[derive(Debug)]
pub struct CFile {
    stream: NonNull<FILE>,
    path: PathBuf,
    c_path: CBuffer,
}

impl CFile {
    /// Opens the file at `path`.
    ///
    /// Directories are rejected with `EISDIR` even where the C runtime lets
    /// `fopen` succeed on them.
    pub fn open(path: &Path, mode: Mode) -> Result<Self, Error> {
        let c_path = CBuffer::from_path(path);
        let stream = unsafe { sys::fopen(c_path.as_ptr(), mode.as_ptr()) };
        let stream = match NonNull::new(stream) {
            Some(stream) => stream,
            None => {
                return Err(Error::FileOpen {
                    source: io::Error::last_os_error(),
                    path: path.to_owned(),
                })
            }
        };
        let file = Self {
            stream,
            path: path.to_owned(),
            c_path,
        };
        file.ensure_not_directory()?;
        log::trace!("opened '{}' in {:?} mode", path.display(), mode);

        Ok(file)
    }

    #[cfg(unix)]
    fn ensure_not_directory(&self) -> Result<(), Error> {
        let mut stat = MaybeUninit::<libc::stat>::uninit();
        let stat = unsafe {
            if libc::fstat(libc::fileno(self.as_ptr()), stat.as_mut_ptr()) != 0 {
                return Err(self.open_error(io::Error::last_os_error()));
            }
            stat.assume_init()
        };
        if stat.st_mode & libc::S_IFMT == libc::S_IFDIR {
            return Err(self.open_error(io::Error::from_raw_os_error(libc::EISDIR)));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn ensure_not_directory(&self) -> Result<(), Error> {
        if self.path.is_dir() {
            let source = io::Error::new(io::ErrorKind::Other, "is a directory");
            return Err(self.open_error(source));
        }
        Ok(())
    }

    pub fn as_ptr(&self) -> *mut FILE {
        self.stream.as_ptr()
    }

    /// Returns the path the file was opened with, as a C string.
    pub fn c_path(&self) -> &CBuffer {
        &self.c_path
    }

    /// Measures the file's length in bytes, leaving the stream positioned at
    /// its start.
    pub fn byte_len(&mut self) -> Result<usize, Error> {
        let stream = self.as_ptr();
        let len = unsafe {
            if sys::fseek(stream, 0, SEEK_END) != 0 {
                return Err(self.read_error(io::Error::last_os_error()));
            }
            let len = sys::ftell(stream);
            if len < 0 {
                return Err(self.read_error(io::Error::last_os_error()));
            }
            sys::rewind(stream);
            len
        };

        usize::try_from(len).map_err(|_| Error::Allocation { size: usize::MAX })
    }

    /// Reads the whole file into a new C buffer with a single bulk read.
    ///
    /// Anything short of the full length is an error; the read is never
    /// retried.
    pub fn read_to_buffer(&mut self) -> Result<CBuffer, Error> {
        let len = self.byte_len()?;
        let mut buffer = CBuffer::zeroed(len)?;

        let read = unsafe { sys::fread(buffer.as_mut_ptr().cast(), 1, len, self.as_ptr()) };
        if read != len {
            return Err(self.read_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read {} of {} bytes", read, len),
            )));
        }

        Ok(buffer)
    }

    fn open_error(&self, source: io::Error) -> Error {
        Error::FileOpen {
            path: self.path.clone(),
            source,
        }
    }

    fn read_error(&self, source: io::Error) -> Error {
        Error::Read {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for CFile {
    fn drop(&mut self) {
        unsafe { sys::fclose(self.stream.as_ptr()) };
        log::trace!("closed '{}'", self.path.display());
    }
}

#[cfg(all(test, not(feature = "python")))]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn script(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_whole_file() {
        let script = script(b"x = 1\r\nraise SystemExit(x)\n");
        let mut file = CFile::open(script.path(), Mode::Binary).unwrap();
        assert_eq!(file.byte_len().unwrap(), 27);

        let buffer = file.read_to_buffer().unwrap();
        assert_eq!(buffer.as_bytes(), b"x = 1\r\nraise SystemExit(x)\n");
    }

    #[test]
    fn short_read_is_an_error() {
        let script = script(b"print('hi')");
        let mut file = CFile::open(script.path(), Mode::Binary).unwrap();

        sys::short_read_next();
        let err = file.read_to_buffer().unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert_eq!(err.to_string(), format!(
            "entire read of '{}' fails: read 10 of 11 bytes",
            script.path().display()
        ));
    }

    #[test]
    fn missing_file_reports_os_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.py");

        let err = CFile::open(&path, Mode::Text).unwrap_err();
        match err {
            Error::FileOpen { path: err_path, source } => {
                assert_eq!(err_path, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            err => panic!("unexpected error {:?}", err),
        }
        assert_eq!(sys::probe().open_files, 0);
        assert_eq!(sys::probe().allocations, 0);
    }

    #[cfg(unix)]
    #[test]
    fn directories_do_not_open() {
        let dir = tempfile::tempdir().unwrap();

        for &mode in &[Mode::Text, Mode::Binary] {
            let err = CFile::open(dir.path(), mode).unwrap_err();
            match err {
                Error::FileOpen { path, source } => {
                    assert_eq!(path, dir.path());
                    assert_eq!(source.raw_os_error(), Some(libc::EISDIR));
                }
                err => panic!("unexpected error {:?}", err),
            }
        }
        assert_eq!(sys::probe().open_files, 0);
        assert_eq!(sys::probe().allocations, 0);
    }

    #[test]
    fn drop_closes_once() {
        let script = script(b"");
        let file = CFile::open(script.path(), Mode::Text).unwrap();
        assert_eq!(sys::probe().open_files, 1);
        drop(file);
        assert_eq!(sys::probe().open_files, 0);
    }
}
