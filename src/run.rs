//! The interpreter's very high level entry points.

use crate::{
    error::{Error, Result},
    ffi::{
        buffer::CBuffer,
        file::{CFile, Mode},
        string::ArgVector,
    },
    sys,
};
use libc::c_int;
use log::{debug, warn};
use std::{
    ffi::OsStr,
    fmt::{self, Display, Formatter},
    path::Path,
    ptr,
};

/// The status returned by an interpreter entry point.
///
/// Its meaning is defined by the interpreter and is passed through as-is:
/// `Py_Main` returns a process exit code while the `PyRun_*` functions return
/// `0` on success and `-1` if an exception was raised. An unhandled
/// `SystemExit` in the `PyRun_*` functions exits the process instead of
/// returning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Status(c_int);

impl Status {
    /// Returns the raw status code.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Returns `true` for a zero status.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.0
    }
}

/// Runs the interpreter's main program with `args`, the first of which is
/// the program name. See [`Py_Main`].
///
/// This does not return until the interpreter session ends.
///
/// [`Py_Main`]: https://docs.python.org/3/c-api/veryhigh.html#c.Py_Main
pub fn main<I, S>(args: I) -> Result<Status>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut argv = ArgVector::decode(args).map_err(logged)?;

    debug!("calling Py_Main with {} arguments", argv.argc());
    let status = unsafe { sys::Py_Main(argv.argc(), argv.as_mut_ptr()) };
    Ok(Status(status))
}

/// Opens `path` in text mode and runs it, interactively if it refers to a
/// terminal. See [`PyRun_AnyFile`].
///
/// [`PyRun_AnyFile`]: https://docs.python.org/3/c-api/veryhigh.html#c.PyRun_AnyFile
pub fn run_any_file(path: impl AsRef<Path>) -> Result<Status> {
    let path = path.as_ref();
    let file = CFile::open(path, Mode::Text).map_err(logged)?;

    debug!("calling PyRun_AnyFileExFlags on '{}'", path.display());
    let status = unsafe {
        sys::PyRun_AnyFileExFlags(file.as_ptr(), file.c_path().as_ptr(), 0, ptr::null_mut())
    };
    Ok(Status(status))
}

/// Runs the script at `path` in the `__main__` module. See
/// [`PyRun_SimpleFile`].
///
/// The file is read into memory in binary mode and executed as a source
/// string instead of being handed to the interpreter as an open file.
///
/// [`PyRun_SimpleFile`]: https://docs.python.org/3/c-api/veryhigh.html#c.PyRun_SimpleFile
pub fn run_simple_file(path: impl AsRef<Path>) -> Result<Status> {
    let source = read_source(path.as_ref()).map_err(logged)?;
    Ok(run_source(&source))
}

/// Runs `command` in the `__main__` module. See [`PyRun_SimpleString`].
///
/// [`PyRun_SimpleString`]: https://docs.python.org/3/c-api/veryhigh.html#c.PyRun_SimpleString
pub fn run_simple_string(command: &str) -> Status {
    run_source(&CBuffer::new(command))
}

/// Reads the file at `path` into a C buffer, closing it before returning.
fn read_source(path: &Path) -> Result<CBuffer> {
    let mut file = CFile::open(path, Mode::Binary)?;
    file.read_to_buffer()
}

fn run_source(source: &CBuffer) -> Status {
    debug!("calling PyRun_SimpleStringFlags on {} bytes", source.len());
    Status(unsafe { sys::PyRun_SimpleStringFlags(source.as_ptr(), ptr::null_mut()) })
}

fn logged(err: Error) -> Error {
    warn!("{}", err);
    err
}
