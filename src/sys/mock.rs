//! Mock interpreter bindings.
//!
//! The C runtime functions are forwarded to `libc`, but every allocation,
//! wide string and file handle that crosses the boundary is tracked per
//! thread so that tests can check it is released exactly once and through the
//! matching deallocator. Source code is "executed" by a tiny evaluator that
//! only understands `raise` statements.
//!
//! An unhandled `SystemExit` in the `PyRun_*` functions terminates the process
//! in CPython. Here it unwinds with a [`ProcessExit`] payload instead, which
//! [`exit_code_of`] turns back into the exit code.

#![allow(non_snake_case)]
// The inspection helpers are only used by tests.
#![cfg_attr(not(test), allow(dead_code))]

use libc::{c_char, c_int, c_void, size_t, wchar_t, FILE};
use std::{
    cell::RefCell,
    collections::HashSet,
    ffi::CStr,
    mem,
    panic::{self, AssertUnwindSafe},
    ptr, slice, str,
};

pub use libc::{fseek, ftell, rewind};

/// Opaque stand-in for the interpreter's compiler flags.
pub enum PyCompilerFlags {}

#[derive(Default)]
struct State {
    allocations: HashSet<usize>,
    raw_allocations: HashSet<usize>,
    raw_frees: usize,
    files: HashSet<usize>,
    calls: usize,
    argv: Vec<String>,
    sources: Vec<String>,
    filenames: Vec<String>,
    failing_allocation: Option<usize>,
    failing_raw_allocation: bool,
    short_read: bool,
}

/// Unwinding payload standing in for the interpreter exiting the process.
#[derive(Debug)]
pub struct ProcessExit(pub c_int);

/// Runs `f`, returning `Err` with the exit code if the interpreter would have
/// exited the process.
pub fn exit_code_of<T>(f: impl FnOnce() -> T) -> Result<T, c_int> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        match payload.downcast::<ProcessExit>() {
            Ok(exit) => exit.0,
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

fn with_state<T>(f: impl FnOnce(&mut State) -> T) -> T {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// A snapshot of the resources currently held across the boundary by this
/// thread.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Probe {
    /// Live `malloc` allocations.
    pub allocations: usize,
    /// Live `Py_DecodeLocale` results.
    pub raw_allocations: usize,
    /// Total `PyMem_RawFree` calls.
    pub raw_frees: usize,
    /// Open `FILE` handles.
    pub open_files: usize,
    /// Total interpreter entry point calls.
    pub calls: usize,
}

pub fn probe() -> Probe {
    with_state(|state| Probe {
        allocations: state.allocations.len(),
        raw_allocations: state.raw_allocations.len(),
        raw_frees: state.raw_frees,
        open_files: state.files.len(),
        calls: state.calls,
    })
}

/// Returns the arguments of the last `Py_Main` call.
pub fn last_argv() -> Vec<String> {
    with_state(|state| state.argv.clone())
}

/// Returns every source string executed so far.
pub fn executed_sources() -> Vec<String> {
    with_state(|state| state.sources.clone())
}

/// Returns every file name passed to `PyRun_AnyFileExFlags` so far.
pub fn executed_filenames() -> Vec<String> {
    with_state(|state| state.filenames.clone())
}

/// Makes the next `malloc` of exactly `size` bytes fail.
pub fn fail_allocation_of(size: usize) {
    with_state(|state| state.failing_allocation = Some(size));
}

/// Makes the next `Py_DecodeLocale` report a memory error.
pub fn fail_next_raw_allocation() {
    with_state(|state| state.failing_raw_allocation = true);
}

/// Makes the next `fread` return one element less than requested.
pub fn short_read_next() {
    with_state(|state| state.short_read = true);
}

pub unsafe fn malloc(size: size_t) -> *mut c_void {
    let fail = with_state(|state| {
        let fail = state.failing_allocation == Some(size);
        if fail {
            state.failing_allocation = None;
        }
        fail
    });
    if fail {
        return ptr::null_mut();
    }
    let ptr = libc::malloc(size);
    if !ptr.is_null() {
        with_state(|state| state.allocations.insert(ptr as usize));
    }
    ptr
}

pub unsafe fn free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    assert!(
        with_state(|state| state.allocations.remove(&(ptr as usize))),
        "free called on a pointer not allocated with malloc",
    );
    libc::free(ptr);
}

pub unsafe fn fopen(filename: *const c_char, mode: *const c_char) -> *mut FILE {
    let stream = libc::fopen(filename, mode);
    if !stream.is_null() {
        with_state(|state| state.files.insert(stream as usize));
    }
    stream
}

pub unsafe fn fclose(stream: *mut FILE) -> c_int {
    assert!(
        with_state(|state| state.files.remove(&(stream as usize))),
        "fclose called on a stream that is not open",
    );
    libc::fclose(stream)
}

pub unsafe fn fread(ptr: *mut c_void, size: size_t, nobj: size_t, stream: *mut FILE) -> size_t {
    let short = with_state(|state| mem::take(&mut state.short_read));
    let nobj = if short { nobj.saturating_sub(1) } else { nobj };
    libc::fread(ptr, size, nobj, stream)
}

/// Decodes with a strict UTF-8 locale.
pub unsafe fn Py_DecodeLocale(arg: *const c_char, size: *mut size_t) -> *mut wchar_t {
    let mut wide = match str::from_utf8(CStr::from_ptr(arg).to_bytes()) {
        Ok(text) => widen(text),
        Err(_) => {
            if !size.is_null() {
                *size = usize::MAX - 1;
            }
            return ptr::null_mut();
        }
    };
    let len = wide.len();
    wide.push(0);

    let raw = if with_state(|state| mem::take(&mut state.failing_raw_allocation)) {
        ptr::null_mut()
    } else {
        libc::malloc(wide.len() * mem::size_of::<wchar_t>()).cast::<wchar_t>()
    };
    if raw.is_null() {
        if !size.is_null() {
            *size = usize::MAX;
        }
        return raw;
    }
    ptr::copy_nonoverlapping(wide.as_ptr(), raw, wide.len());
    with_state(|state| state.raw_allocations.insert(raw as usize));

    if !size.is_null() {
        *size = len;
    }
    raw
}

pub unsafe fn PyMem_RawFree(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    assert!(
        with_state(|state| {
            state.raw_frees += 1;
            state.raw_allocations.remove(&(ptr as usize))
        }),
        "PyMem_RawFree called on a pointer not returned by Py_DecodeLocale",
    );
    libc::free(ptr);
}

/// Runs the source passed with `-c`, if any. Returns the process exit code.
pub unsafe fn Py_Main(argc: c_int, argv: *mut *mut wchar_t) -> c_int {
    let args = slice::from_raw_parts(argv, argc as usize)
        .iter()
        .map(|&arg| {
            assert!(
                with_state(|state| state.raw_allocations.contains(&(arg as usize))),
                "Py_Main argument was released before the call",
            );
            narrow(arg)
        })
        .collect::<Vec<_>>();

    let source = args
        .iter()
        .position(|arg| arg == "-c")
        .and_then(|i| args.get(i + 1))
        .cloned();
    with_state(|state| {
        state.calls += 1;
        state.argv = args;
    });

    match source.as_deref().map(execute) {
        None | Some(Outcome::Completed) => 0,
        Some(Outcome::Exit(code)) => code,
        Some(Outcome::Raised) => 1,
    }
}

pub unsafe fn PyRun_AnyFileExFlags(
    fp: *mut FILE,
    filename: *const c_char,
    closeit: c_int,
    _flags: *mut PyCompilerFlags,
) -> c_int {
    assert!(
        with_state(|state| state.files.contains(&(fp as usize))),
        "PyRun_AnyFileExFlags called with a stream that is not open",
    );

    let mut source = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = libc::fread(chunk.as_mut_ptr().cast(), 1, chunk.len(), fp);
        if read == 0 {
            break;
        }
        source.extend_from_slice(&chunk[..read]);
    }
    if closeit != 0 {
        fclose(fp);
    }

    let filename = CStr::from_ptr(filename).to_string_lossy().into_owned();
    with_state(|state| {
        state.calls += 1;
        state.filenames.push(filename);
    });
    simple_status(execute(&String::from_utf8_lossy(&source)))
}

pub unsafe fn PyRun_SimpleStringFlags(
    command: *const c_char,
    _flags: *mut PyCompilerFlags,
) -> c_int {
    let source = CStr::from_ptr(command).to_string_lossy().into_owned();
    let outcome = execute(&source);
    with_state(|state| {
        state.calls += 1;
        state.sources.push(source);
    });
    simple_status(outcome)
}

#[derive(Debug, Eq, PartialEq)]
enum Outcome {
    Completed,
    Exit(c_int),
    Raised,
}

fn execute(source: &str) -> Outcome {
    for line in source.lines().map(|line| line.trim()) {
        let exception = match line.strip_prefix("raise ") {
            Some(exception) => exception.trim(),
            None => continue,
        };
        return match exception {
            "SystemExit" | "SystemExit()" => Outcome::Exit(0),
            _ => exception
                .strip_prefix("SystemExit(")
                .and_then(|code| code.strip_suffix(')'))
                .and_then(|code| code.trim().parse().ok())
                .map(Outcome::Exit)
                .unwrap_or(Outcome::Raised),
        };
    }
    Outcome::Completed
}

/// The `PyRun_*` functions report an exception as `-1`, except for
/// `SystemExit` which exits the process with its code.
fn simple_status(outcome: Outcome) -> c_int {
    match outcome {
        Outcome::Completed => 0,
        Outcome::Exit(code) => panic::panic_any(ProcessExit(code)),
        Outcome::Raised => -1,
    }
}

fn widen(text: &str) -> Vec<wchar_t> {
    if mem::size_of::<wchar_t>() == 2 {
        text.encode_utf16().map(|unit| unit as wchar_t).collect()
    } else {
        text.chars().map(|c| u32::from(c) as wchar_t).collect()
    }
}

unsafe fn narrow(wide: *const wchar_t) -> String {
    let len = (0..).take_while(|&i| *wide.add(i) != 0).count();
    let units = slice::from_raw_parts(wide, len);
    if mem::size_of::<wchar_t>() == 2 {
        let units = units.iter().map(|&unit| unit as u16).collect::<Vec<_>>();
        String::from_utf16_lossy(&units)
    } else {
        units
            .iter()
            .map(|&unit| char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_raise_statements() {
        assert_eq!(execute("1+1"), Outcome::Completed);
        assert_eq!(execute(""), Outcome::Completed);
        assert_eq!(execute("raise SystemExit(3)"), Outcome::Exit(3));
        assert_eq!(execute("x = 1\n  raise SystemExit"), Outcome::Exit(0));
        assert_eq!(execute("raise ValueError('nope')"), Outcome::Raised);
    }

    #[test]
    fn system_exit_leaves_the_process() {
        let command = b"raise SystemExit(3)\0";
        let result = exit_code_of(|| unsafe {
            PyRun_SimpleStringFlags(command.as_ptr().cast(), ptr::null_mut())
        });
        assert_eq!(result, Err(3));
        assert_eq!(exit_code_of(|| 42), Ok(42));
    }

    #[test]
    fn wide_strings_round_trip() {
        let mut wide = widen("héllo 🦀");
        wide.push(0);
        assert_eq!(unsafe { narrow(wide.as_ptr()) }, "héllo 🦀");
    }

    #[test]
    #[should_panic(expected = "not allocated with malloc")]
    fn free_rejects_foreign_pointers() {
        let raw = unsafe { Py_DecodeLocale(b"x\0".as_ptr().cast(), ptr::null_mut()) };
        unsafe { free(raw.cast()) };
    }
}
