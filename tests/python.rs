//! Runs the entry points against a real CPython interpreter.

#![cfg(feature = "python")]

use pyembed::{run_any_file, run_simple_file, run_simple_string, Error};
use std::io::Write as _;
use tempfile::NamedTempFile;

fn script(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// NOTE: The interpreter is initialized on, and holds the GIL for, the calling
// thread, so everything runs in a single test.
#[test]
fn interpreter_entry_points() {
    unsafe { pyo3_ffi::Py_InitializeEx(0) };

    assert_eq!(run_simple_string("1+1").code(), 0);
    assert_eq!(run_simple_string("raise ValueError('nope')").code(), -1);

    for source in &["x = 1 + 1\n", "", "import os\nraise KeyError(os.sep)\n"] {
        let script = script(source);
        let simple = run_simple_file(script.path()).unwrap();
        let any = run_any_file(script.path()).unwrap();

        assert_eq!(simple, run_simple_string(source), "{:?}", source);
        assert_eq!(simple, any, "{:?}", source);
    }

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        run_simple_file(dir.path()),
        Err(Error::FileOpen { .. })
    ));
    assert!(matches!(
        run_any_file(dir.path().join("missing.py")),
        Err(Error::FileOpen { .. })
    ));
}
