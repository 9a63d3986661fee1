//! Bindings for the [CPython very high level layer](https://docs.python.org/3/c-api/veryhigh.html)
//! for programs that embed a Python interpreter.
//!
//! Interpreter initialization and finalization are left to the caller. Every
//! function here assumes at most one call is in flight per interpreter.
//!
//! Without the `python` feature the crate is built against an in-process
//! stand-in of the interpreter instead of linking `libpython`.

mod error;
mod ffi;
pub mod logger;
mod run;
mod sys;

pub use self::{
    error::{Error, Result},
    run::{main, run_any_file, run_simple_file, run_simple_string, Status},
};
pub use log;
