//! Interpreter and C runtime function bindings.

#[cfg(feature = "python")]
#[path = "sys/python.rs"]
mod bindings;

#[cfg(not(feature = "python"))]
#[path = "sys/mock.rs"]
mod bindings;

pub use self::bindings::*;
