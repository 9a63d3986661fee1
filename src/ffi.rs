//! Module containing owned wrappers for resources that cross the interpreter
//! boundary.
//!
//! # Deallocators
//!
//! Memory handed to the interpreter comes from two different allocators:
//! buffers created on this side use the C `malloc`/`free` pair, while wide
//! strings created by `Py_DecodeLocale` must be released with
//! `PyMem_RawFree`. Each origin has its own owning type ([`buffer::CBuffer`]
//! and [`string::RawWideString`]) whose `Drop` calls the matching
//! deallocator, so neither can be released through the other.
//!
//! # Safety
//!
//! Raw pointers obtained from these wrappers are only valid while the wrapper
//! is alive. They must not be retained by the interpreter past the call they
//! were passed to.

pub mod buffer;
pub mod file;
pub mod string;
