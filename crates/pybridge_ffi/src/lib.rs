//! # pybridge_ffi - Dynamic Python runtime loading
//!
//! This crate locates and loads an embedded CPython shared library at process
//! start, resolves the interpreter's public entry points by symbol lookup,
//! and exposes them as a typed, immutable table. It is the foundation the
//! `pybridge` crate builds its object model on; nothing above this layer
//! touches the interpreter except through [`EntryPoints`].
//!
//! ## Resolution order
//!
//! 1. The current process image (interpreter already linked or preloaded).
//! 2. An explicit path from `PYTHON_LIBRARY` or [`use_library_path`].
//! 3. A candidate matrix of versions (newest first), platform search paths
//!    and library name patterns, stopping at the first success.
//!
//! ## Environment variables
//!
//! - `PYTHON_LIBRARY`: full path to a Python shared library.
//! - `PYTHON_VERSION`: `3` or `3.11`; exact or major-only match enforced.
//! - `PYTHON_LOADER_LOGGING`: log every load attempt to stderr.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pybridge_ffi::{Runtime, use_version};
//!
//! use_version(3, Some(11)); // optional; must precede first resolution
//! let runtime = Runtime::initialize()?;
//! unsafe { (runtime.entry_points().Py_Initialize)() };
//! ```

pub mod loader;
pub mod table;

pub use loader::{
    use_library_path, use_version, LoadError, PyVersion, PythonLibrary, RequestedVersion,
    PYTHON_LIBRARY_ENV, PYTHON_LOADER_LOGGING_ENV, PYTHON_VERSION_ENV,
};
pub use table::{
    CompareOp, EntryPoints, PyCFunctionPtr, PyCFunctionWithKeywordsPtr, PyCapsuleDestructor,
    PyMethodDef, PyObject, PyObjectPtr, Runtime, METH_KEYWORDS, METH_VARARGS,
};
