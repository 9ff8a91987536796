//! # pybridge - Dynamic bridge to an embedded Python runtime
//!
//! This crate lets Rust manipulate Python objects without static bindings:
//! the interpreter's shared library is loaded at process start (see
//! `pybridge_ffi`), and every object access goes through a reference-counted
//! handle and a closed set of dispatch operations.
//!
//! ## Key pieces
//!
//! - **[`Python`]**: the process-wide interface - one-time initialization,
//!   builtin lookups, module import, source-snippet execution.
//! - **[`PythonObject`]**: the type-erased handle to any Python object, with
//!   attribute/item/call dispatch, operators, comparison, iteration and
//!   hashing.
//! - **[`ToPython`] / [`FromPython`]**: bidirectional conversion for host
//!   primitives, sequences, maps, tuples and ranges.
//! - **[`PythonFunction`]**: host closures exposed as Python callables.
//!
//! ## Surfaces
//!
//! Every dispatch operation exists in a throwing form (`try_*`, returning
//! [`PythonError`]) and a non-throwing form that aborts on failure; checked
//! accessors (`attr_opt`, `item_opt`) return `None` instead. The three share
//! one implementation and differ only in how failure leaves the function.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use pybridge::{Python, ToPython, FromPython};
//!
//! let py = Python::shared();
//! let numbers = vec![1i64, 2, 3].to_python();
//! assert_eq!(numbers.len(), 3);
//!
//! let math = py.import("math");
//! let pi = f64::from_python(&math.attr("pi")).unwrap();
//! assert!(pi > 3.14);
//! ```
//!
//! ## Threading
//!
//! None. The interpreter's reference counts and error state are
//! process-global and non-atomic; the caller must keep all bridge use on a
//! single thread. Handles are deliberately `!Send`.

mod call;
mod class;
mod convert;
mod error;
mod function;
mod handle;
mod interface;
mod iterator;
mod value;

pub use class::{PythonClassBuilder, PythonInstanceMethod};
pub use convert::{FromPython, ToPython};
pub use error::{PythonError, PythonResult};
pub use function::{CallingConvention, HostImplementation, PythonFunction};
pub use handle::PyReference;
pub use interface::Python;
pub use iterator::PythonIterator;
pub use value::PythonObject;

// Re-export the loader's configuration surface and version types so callers
// rarely need pybridge_ffi directly.
pub use pybridge_ffi::{
    use_library_path, use_version, CompareOp, LoadError, PyVersion, PYTHON_LIBRARY_ENV,
    PYTHON_LOADER_LOGGING_ENV, PYTHON_VERSION_ENV,
};
