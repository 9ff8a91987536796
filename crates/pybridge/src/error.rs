//! Error types for Python bridge operations.
//!
//! Three reflected error kinds exist: an active guest exception, an invalid
//! call with no guest exception pending, and a failed module import.
//! Conversion failures are deliberately *not* errors; the conversion
//! protocols return `None` instead (see `convert`). Precondition violations
//! (wrong calling convention, reconfiguring the loader after first use) abort
//! rather than propagate, since continuing would operate on an inconsistent
//! guest/host boundary.

use thiserror::Error;

use crate::value::PythonObject;

/// Result type for throwing bridge operations.
pub type PythonResult<T> = Result<T, PythonError>;

/// Errors reflected from the Python runtime.
#[derive(Debug, Clone, Error)]
pub enum PythonError {
    /// An exception raised by Python code, never silently dropped.
    #[error("Python exception: {value}")]
    Exception {
        /// The exception object itself.
        value: PythonObject,
        /// The traceback, when the runtime provided one.
        traceback: Option<PythonObject>,
    },

    /// A call failed with no Python exception active: the receiver is not
    /// callable or the arguments did not match.
    #[error("invalid Python call on {receiver}")]
    InvalidCall { receiver: PythonObject },

    /// An import target was not found.
    #[error("Python module '{name}' not found")]
    InvalidModule { name: String },
}

impl PythonError {
    /// The exception object, when this error carries one.
    pub fn exception_value(&self) -> Option<&PythonObject> {
        match self {
            PythonError::Exception { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Abort with a descriptive message identifying the failed operation.
///
/// The non-throwing surface funnels every error through here; it shares the
/// throwing surface's logic and differs only in this final step.
pub(crate) fn fatal_error(context: &str, error: &PythonError) -> ! {
    log::error!("fatal Python error during {context}: {error}");
    panic!("fatal Python error during {context}: {error}");
}
