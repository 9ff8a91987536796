//! Typed entry point table over the Python C ABI.
//!
//! Every capability the bridge needs from the interpreter is a single
//! C-callable symbol, resolved once into [`EntryPoints`] and immutable
//! afterwards. The table is the only channel through which the rest of the
//! system touches the guest runtime; resolution either succeeds for every
//! entry or fails atomically (no partially populated table escapes).
//!
//! A handful of entries have two candidate symbol names: the modern
//! (Python 3) name and the legacy (Python 2) name. The loader's one-time
//! sentinel probe decides which generation is used for all of them.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_long, c_longlong, c_ulonglong, c_void};

use once_cell::sync::OnceCell;

use crate::loader::{self, LoadError, PyVersion, PythonLibrary};

/// Opaque guest object. Only ever handled behind a raw pointer.
#[repr(C)]
pub struct PyObject {
    _opaque: [u8; 0],
}

/// Raw pointer to a guest object.
pub type PyObjectPtr = *mut PyObject;

/// Native-function trampoline shape: `(self, args) -> result`.
pub type PyCFunctionPtr = unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr;

/// Keyword-aware trampoline shape: `(self, args, kwargs) -> result`.
pub type PyCFunctionWithKeywordsPtr =
    unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr) -> PyObjectPtr;

/// Capsule destructor, invoked by the guest when the capsule is collected.
pub type PyCapsuleDestructor = unsafe extern "C" fn(PyObjectPtr);

/// Method definition record consumed by `PyCFunction_NewEx`.
///
/// The guest keeps the pointer it is given; the record must stay pinned for
/// the lifetime of the produced native-function object.
#[repr(C)]
pub struct PyMethodDef {
    pub ml_name: *const c_char,
    pub ml_meth: Option<PyCFunctionPtr>,
    pub ml_flags: c_int,
    pub ml_doc: *const c_char,
}

/// `ml_flags` bit: the callable receives a positional tuple.
pub const METH_VARARGS: c_int = 0x0001;
/// `ml_flags` bit: the callable additionally receives a keyword dictionary.
pub const METH_KEYWORDS: c_int = 0x0002;

/// Rich-comparison opcodes accepted by the compare entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
}

macro_rules! entry {
    ($lib:expr, $modern:literal) => {
        unsafe { $lib.symbol($modern, None)? }
    };
    ($lib:expr, $modern:literal, legacy: $legacy:literal) => {
        unsafe { $lib.symbol($modern, Some($legacy))? }
    };
}

/// One resolved function pointer per required guest capability.
#[allow(non_snake_case)]
pub struct EntryPoints {
    // One-time initialization and interpreter metadata.
    pub Py_Initialize: unsafe extern "C" fn(),
    pub Py_IsInitialized: unsafe extern "C" fn() -> c_int,
    pub Py_GetVersion: unsafe extern "C" fn() -> *const c_char,

    // Object lifetime.
    pub Py_IncRef: unsafe extern "C" fn(PyObjectPtr),
    pub Py_DecRef: unsafe extern "C" fn(PyObjectPtr),

    // Source-string execution and module import.
    pub PyRun_SimpleString: unsafe extern "C" fn(*const c_char) -> c_int,
    pub PyImport_ImportModule: unsafe extern "C" fn(*const c_char) -> PyObjectPtr,

    // Attribute access.
    pub PyObject_GetAttrString: unsafe extern "C" fn(PyObjectPtr, *const c_char) -> PyObjectPtr,
    pub PyObject_SetAttrString:
        unsafe extern "C" fn(PyObjectPtr, *const c_char, PyObjectPtr) -> c_int,

    // Item access.
    pub PyObject_GetItem: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyObject_SetItem: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr) -> c_int,
    pub PyObject_DelItem: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> c_int,

    // Calling.
    pub PyObject_CallObject: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyObject_Call:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr) -> PyObjectPtr,

    // Rich comparison.
    pub PyObject_RichCompare:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, c_int) -> PyObjectPtr,
    pub PyObject_RichCompareBool:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, c_int) -> c_int,

    // Iteration.
    pub PyObject_GetIter: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,
    pub PyIter_Next: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,

    // Object protocol odds and ends.
    pub PyObject_Length: unsafe extern "C" fn(PyObjectPtr) -> isize,
    pub PyObject_IsTrue: unsafe extern "C" fn(PyObjectPtr) -> c_int,
    pub PyCallable_Check: unsafe extern "C" fn(PyObjectPtr) -> c_int,
    pub PyObject_Str: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,
    pub PyObject_Repr: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,

    // Numeric operators.
    pub PyNumber_Add: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Subtract: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Multiply: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_TrueDivide: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Remainder: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_And: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Or: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Xor: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_InPlaceAdd: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_InPlaceSubtract:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_InPlaceMultiply:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_InPlaceTrueDivide:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Negative: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,
    pub PyNumber_Invert: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,

    // Scalar coercion.
    pub PyBool_FromLong: unsafe extern "C" fn(c_long) -> PyObjectPtr,
    pub PyLong_FromLongLong: unsafe extern "C" fn(c_longlong) -> PyObjectPtr,
    pub PyLong_AsLongLong: unsafe extern "C" fn(PyObjectPtr) -> c_longlong,
    pub PyLong_FromUnsignedLongLong: unsafe extern "C" fn(c_ulonglong) -> PyObjectPtr,
    pub PyLong_AsUnsignedLongLong: unsafe extern "C" fn(PyObjectPtr) -> c_ulonglong,
    pub PyFloat_FromDouble: unsafe extern "C" fn(f64) -> PyObjectPtr,
    pub PyFloat_AsDouble: unsafe extern "C" fn(PyObjectPtr) -> f64,

    // String and byte-buffer coercion (legacy generation differs).
    pub PyUnicode_FromStringAndSize:
        unsafe extern "C" fn(*const c_char, isize) -> PyObjectPtr,
    pub PyUnicode_AsUTF8: unsafe extern "C" fn(PyObjectPtr) -> *const c_char,
    pub PyBytes_FromStringAndSize:
        unsafe extern "C" fn(*const c_char, isize) -> PyObjectPtr,
    pub PyBytes_AsStringAndSize:
        unsafe extern "C" fn(PyObjectPtr, *mut *mut c_char, *mut isize) -> c_int,

    // Container construction and dictionary iteration.
    pub PyTuple_New: unsafe extern "C" fn(isize) -> PyObjectPtr,
    pub PyTuple_Size: unsafe extern "C" fn(PyObjectPtr) -> isize,
    pub PyTuple_GetItem: unsafe extern "C" fn(PyObjectPtr, isize) -> PyObjectPtr,
    pub PyTuple_SetItem: unsafe extern "C" fn(PyObjectPtr, isize, PyObjectPtr) -> c_int,
    pub PyList_New: unsafe extern "C" fn(isize) -> PyObjectPtr,
    pub PyList_SetItem: unsafe extern "C" fn(PyObjectPtr, isize, PyObjectPtr) -> c_int,
    pub PyDict_New: unsafe extern "C" fn() -> PyObjectPtr,
    pub PyDict_SetItem: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr) -> c_int,
    pub PyDict_Next: unsafe extern "C" fn(
        PyObjectPtr,
        *mut isize,
        *mut PyObjectPtr,
        *mut PyObjectPtr,
    ) -> c_int,
    pub PySlice_New:
        unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr) -> PyObjectPtr,

    // Capsules and native-function objects.
    pub PyCapsule_New: unsafe extern "C" fn(
        *mut c_void,
        *const c_char,
        Option<PyCapsuleDestructor>,
    ) -> PyObjectPtr,
    pub PyCapsule_GetPointer:
        unsafe extern "C" fn(PyObjectPtr, *const c_char) -> *mut c_void,
    pub PyCapsule_SetDestructor:
        unsafe extern "C" fn(PyObjectPtr, Option<PyCapsuleDestructor>) -> c_int,
    pub PyCFunction_NewEx:
        unsafe extern "C" fn(*mut PyMethodDef, PyObjectPtr, PyObjectPtr) -> PyObjectPtr,
    /// Only ever called through the modern single-argument shape; the legacy
    /// symbol is resolved solely to keep the table total, behind a version
    /// gate that rejects legacy interpreters before any call.
    pub PyInstanceMethod_New: unsafe extern "C" fn(PyObjectPtr) -> PyObjectPtr,

    // Exception state.
    pub PyErr_Occurred: unsafe extern "C" fn() -> PyObjectPtr,
    pub PyErr_Fetch:
        unsafe extern "C" fn(*mut PyObjectPtr, *mut PyObjectPtr, *mut PyObjectPtr),
    pub PyErr_Clear: unsafe extern "C" fn(),
    pub PyErr_Restore: unsafe extern "C" fn(PyObjectPtr, PyObjectPtr, PyObjectPtr),
    pub PyErr_SetString: unsafe extern "C" fn(PyObjectPtr, *const c_char),

    // Exception type globals; only valid to dereference after one-time init.
    pub PyExc_RuntimeError: *mut PyObjectPtr,
}

// SAFETY: the table holds immutable function pointers and the address of an
// interpreter global. It is written once during resolution and never mutated;
// concurrent *guest* entry is the caller's obligation, not the table's.
unsafe impl Send for EntryPoints {}
unsafe impl Sync for EntryPoints {}

impl EntryPoints {
    /// Resolve every entry from the loaded library, atomically.
    pub fn resolve(library: &PythonLibrary) -> Result<EntryPoints, LoadError> {
        Ok(EntryPoints {
            Py_Initialize: entry!(library, "Py_Initialize"),
            Py_IsInitialized: entry!(library, "Py_IsInitialized"),
            Py_GetVersion: entry!(library, "Py_GetVersion"),

            Py_IncRef: entry!(library, "Py_IncRef"),
            Py_DecRef: entry!(library, "Py_DecRef"),

            PyRun_SimpleString: entry!(library, "PyRun_SimpleString"),
            PyImport_ImportModule: entry!(library, "PyImport_ImportModule"),

            PyObject_GetAttrString: entry!(library, "PyObject_GetAttrString"),
            PyObject_SetAttrString: entry!(library, "PyObject_SetAttrString"),

            PyObject_GetItem: entry!(library, "PyObject_GetItem"),
            PyObject_SetItem: entry!(library, "PyObject_SetItem"),
            PyObject_DelItem: entry!(library, "PyObject_DelItem"),

            PyObject_CallObject: entry!(library, "PyObject_CallObject"),
            PyObject_Call: entry!(library, "PyObject_Call"),

            PyObject_RichCompare: entry!(library, "PyObject_RichCompare"),
            PyObject_RichCompareBool: entry!(library, "PyObject_RichCompareBool"),

            PyObject_GetIter: entry!(library, "PyObject_GetIter"),
            PyIter_Next: entry!(library, "PyIter_Next"),

            PyObject_Length: entry!(library, "PyObject_Length"),
            PyObject_IsTrue: entry!(library, "PyObject_IsTrue"),
            PyCallable_Check: entry!(library, "PyCallable_Check"),
            PyObject_Str: entry!(library, "PyObject_Str"),
            PyObject_Repr: entry!(library, "PyObject_Repr"),

            PyNumber_Add: entry!(library, "PyNumber_Add"),
            PyNumber_Subtract: entry!(library, "PyNumber_Subtract"),
            PyNumber_Multiply: entry!(library, "PyNumber_Multiply"),
            PyNumber_TrueDivide: entry!(library, "PyNumber_TrueDivide", legacy: "PyNumber_Divide"),
            PyNumber_Remainder: entry!(library, "PyNumber_Remainder"),
            PyNumber_And: entry!(library, "PyNumber_And"),
            PyNumber_Or: entry!(library, "PyNumber_Or"),
            PyNumber_Xor: entry!(library, "PyNumber_Xor"),
            PyNumber_InPlaceAdd: entry!(library, "PyNumber_InPlaceAdd"),
            PyNumber_InPlaceSubtract: entry!(library, "PyNumber_InPlaceSubtract"),
            PyNumber_InPlaceMultiply: entry!(library, "PyNumber_InPlaceMultiply"),
            PyNumber_InPlaceTrueDivide: entry!(
                library,
                "PyNumber_InPlaceTrueDivide",
                legacy: "PyNumber_InPlaceDivide"
            ),
            PyNumber_Negative: entry!(library, "PyNumber_Negative"),
            PyNumber_Invert: entry!(library, "PyNumber_Invert"),

            PyBool_FromLong: entry!(library, "PyBool_FromLong"),
            PyLong_FromLongLong: entry!(library, "PyLong_FromLongLong"),
            PyLong_AsLongLong: entry!(library, "PyLong_AsLongLong"),
            PyLong_FromUnsignedLongLong: entry!(library, "PyLong_FromUnsignedLongLong"),
            PyLong_AsUnsignedLongLong: entry!(library, "PyLong_AsUnsignedLongLong"),
            PyFloat_FromDouble: entry!(library, "PyFloat_FromDouble"),
            PyFloat_AsDouble: entry!(library, "PyFloat_AsDouble"),

            PyUnicode_FromStringAndSize: entry!(
                library,
                "PyUnicode_FromStringAndSize",
                legacy: "PyString_FromStringAndSize"
            ),
            PyUnicode_AsUTF8: entry!(
                library,
                "PyUnicode_AsUTF8",
                legacy: "PyString_AsString"
            ),
            PyBytes_FromStringAndSize: entry!(
                library,
                "PyBytes_FromStringAndSize",
                legacy: "PyString_FromStringAndSize"
            ),
            PyBytes_AsStringAndSize: entry!(
                library,
                "PyBytes_AsStringAndSize",
                legacy: "PyString_AsStringAndSize"
            ),

            PyTuple_New: entry!(library, "PyTuple_New"),
            PyTuple_Size: entry!(library, "PyTuple_Size"),
            PyTuple_GetItem: entry!(library, "PyTuple_GetItem"),
            PyTuple_SetItem: entry!(library, "PyTuple_SetItem"),
            PyList_New: entry!(library, "PyList_New"),
            PyList_SetItem: entry!(library, "PyList_SetItem"),
            PyDict_New: entry!(library, "PyDict_New"),
            PyDict_SetItem: entry!(library, "PyDict_SetItem"),
            PyDict_Next: entry!(library, "PyDict_Next"),
            PySlice_New: entry!(library, "PySlice_New"),

            PyCapsule_New: entry!(library, "PyCapsule_New"),
            PyCapsule_GetPointer: entry!(library, "PyCapsule_GetPointer"),
            PyCapsule_SetDestructor: entry!(library, "PyCapsule_SetDestructor"),
            PyCFunction_NewEx: entry!(library, "PyCFunction_NewEx"),
            PyInstanceMethod_New: entry!(
                library,
                "PyInstanceMethod_New",
                legacy: "PyMethod_New"
            ),

            PyErr_Occurred: entry!(library, "PyErr_Occurred"),
            PyErr_Fetch: entry!(library, "PyErr_Fetch"),
            PyErr_Clear: entry!(library, "PyErr_Clear"),
            PyErr_Restore: entry!(library, "PyErr_Restore"),
            PyErr_SetString: entry!(library, "PyErr_SetString"),

            PyExc_RuntimeError: entry!(library, "PyExc_RuntimeError"),
        })
    }
}

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// The loaded guest runtime: library, entry point table, version metadata.
///
/// Resolved exactly once per process. The bridge performs no internal
/// synchronization; callers must ensure the interpreter is never entered
/// concurrently from multiple threads.
pub struct Runtime {
    library: &'static PythonLibrary,
    table: EntryPoints,
    version: PyVersion,
    version_text: String,
}

impl Runtime {
    /// Resolve the runtime, idempotently.
    ///
    /// Returns [`LoadError::LibraryNotFound`] when no interpreter library
    /// could be located (recoverable; the caller may configure a path and
    /// retry in a fresh process). Every other loader failure panics: a
    /// partially resolved entry point table must never be used.
    pub fn initialize() -> Result<&'static Runtime, LoadError> {
        RUNTIME.get_or_try_init(|| {
            let library = match PythonLibrary::shared() {
                Ok(library) => library,
                // The only recoverable loader failure; everything else means
                // a broken installation and a table that must not be used.
                Err(error @ LoadError::LibraryNotFound) => return Err(error),
                Err(error) => fatal_load(&error),
            };
            let table = EntryPoints::resolve(library).unwrap_or_else(|e| fatal_load(&e));

            let version_text = unsafe { CStr::from_ptr((table.Py_GetVersion)()) }
                .to_string_lossy()
                .into_owned();
            let version = parse_version_text(&version_text)
                .unwrap_or_else(|| panic!("unparseable Python version string: {version_text:?}"));

            if let Some(requested) = loader::requested_version() {
                if !requested.matches(version) {
                    fatal_load(&LoadError::VersionMismatch {
                        requested,
                        found: version,
                    });
                }
            }

            log::info!("resolved Python {version} entry points");
            Ok(Runtime {
                library,
                table,
                version,
                version_text,
            })
        })
    }

    /// The resolved runtime. Panics if [`Runtime::initialize`] has not run.
    pub fn get() -> &'static Runtime {
        RUNTIME
            .get()
            .expect("Python runtime used before initialization")
    }

    /// The entry point table.
    pub fn entry_points(&self) -> &EntryPoints {
        &self.table
    }

    /// Interpreter version as `major.minor`.
    pub fn version(&self) -> PyVersion {
        self.version
    }

    /// The interpreter's full version banner.
    pub fn version_text(&self) -> &str {
        &self.version_text
    }

    /// Whether the legacy symbol generation is in effect.
    pub fn is_legacy(&self) -> bool {
        self.library.is_legacy()
    }

    /// Path the interpreter library was loaded from, `None` for the process
    /// image.
    pub fn library_path(&self) -> Option<&std::path::Path> {
        self.library.path()
    }

    /// Read the guest reference count of an object.
    ///
    /// Inspection hook for refcount-balance tests; the count is the first
    /// word of the guest object header.
    ///
    /// # Safety
    /// `object` must point to a live guest object.
    pub unsafe fn reference_count(&self, object: PyObjectPtr) -> isize {
        *(object as *const isize)
    }
}

fn fatal_load(error: &LoadError) -> ! {
    log::error!("{error}");
    panic!("{error}");
}

/// Parse `major.minor` out of the interpreter's version banner
/// (`"3.11.4 (main, ...)"`).
fn parse_version_text(text: &str) -> Option<PyVersion> {
    let mut parts = text.split(|c: char| c == '.' || c.is_whitespace());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some(PyVersion::new(major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_text() {
        assert_eq!(
            parse_version_text("3.11.4 (main, Jun  7 2023, 00:00:00)"),
            Some(PyVersion::new(3, 11))
        );
        assert_eq!(parse_version_text("2.7.18"), Some(PyVersion::new(2, 7)));
        assert_eq!(parse_version_text("not a version"), None);
    }

    #[test]
    fn test_compare_op_values() {
        // Opcode values are part of the guest ABI.
        assert_eq!(CompareOp::Lt as i32, 0);
        assert_eq!(CompareOp::Eq as i32, 2);
        assert_eq!(CompareOp::Ge as i32, 5);
    }

    #[test]
    fn test_method_flags_are_distinct_bits() {
        assert_eq!(METH_VARARGS & METH_KEYWORDS, 0);
    }
}
