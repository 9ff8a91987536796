//! Host closures exposed as Python callables.
//!
//! A host closure is paired with a calling-convention tag and a pinned
//! method definition in a heap record, smuggled through a guest capsule, and
//! bound to a fixed dispatch trampoline as a native-function object. The
//! capsule carries a registered destructor, so the record is reclaimed when
//! the guest's own reference count on the capsule reaches zero; no host-side
//! bookkeeping outlives the guest object.
//!
//! The trampoline contract follows the guest's native calling convention
//! exactly: a null return always has an exception set first. Host failures
//! that carry a guest exception are re-raised as that exact exception; any
//! other failure (including a closure panic) is wrapped in the guest's
//! RuntimeError with a descriptive message.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use pybridge_ffi::{
    PyCFunctionPtr, PyCFunctionWithKeywordsPtr, PyMethodDef, PyObjectPtr, Runtime,
    METH_KEYWORDS, METH_VARARGS,
};

use crate::call;
use crate::convert::ToPython;
use crate::error::{PythonError, PythonResult};
use crate::handle::PyReference;
use crate::interface::Python;
use crate::value::PythonObject;

const CAPSULE_NAME: &[u8] = b"pybridge.function\0";

fn capsule_name() -> *const c_char {
    CAPSULE_NAME.as_ptr() as *const c_char
}

/// How a host closure receives its arguments. Exactly one tag is recorded
/// per capsule at construction and checked on every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// The full positional-argument tuple, as one object.
    Tuple,
    /// The positional arguments, pre-split into a host slice.
    Arguments,
    /// Pre-split positionals plus an ordered keyword-argument list.
    ArgumentsKeywords,
}

impl CallingConvention {
    fn uses_keywords(self) -> bool {
        matches!(self, CallingConvention::ArgumentsKeywords)
    }
}

type TupleFn = dyn Fn(PythonObject) -> PythonResult<PythonObject>;
type ArgumentsFn = dyn Fn(&[PythonObject]) -> PythonResult<PythonObject>;
type KeywordsFn = dyn Fn(&[PythonObject], &[(String, PythonObject)]) -> PythonResult<PythonObject>;

/// A host closure in one of the supported shapes.
pub enum HostImplementation {
    Tuple(Box<TupleFn>),
    Arguments(Box<ArgumentsFn>),
    ArgumentsKeywords(Box<KeywordsFn>),
}

impl HostImplementation {
    fn convention(&self) -> CallingConvention {
        match self {
            HostImplementation::Tuple(_) => CallingConvention::Tuple,
            HostImplementation::Arguments(_) => CallingConvention::Arguments,
            HostImplementation::ArgumentsKeywords(_) => CallingConvention::ArgumentsKeywords,
        }
    }
}

/// Heap record paired with each guest callable.
///
/// `method_def` points into `name`/`doc`; the record is pinned behind a raw
/// pointer from construction until the capsule destructor reclaims it.
struct FunctionRecord {
    implementation: HostImplementation,
    method_def: PyMethodDef,
    name: CString,
    doc: CString,
}

/// A host closure wrapped as a Python callable.
///
/// Dropping the `PythonFunction` only drops a reference; the guest reclaims
/// the closure record through the capsule destructor once nothing references
/// the callable anymore. [`PythonFunction::release`] exists as an explicit
/// eager-release escape hatch.
pub struct PythonFunction {
    object: PythonObject,
}

impl PythonFunction {
    /// Wrap a closure receiving the full positional tuple as one object.
    pub fn new<F>(function: F) -> PythonFunction
    where
        F: Fn(PythonObject) -> PythonResult<PythonObject> + 'static,
    {
        Self::named(
            "pybridge_function",
            "",
            HostImplementation::Tuple(Box::new(function)),
        )
    }

    /// Wrap a closure receiving the positional arguments pre-split.
    pub fn from_arguments<F>(function: F) -> PythonFunction
    where
        F: Fn(&[PythonObject]) -> PythonResult<PythonObject> + 'static,
    {
        Self::named(
            "pybridge_function",
            "",
            HostImplementation::Arguments(Box::new(function)),
        )
    }

    /// Wrap a closure receiving positionals plus ordered keywords.
    pub fn with_keywords<F>(function: F) -> PythonFunction
    where
        F: Fn(&[PythonObject], &[(String, PythonObject)]) -> PythonResult<PythonObject> + 'static,
    {
        Self::named(
            "pybridge_function",
            "",
            HostImplementation::ArgumentsKeywords(Box::new(function)),
        )
    }

    /// Wrap a closure under an explicit guest-visible name and docstring.
    pub fn named(name: &str, doc: &str, implementation: HostImplementation) -> PythonFunction {
        let python = Python::shared();
        ensure_capsule_support(python.runtime());
        let table = python.runtime().entry_points();

        let convention = implementation.convention();
        let (meth, flags): (PyCFunctionPtr, c_int) = if convention.uses_keywords() {
            // The keyword trampoline shape is stored through the two-argument
            // slot, as the guest convention requires for METH_KEYWORDS.
            let keywords = trampoline_keywords as PyCFunctionWithKeywordsPtr;
            (
                unsafe { std::mem::transmute::<PyCFunctionWithKeywordsPtr, PyCFunctionPtr>(keywords) },
                METH_VARARGS | METH_KEYWORDS,
            )
        } else {
            (trampoline_positional as PyCFunctionPtr, METH_VARARGS)
        };

        let mut record = Box::new(FunctionRecord {
            implementation,
            method_def: PyMethodDef {
                ml_name: ptr::null(),
                ml_meth: Some(meth),
                ml_flags: flags,
                ml_doc: ptr::null(),
            },
            name: CString::new(name).expect("function name contains an interior nul byte"),
            doc: CString::new(doc).expect("docstring contains an interior nul byte"),
        });
        record.method_def.ml_name = record.name.as_ptr();
        record.method_def.ml_doc = record.doc.as_ptr();
        let record = Box::into_raw(record);

        let capsule = unsafe {
            (table.PyCapsule_New)(record as *mut c_void, capsule_name(), Some(capsule_destructor))
        };
        if capsule.is_null() {
            drop(unsafe { Box::from_raw(record) });
            panic!("failed to create a Python capsule for a host function");
        }
        let capsule = unsafe { PyReference::adopting(capsule) };

        let method_def = unsafe { &mut (*record).method_def as *mut PyMethodDef };
        let function =
            unsafe { (table.PyCFunction_NewEx)(method_def, capsule.borrowed(), ptr::null_mut()) };
        assert!(
            !function.is_null(),
            "failed to create a Python function object for '{name}'"
        );
        // The function object took its own reference to the capsule; ours
        // drops here, leaving the guest as the record's sole owner.
        drop(capsule);

        PythonFunction {
            object: unsafe { PythonObject::from_owned_ptr(function) },
        }
    }

    /// The guest callable.
    pub fn object(&self) -> &PythonObject {
        &self.object
    }

    /// Consume the wrapper, keeping the guest callable.
    pub fn into_object(self) -> PythonObject {
        self.object
    }

    /// Eagerly reclaim the closure record.
    ///
    /// Opt-in escape hatch for callers creating many short-lived callables.
    /// The caller asserts that guest code holds no further references to the
    /// callable; invoking it after `release` is a programming error.
    pub fn release(self) {
        let table = Runtime::get().entry_points();
        let Some(capsule) = self.object.attr_opt("__self__") else {
            return;
        };
        let record =
            unsafe { (table.PyCapsule_GetPointer)(capsule.borrowed_ptr(), capsule_name()) };
        if record.is_null() {
            call::clear_error();
            return;
        }
        let status = unsafe { (table.PyCapsule_SetDestructor)(capsule.borrowed_ptr(), None) };
        if status == 0 {
            drop(unsafe { Box::from_raw(record as *mut FunctionRecord) });
        } else {
            call::clear_error();
        }
    }
}

impl ToPython for PythonFunction {
    fn to_python(&self) -> PythonObject {
        self.object.clone()
    }
}

/// Capsules require Python 2.7 or 3.1; older interpreters are rejected
/// before any record is built.
fn ensure_capsule_support(runtime: &Runtime) {
    let version = runtime.version();
    let supported = match version.major {
        2 => version.minor >= 7,
        3 => version.minor >= 1,
        major => major > 3,
    };
    assert!(
        supported,
        "Python functions require Python 2.7 or 3.1+; found Python {version}"
    );
}

unsafe extern "C" fn capsule_destructor(capsule: PyObjectPtr) {
    let table = Runtime::get().entry_points();
    let record = (table.PyCapsule_GetPointer)(capsule, capsule_name());
    if record.is_null() {
        (table.PyErr_Clear)();
        return;
    }
    drop(Box::from_raw(record as *mut FunctionRecord));
}

unsafe extern "C" fn trampoline_positional(capsule: PyObjectPtr, args: PyObjectPtr) -> PyObjectPtr {
    dispatch(capsule, args, ptr::null_mut(), false)
}

unsafe extern "C" fn trampoline_keywords(
    capsule: PyObjectPtr,
    args: PyObjectPtr,
    kwargs: PyObjectPtr,
) -> PyObjectPtr {
    dispatch(capsule, args, kwargs, true)
}

unsafe fn dispatch(
    capsule: PyObjectPtr,
    args: PyObjectPtr,
    kwargs: PyObjectPtr,
    via_keywords: bool,
) -> PyObjectPtr {
    let table = Runtime::get().entry_points();
    let record = (table.PyCapsule_GetPointer)(capsule, capsule_name()) as *const FunctionRecord;
    if record.is_null() {
        (table.PyErr_Clear)();
        set_runtime_error("host function capsule is missing or already released");
        return ptr::null_mut();
    }
    let record = &*record;

    // Wrong-convention invocation is a programming error; the panic crosses
    // the C boundary and aborts rather than being reported to guest code.
    assert_eq!(
        record.implementation.convention().uses_keywords(),
        via_keywords,
        "Python function invoked through the wrong calling convention"
    );

    let args = PythonObject::from_borrowed_ptr(args);
    let outcome = catch_unwind(AssertUnwindSafe(|| invoke(record, &args, kwargs)));
    match outcome {
        Ok(Ok(result)) => result.owned_ptr(),
        Ok(Err(error)) => {
            set_guest_exception(&error);
            ptr::null_mut()
        }
        Err(payload) => {
            set_runtime_error(&format!("host function panicked: {}", panic_text(&payload)));
            ptr::null_mut()
        }
    }
}

unsafe fn invoke(
    record: &FunctionRecord,
    args: &PythonObject,
    kwargs: PyObjectPtr,
) -> PythonResult<PythonObject> {
    match &record.implementation {
        HostImplementation::Tuple(function) => function(args.clone()),
        HostImplementation::Arguments(function) => function(&split_tuple(args)),
        HostImplementation::ArgumentsKeywords(function) => {
            function(&split_tuple(args), &collect_keywords(kwargs))
        }
    }
}

/// Split the guest argument tuple into host values.
fn split_tuple(args: &PythonObject) -> Vec<PythonObject> {
    let table = Runtime::get().entry_points();
    let size = unsafe { (table.PyTuple_Size)(args.borrowed_ptr()) };
    let mut elements = Vec::with_capacity(size.max(0) as usize);
    for index in 0..size {
        let element = unsafe { (table.PyTuple_GetItem)(args.borrowed_ptr(), index) };
        assert!(!element.is_null(), "argument tuple changed size mid-call");
        elements.push(unsafe { PythonObject::from_borrowed_ptr(element) });
    }
    elements
}

/// Collect the keyword dictionary into an ordered host list.
unsafe fn collect_keywords(kwargs: PyObjectPtr) -> Vec<(String, PythonObject)> {
    if kwargs.is_null() {
        return Vec::new();
    }
    let table = Runtime::get().entry_points();
    let mut pairs = Vec::new();
    let mut position: isize = 0;
    let mut key: PyObjectPtr = ptr::null_mut();
    let mut value: PyObjectPtr = ptr::null_mut();
    while (table.PyDict_Next)(kwargs, &mut position, &mut key, &mut value) != 0 {
        let key = PythonObject::from_borrowed_ptr(key);
        let value = PythonObject::from_borrowed_ptr(value);
        let name = PythonObject::text_of(&key).unwrap_or_default();
        pairs.push((name, value));
    }
    pairs
}

/// Reflect a host error into the guest exception state.
///
/// A carried guest exception is re-raised exactly (class, value, traceback);
/// anything else becomes a RuntimeError with the error's rendering.
fn set_guest_exception(error: &PythonError) {
    let table = Runtime::get().entry_points();
    match error {
        PythonError::Exception { value, traceback } => match value.attr_opt("__class__") {
            Some(class) => {
                let traceback = traceback
                    .as_ref()
                    .map_or(ptr::null_mut(), |t| t.owned_ptr());
                // Restore consumes one reference per argument.
                unsafe { (table.PyErr_Restore)(class.owned_ptr(), value.owned_ptr(), traceback) };
            }
            None => set_runtime_error(&error.to_string()),
        },
        other => set_runtime_error(&other.to_string()),
    }
}

fn set_runtime_error(message: &str) {
    let table = Runtime::get().entry_points();
    let message = CString::new(message.replace('\0', " "))
        .unwrap_or_else(|_| CString::new("Python bridge error").unwrap());
    unsafe { (table.PyErr_SetString)(*table.PyExc_RuntimeError, message.as_ptr()) };
}

fn panic_text(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
