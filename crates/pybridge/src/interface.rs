//! The process-wide Python interface.
//!
//! [`Python`] is the lazily-constructed, idempotent context object behind
//! every bridge operation. Construction resolves the entry point table,
//! performs the interpreter's one-time initialization, captures the builtins
//! module, and runs a small environment fixup so the embedded interpreter's
//! view of its own invocation (`sys.argv`, `sys.executable`) is sane when
//! the host process was not started as a Python program.

use std::ffi::CString;
use std::path::Path;

use once_cell::sync::OnceCell;

use pybridge_ffi::{LoadError, PyVersion, Runtime};

use crate::call;
use crate::convert::{FromPython, ToPython};
use crate::error::{fatal_error, PythonError, PythonResult};
use crate::value::PythonObject;

static SHARED: OnceCell<Python> = OnceCell::new();

/// Interpreter-environment corrections applied once at startup.
const STARTUP_FIXUP: &str = "\
import sys
if not hasattr(sys, 'argv') or not sys.argv:
    sys.argv = ['']
if getattr(sys, 'executable', None) is None:
    sys.executable = ''
";

/// The global Python runtime interface.
///
/// The bridge performs no internal synchronization: the interpreter's
/// reference counts and error state are process-global and non-atomic, so
/// the caller must ensure Python is never entered concurrently from
/// multiple host threads.
pub struct Python {
    runtime: &'static Runtime,
    builtins: PythonObject,
    none: PythonObject,
}

// SAFETY: required so the singleton can live in a process-wide cell. All
// guest state behind it is single-threaded by the documented caller
// obligation above.
unsafe impl Send for Python {}
unsafe impl Sync for Python {}

impl Python {
    /// The shared interface, constructing it on first use.
    ///
    /// Fails only when no interpreter library could be located; the error
    /// names the environment variable that supplies an explicit path.
    pub fn try_shared() -> Result<&'static Python, LoadError> {
        SHARED.get_or_try_init(Python::construct)
    }

    /// The shared interface; fatal when the interpreter cannot be loaded.
    pub fn shared() -> &'static Python {
        Python::try_shared().unwrap_or_else(|error| {
            log::error!("{error}");
            panic!("{error}");
        })
    }

    fn construct() -> Result<Python, LoadError> {
        let runtime = Runtime::initialize()?;
        let table = runtime.entry_points();

        unsafe {
            if (table.Py_IsInitialized)() == 0 {
                (table.Py_Initialize)();
            }
        }

        let fixup = CString::new(STARTUP_FIXUP).expect("fixup snippet is nul-free");
        let status = unsafe { (table.PyRun_SimpleString)(fixup.as_ptr()) };
        if status != 0 {
            call::clear_error();
            log::warn!("interpreter environment fixup failed");
        }

        let builtins = import_builtins(runtime);
        let none = builtins.attr("None");
        log::debug!("Python interface ready ({})", runtime.version());

        Ok(Python {
            runtime,
            builtins,
            none,
        })
    }

    /// The resolved runtime backing this interface.
    pub fn runtime(&self) -> &'static Runtime {
        self.runtime
    }

    /// The captured builtins module.
    pub fn builtins(&self) -> &PythonObject {
        &self.builtins
    }

    /// The `None` singleton.
    pub fn none(&self) -> &PythonObject {
        &self.none
    }

    /// A builtin by name; fatal when missing.
    pub fn get(&self, name: &str) -> PythonObject {
        self.builtins.attr(name)
    }

    /// A builtin by name; `None` when missing.
    pub fn get_opt(&self, name: &str) -> Option<PythonObject> {
        self.builtins.attr_opt(name)
    }

    /// Import a module; fatal on failure.
    pub fn import(&self, name: &str) -> PythonObject {
        self.attempt_import(name)
            .unwrap_or_else(|e| fatal_error(&format!("import of '{name}'"), &e))
    }

    /// Import a module.
    ///
    /// A missing module is reported as [`PythonError::InvalidModule`]
    /// carrying the name; a module that exists but raises during
    /// initialization is reflected as the guest exception itself.
    pub fn attempt_import(&self, name: &str) -> PythonResult<PythonObject> {
        let cname = CString::new(name).expect("module name contains an interior nul byte");
        let table = self.runtime.entry_points();
        let module = unsafe { (table.PyImport_ImportModule)(cname.as_ptr()) };
        if module.is_null() {
            return Err(match call::fetch_error() {
                Some(error) if is_missing_module(&error) => PythonError::InvalidModule {
                    name: name.to_string(),
                },
                Some(error) => error,
                None => PythonError::InvalidModule {
                    name: name.to_string(),
                },
            });
        }
        Ok(unsafe { PythonObject::from_owned_ptr(module) })
    }

    /// Run a source snippet through the interpreter's run-string entry
    /// point. No host-side parsing: the snippet goes to the guest verbatim.
    ///
    /// The entry point writes tracebacks to stderr and consumes the error
    /// state itself, so a failure with nothing left pending is reported as a
    /// synthesized RuntimeError.
    pub fn run(&self, code: &str) -> PythonResult<()> {
        let code = CString::new(code).expect("code snippet contains an interior nul byte");
        let table = self.runtime.entry_points();
        let status = unsafe { (table.PyRun_SimpleString)(code.as_ptr()) };
        if status == 0 {
            return Ok(());
        }
        if let Some(error) = call::fetch_error() {
            return Err(error);
        }
        let value = self
            .get("RuntimeError")
            .call(&["Python code raised; traceback written to stderr".to_python()]);
        Err(PythonError::Exception {
            value,
            traceback: None,
        })
    }

    /// The interpreter's full version banner.
    pub fn version(&self) -> &str {
        self.runtime.version_text()
    }

    /// The interpreter version as `major.minor`.
    pub fn version_info(&self) -> PyVersion {
        self.runtime.version()
    }

    /// Whether the legacy symbol generation is in effect.
    pub fn is_legacy(&self) -> bool {
        self.runtime.is_legacy()
    }

    /// Path the interpreter library was loaded from, `None` for the process
    /// image.
    pub fn library_path(&self) -> Option<&Path> {
        self.runtime.library_path()
    }

    /// The names in an object's namespace, via the `dir` builtin.
    pub fn dir(&self, object: &PythonObject) -> Vec<String> {
        let names = self.get("dir").call(&[object.clone()]);
        Vec::<String>::from_python(&names).unwrap_or_default()
    }
}

/// Import the builtins module, trying the generation-appropriate name first.
fn import_builtins(runtime: &Runtime) -> PythonObject {
    let table = runtime.entry_points();
    let names: [&str; 2] = if runtime.is_legacy() {
        ["__builtin__", "builtins"]
    } else {
        ["builtins", "__builtin__"]
    };
    for name in names {
        let cname = CString::new(name).expect("builtins module name is nul-free");
        let module = unsafe { (table.PyImport_ImportModule)(cname.as_ptr()) };
        if !module.is_null() {
            return unsafe { PythonObject::from_owned_ptr(module) };
        }
        call::clear_error();
    }
    panic!("unable to import the Python builtins module");
}

fn is_missing_module(error: &PythonError) -> bool {
    error
        .exception_value()
        .and_then(|value| value.class_name())
        .is_some_and(|name| name == "ModuleNotFoundError" || name == "ImportError")
}
