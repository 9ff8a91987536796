//! Shared setup for interpreter-dependent test suites.
//!
//! The bridge is single-threaded by contract, so every test takes the guest
//! lock for its whole body. Suites skip (with a note) when no Python shared
//! library can be located, keeping `cargo test` green on minimal images.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use pybridge::{Python, PythonObject, ToPython};

static GUEST_LOCK: Mutex<()> = Mutex::new(());

pub struct Guest {
    pub python: &'static Python,
    _guard: MutexGuard<'static, ()>,
}

/// Lock the guest and resolve the interpreter, or `None` to skip the test.
pub fn acquire() -> Option<Guest> {
    let _ = env_logger::builder().is_test(true).try_init();
    let guard = GUEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match Python::try_shared() {
        Ok(python) => Some(Guest {
            python,
            _guard: guard,
        }),
        Err(error) => {
            eprintln!("skipping: Python runtime unavailable ({error})");
            None
        }
    }
}

impl Guest {
    /// Evaluate an expression with the `eval` builtin.
    pub fn eval(&self, expression: &str) -> PythonObject {
        // The `eval` builtin, when called through the C-API without an
        // explicit globals mapping, tries to borrow the calling Python
        // frame's globals - which does not exist under the embedded bridge
        // ("frame does not exist"). Supply an empty globals dict; CPython
        // injects `__builtins__` into it automatically.
        let globals: HashMap<String, PythonObject> = HashMap::new();
        self.python
            .get("eval")
            .call(&[expression.to_python(), globals.to_python()])
    }
}
