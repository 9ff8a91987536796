//! Dynamic class construction and instance-method wrapping.
//!
//! A host closure exposed through `PythonFunction` is a plain native
//! function: stored in a class namespace it would not bind `self` on
//! attribute access. [`PythonInstanceMethod`] wraps it in the guest's
//! instance-method descriptor so instances receive themselves as the first
//! positional argument, and [`PythonClassBuilder`] assembles a new class
//! through the guest's own `type(name, bases, namespace)` protocol.

use pybridge_ffi::Runtime;

use crate::convert::ToPython;
use crate::error::PythonResult;
use crate::function::{HostImplementation, PythonFunction};
use crate::interface::Python;
use crate::value::PythonObject;

/// A callable wrapped in the guest's instance-method descriptor.
pub struct PythonInstanceMethod {
    object: PythonObject,
}

impl PythonInstanceMethod {
    /// Wrap a host function so class attribute access binds the instance.
    pub fn new(function: PythonFunction) -> PythonInstanceMethod {
        Self::from_callable(function.into_object())
    }

    /// Wrap an arbitrary guest callable.
    pub fn from_callable(callable: PythonObject) -> PythonInstanceMethod {
        let runtime = Python::shared().runtime();
        ensure_instance_method_support(runtime);
        let table = runtime.entry_points();
        // The descriptor takes its own reference; ours stays balanced.
        let method = unsafe { (table.PyInstanceMethod_New)(callable.borrowed_ptr()) };
        assert!(!method.is_null(), "failed to create a Python instance method");
        PythonInstanceMethod {
            object: unsafe { PythonObject::from_owned_ptr(method) },
        }
    }

    /// The guest descriptor object.
    pub fn object(&self) -> &PythonObject {
        &self.object
    }
}

impl ToPython for PythonInstanceMethod {
    fn to_python(&self) -> PythonObject {
        self.object.clone()
    }
}

/// The instance-method descriptor only exists in the modern runtime
/// generation.
fn ensure_instance_method_support(runtime: &Runtime) {
    let version = runtime.version();
    assert!(
        version.major >= 3,
        "Python instance methods require Python 3; found Python {version}"
    );
}

/// Builder for a new guest class.
///
/// Members land in the class namespace as-is; `method` wraps a host closure
/// as a bound instance method receiving the instance as its first argument.
///
/// ```rust,ignore
/// let class = PythonClassBuilder::new("Box")
///     .method("__init__", |args| {
///         args[0].set_attr("value", args[1].clone());
///         Ok(Python::shared().none().clone())
///     })
///     .method("doubled", |args| args[0].attr("value").try_add(&args[0].attr("value")))
///     .build();
/// let instance = class.call(&[21i64.to_python()]);
/// ```
pub struct PythonClassBuilder {
    name: String,
    bases: Vec<PythonObject>,
    members: Vec<(String, PythonObject)>,
}

impl PythonClassBuilder {
    /// Start a class with the given guest-visible name.
    pub fn new(name: impl Into<String>) -> PythonClassBuilder {
        PythonClassBuilder {
            name: name.into(),
            bases: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Add a base class.
    pub fn base(mut self, base: PythonObject) -> PythonClassBuilder {
        self.bases.push(base);
        self
    }

    /// Add a namespace member under the given name.
    ///
    /// Duplicate member names are a programming error, matching the
    /// duplicate-keyword policy of the call adapter.
    pub fn member(mut self, name: impl Into<String>, value: impl ToPython) -> PythonClassBuilder {
        let name = name.into();
        assert!(
            self.members.iter().all(|(existing, _)| *existing != name),
            "duplicate class member '{name}'"
        );
        self.members.push((name, value.to_python()));
        self
    }

    /// Add a host closure as an instance method.
    ///
    /// The closure receives the instance as its first positional argument.
    pub fn method<F>(self, name: &str, method: F) -> PythonClassBuilder
    where
        F: Fn(&[PythonObject]) -> PythonResult<PythonObject> + 'static,
    {
        let function =
            PythonFunction::named(name, "", HostImplementation::Arguments(Box::new(method)));
        let bound = PythonInstanceMethod::new(function);
        self.member(name, bound)
    }

    /// Create the class through the guest's `type(name, bases, namespace)`.
    pub fn build(self) -> PythonObject {
        let python = Python::shared();

        let bases = PythonObject::from_reference(crate::call::build_positional_tuple(&self.bases));

        let namespace = python.get("dict").call(&[]);
        for (name, value) in &self.members {
            namespace.set_item(name.as_str(), value.clone());
        }

        python
            .get("type")
            .call(&[self.name.as_str().to_python(), bases, namespace])
    }
}
