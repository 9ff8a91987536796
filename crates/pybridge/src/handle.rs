//! Reference-counted handle over a single Python object pointer.
//!
//! The guest runtime's memory management is pure reference counting; the
//! bridge's central correctness property is that every increment is matched
//! by exactly one decrement. `PyReference` enforces that at the type level:
//! it owns exactly one counted reference for its whole lifetime, taken either
//! by incrementing on construction (`retaining`) or by adopting a `+1`
//! reference a guest entry point handed back (`adopting`), and released by a
//! single decrement on drop.
//!
//! The guest's counts are non-atomic; `PyReference` holds a raw pointer and
//! is therefore neither `Send` nor `Sync`, which keeps handles on the single
//! bridging thread.

use std::ptr::NonNull;

use pybridge_ffi::{PyObject, PyObjectPtr, Runtime};

/// Exclusive ownership of one counted reference to a Python object.
pub struct PyReference {
    pointer: NonNull<PyObject>,
}

impl PyReference {
    /// Take ownership by incrementing the guest reference count.
    ///
    /// Use when the pointer was *borrowed* from the runtime (the callee did
    /// not transfer a reference).
    ///
    /// # Safety
    /// `pointer` must be a live Python object.
    pub unsafe fn retaining(pointer: PyObjectPtr) -> PyReference {
        let pointer = NonNull::new(pointer).expect("retained a null Python object pointer");
        (Runtime::get().entry_points().Py_IncRef)(pointer.as_ptr());
        PyReference { pointer }
    }

    /// Take ownership of a pre-existing `+1` reference without incrementing.
    ///
    /// Use when a guest entry point handed back a fresh owned reference.
    ///
    /// # Safety
    /// `pointer` must be a live Python object carrying one reference the
    /// caller is entitled to consume.
    pub unsafe fn adopting(pointer: PyObjectPtr) -> PyReference {
        let pointer = NonNull::new(pointer).expect("adopted a null Python object pointer");
        PyReference { pointer }
    }

    /// The raw pointer, with no reference count change.
    ///
    /// The view must not outlive this handle.
    pub fn borrowed(&self) -> PyObjectPtr {
        self.pointer.as_ptr()
    }

    /// Increment the guest reference count and return the raw pointer.
    ///
    /// Use when handing the pointer to a guest entry point that consumes one
    /// reference (tuple/list item stores, exception restore).
    pub fn owned(&self) -> PyObjectPtr {
        unsafe { (Runtime::get().entry_points().Py_IncRef)(self.pointer.as_ptr()) };
        self.pointer.as_ptr()
    }
}

impl Drop for PyReference {
    fn drop(&mut self) {
        unsafe { (Runtime::get().entry_points().Py_DecRef)(self.pointer.as_ptr()) };
    }
}

impl std::fmt::Debug for PyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PyReference({:p})", self.pointer.as_ptr())
    }
}
