//! Call adapter: argument marshalling and guest error reflection.
//!
//! Every layer that calls into the runtime funnels its failure handling
//! through this module so the throwing and non-throwing surfaces cannot
//! drift apart. The triage order is load-bearing: a pending guest exception
//! is checked strictly before falling back to the generic invalid-call
//! error, so a stale exception is never attributed to the wrong operation.

use std::ptr;

use pybridge_ffi::{PyObjectPtr, Runtime};

use crate::error::{PythonError, PythonResult};
use crate::handle::PyReference;
use crate::value::PythonObject;

/// Whether a guest exception is pending.
pub(crate) fn error_pending() -> bool {
    let table = Runtime::get().entry_points();
    !unsafe { (table.PyErr_Occurred)() }.is_null()
}

/// Clear any pending guest exception.
pub(crate) fn clear_error() {
    let table = Runtime::get().entry_points();
    unsafe { (table.PyErr_Clear)() };
}

/// Fetch-and-clear the pending guest exception, if any.
///
/// The runtime hands back owned references for the exception type, value and
/// traceback; the value (or the type, when no value was materialized) becomes
/// the carried exception object.
pub(crate) fn fetch_error() -> Option<PythonError> {
    let table = Runtime::get().entry_points();
    if unsafe { (table.PyErr_Occurred)() }.is_null() {
        return None;
    }

    let mut kind: PyObjectPtr = ptr::null_mut();
    let mut value: PyObjectPtr = ptr::null_mut();
    let mut traceback: PyObjectPtr = ptr::null_mut();
    unsafe { (table.PyErr_Fetch)(&mut kind, &mut value, &mut traceback) };

    let kind = (!kind.is_null()).then(|| unsafe { PythonObject::from_owned_ptr(kind) });
    let value = (!value.is_null()).then(|| unsafe { PythonObject::from_owned_ptr(value) });
    let traceback =
        (!traceback.is_null()).then(|| unsafe { PythonObject::from_owned_ptr(traceback) });

    let value = value.or(kind)?;
    Some(PythonError::Exception { value, traceback })
}

/// Reflect a failed guest call: pending exception first, invalid call second.
pub(crate) fn reflect_call_failure(receiver: &PythonObject) -> PythonError {
    fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
        receiver: receiver.clone(),
    })
}

/// Build a guest tuple holding owned references to every argument.
///
/// The tuple's item store consumes one reference per element.
pub(crate) fn build_positional_tuple(arguments: &[PythonObject]) -> PyReference {
    let table = Runtime::get().entry_points();
    let tuple = unsafe { (table.PyTuple_New)(arguments.len() as isize) };
    assert!(!tuple.is_null(), "failed to allocate a Python argument tuple");
    for (index, argument) in arguments.iter().enumerate() {
        let status =
            unsafe { (table.PyTuple_SetItem)(tuple, index as isize, argument.owned_ptr()) };
        assert_eq!(status, 0, "failed to store a Python tuple element");
    }
    unsafe { PyReference::adopting(tuple) }
}

/// Split `(name, value)` pairs into positionals (empty name) and keywords,
/// preserving relative order within each partition.
pub(crate) fn partition_pairs<'a, T>(pairs: &'a [(&'a str, T)]) -> (Vec<&'a T>, Vec<(&'a str, &'a T)>) {
    let mut positional = Vec::new();
    let mut keywords = Vec::new();
    for (name, value) in pairs {
        if name.is_empty() {
            positional.push(value);
        } else {
            keywords.push((*name, value));
        }
    }
    (positional, keywords)
}

/// Positional-only call through the guest call entry point.
pub(crate) fn call(
    receiver: &PythonObject,
    arguments: &[PythonObject],
) -> PythonResult<PythonObject> {
    let table = Runtime::get().entry_points();
    let tuple = build_positional_tuple(arguments);
    let result =
        unsafe { (table.PyObject_CallObject)(receiver.borrowed_ptr(), tuple.borrowed()) };
    if result.is_null() {
        return Err(reflect_call_failure(receiver));
    }
    Ok(unsafe { PythonObject::from_owned_ptr(result) })
}

/// Mixed positional/keyword call.
///
/// An empty name marks a positional argument. Duplicate keyword names are a
/// programming error: the guest dictionary would silently keep the last
/// write, which a native call site would reject, so the adapter rejects it
/// up front.
pub(crate) fn call_with_keywords(
    receiver: &PythonObject,
    pairs: &[(&str, PythonObject)],
) -> PythonResult<PythonObject> {
    let table = Runtime::get().entry_points();
    let (positional, keywords) = partition_pairs(pairs);

    let positional: Vec<PythonObject> = positional.into_iter().cloned().collect();
    let tuple = build_positional_tuple(&positional);

    let dictionary = unsafe { (table.PyDict_New)() };
    assert!(!dictionary.is_null(), "failed to allocate a Python keyword dictionary");
    let dictionary = unsafe { PyReference::adopting(dictionary) };

    let mut seen: Vec<&str> = Vec::with_capacity(keywords.len());
    for (name, value) in keywords {
        assert!(
            !seen.contains(&name),
            "duplicate keyword argument '{name}' in Python call"
        );
        seen.push(name);
        let key = crate::value::string_object(name);
        let status = unsafe {
            (table.PyDict_SetItem)(dictionary.borrowed(), key.borrowed_ptr(), value.borrowed_ptr())
        };
        assert_eq!(status, 0, "failed to store keyword argument '{name}'");
    }

    let result = unsafe {
        (table.PyObject_Call)(receiver.borrowed_ptr(), tuple.borrowed(), dictionary.borrowed())
    };
    if result.is_null() {
        return Err(reflect_call_failure(receiver));
    }
    Ok(unsafe { PythonObject::from_owned_ptr(result) })
}

#[cfg(test)]
mod tests {
    use super::partition_pairs;

    #[test]
    fn test_partition_preserves_relative_order() {
        let pairs = [("", 1), ("a", 2), ("", 3), ("b", 4), ("", 5)];
        let (positional, keywords) = partition_pairs(&pairs);
        assert_eq!(positional, vec![&1, &3, &5]);
        assert_eq!(keywords, vec![("a", &2), ("b", &4)]);
    }

    #[test]
    fn test_partition_all_positional() {
        let pairs = [("", 1), ("", 2)];
        let (positional, keywords) = partition_pairs(&pairs);
        assert_eq!(positional.len(), 2);
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_partition_all_keywords() {
        let pairs = [("x", 1), ("y", 2)];
        let (positional, keywords) = partition_pairs(&pairs);
        assert!(positional.is_empty());
        assert_eq!(keywords, vec![("x", &1), ("y", &2)]);
    }
}
