//! Conversion protocols between Rust values and Python objects.
//!
//! Two capability contracts:
//!
//! - [`ToPython`] is total: converting a well-formed Rust value to a
//!   `PythonObject` does not fail (allocation failure inside the guest
//!   aborts; it is not a recoverable condition).
//! - [`FromPython`] is partial: it returns `None` when the guest value's
//!   runtime type or value is incompatible, and always clears any guest
//!   error a failed coercion attempt set, so failed conversions never leak
//!   error state into subsequent operations.
//!
//! Host-side specialization happens through this pair, not by subtyping the
//! handle: `PythonObject` itself stays a single opaque type.

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::os::raw::c_char;
use std::ptr;

use pybridge_ffi::{PyObjectPtr, Runtime};

use crate::call;
use crate::interface::Python;
use crate::value::PythonObject;

fn table() -> &'static pybridge_ffi::EntryPoints {
    Runtime::get().entry_points()
}

/// Conversion failed: clear any guest error the attempt set, report absence.
fn failed<T>() -> Option<T> {
    if call::error_pending() {
        call::clear_error();
    }
    None
}

/// Adopt a freshly created owned reference; creation must not fail.
fn expect_owned(pointer: PyObjectPtr, what: &str) -> PythonObject {
    assert!(!pointer.is_null(), "failed to create a Python {what}");
    unsafe { PythonObject::from_owned_ptr(pointer) }
}

/// A value that can always be converted to a Python object.
pub trait ToPython {
    fn to_python(&self) -> PythonObject;
}

/// A value that can sometimes be recovered from a Python object.
///
/// `None` means "no conversion possible", never a fatal condition.
pub trait FromPython: Sized {
    fn from_python(object: &PythonObject) -> Option<Self>;
}

impl<T: ToPython + ?Sized> ToPython for &T {
    fn to_python(&self) -> PythonObject {
        (**self).to_python()
    }
}

impl ToPython for PythonObject {
    fn to_python(&self) -> PythonObject {
        self.clone()
    }
}

impl FromPython for PythonObject {
    fn from_python(object: &PythonObject) -> Option<PythonObject> {
        Some(object.clone())
    }
}

// ----------------------------------------------------------------------
// Booleans
// ----------------------------------------------------------------------

impl ToPython for bool {
    fn to_python(&self) -> PythonObject {
        let pointer = unsafe { (table().PyBool_FromLong)(i64::from(*self) as _) };
        expect_owned(pointer, "bool")
    }
}

impl FromPython for bool {
    fn from_python(object: &PythonObject) -> Option<bool> {
        // Strict: a guest integer is not a host bool.
        if object.class_name().as_deref() != Some("bool") {
            return failed();
        }
        Some(object.is_truthy())
    }
}

// ----------------------------------------------------------------------
// Integers
// ----------------------------------------------------------------------

impl ToPython for i64 {
    fn to_python(&self) -> PythonObject {
        let pointer = unsafe { (table().PyLong_FromLongLong)(*self) };
        expect_owned(pointer, "int")
    }
}

impl FromPython for i64 {
    fn from_python(object: &PythonObject) -> Option<i64> {
        let value = unsafe { (table().PyLong_AsLongLong)(object.borrowed_ptr()) };
        if call::error_pending() {
            return failed();
        }
        Some(value)
    }
}

impl ToPython for u64 {
    fn to_python(&self) -> PythonObject {
        let pointer = unsafe { (table().PyLong_FromUnsignedLongLong)(*self) };
        expect_owned(pointer, "int")
    }
}

impl FromPython for u64 {
    fn from_python(object: &PythonObject) -> Option<u64> {
        let value = unsafe { (table().PyLong_AsUnsignedLongLong)(object.borrowed_ptr()) };
        if call::error_pending() {
            return failed();
        }
        Some(value)
    }
}

macro_rules! signed_conversion {
    ($($ty:ty),*) => {$(
        impl ToPython for $ty {
            fn to_python(&self) -> PythonObject {
                (*self as i64).to_python()
            }
        }

        impl FromPython for $ty {
            fn from_python(object: &PythonObject) -> Option<$ty> {
                let wide = i64::from_python(object)?;
                <$ty>::try_from(wide).ok()
            }
        }
    )*};
}

macro_rules! unsigned_conversion {
    ($($ty:ty),*) => {$(
        impl ToPython for $ty {
            fn to_python(&self) -> PythonObject {
                (*self as u64).to_python()
            }
        }

        impl FromPython for $ty {
            fn from_python(object: &PythonObject) -> Option<$ty> {
                let wide = u64::from_python(object)?;
                <$ty>::try_from(wide).ok()
            }
        }
    )*};
}

signed_conversion!(i8, i16, i32, isize);
unsigned_conversion!(u8, u16, u32, usize);

// ----------------------------------------------------------------------
// Floats
// ----------------------------------------------------------------------

impl ToPython for f64 {
    fn to_python(&self) -> PythonObject {
        let pointer = unsafe { (table().PyFloat_FromDouble)(*self) };
        expect_owned(pointer, "float")
    }
}

impl FromPython for f64 {
    fn from_python(object: &PythonObject) -> Option<f64> {
        let value = unsafe { (table().PyFloat_AsDouble)(object.borrowed_ptr()) };
        if call::error_pending() {
            return failed();
        }
        Some(value)
    }
}

impl ToPython for f32 {
    fn to_python(&self) -> PythonObject {
        f64::from(*self).to_python()
    }
}

impl FromPython for f32 {
    fn from_python(object: &PythonObject) -> Option<f32> {
        f64::from_python(object).map(|wide| wide as f32)
    }
}

// ----------------------------------------------------------------------
// Strings and byte buffers
// ----------------------------------------------------------------------

impl ToPython for str {
    fn to_python(&self) -> PythonObject {
        let pointer = unsafe {
            (table().PyUnicode_FromStringAndSize)(self.as_ptr() as *const c_char, self.len() as isize)
        };
        expect_owned(pointer, "str")
    }
}

impl ToPython for String {
    fn to_python(&self) -> PythonObject {
        self.as_str().to_python()
    }
}

impl FromPython for String {
    fn from_python(object: &PythonObject) -> Option<String> {
        // The UTF-8 view raises for non-string receivers; text_of clears it.
        PythonObject::text_of(object)
    }
}

impl PythonObject {
    /// Build a guest bytes object from a host byte buffer.
    pub fn from_bytes(bytes: &[u8]) -> PythonObject {
        let pointer = unsafe {
            (table().PyBytes_FromStringAndSize)(bytes.as_ptr() as *const c_char, bytes.len() as isize)
        };
        expect_owned(pointer, "bytes")
    }

    /// Recover a host byte buffer; `None` for non-bytes receivers.
    pub fn to_byte_vec(&self) -> Option<Vec<u8>> {
        let mut buffer: *mut c_char = ptr::null_mut();
        let mut length: isize = 0;
        let status = unsafe {
            (table().PyBytes_AsStringAndSize)(self.borrowed_ptr(), &mut buffer, &mut length)
        };
        if status != 0 || buffer.is_null() {
            return failed();
        }
        let slice = unsafe { std::slice::from_raw_parts(buffer as *const u8, length as usize) };
        Some(slice.to_vec())
    }
}

// ----------------------------------------------------------------------
// Optionals
// ----------------------------------------------------------------------

impl<T: ToPython> ToPython for Option<T> {
    fn to_python(&self) -> PythonObject {
        match self {
            Some(value) => value.to_python(),
            None => Python::shared().none().clone(),
        }
    }
}

impl<T: FromPython> FromPython for Option<T> {
    fn from_python(object: &PythonObject) -> Option<Option<T>> {
        if object.is_none() {
            return Some(None);
        }
        T::from_python(object).map(Some)
    }
}

// ----------------------------------------------------------------------
// Sequences
// ----------------------------------------------------------------------

impl<T: ToPython> ToPython for [T] {
    fn to_python(&self) -> PythonObject {
        let list = unsafe { (table().PyList_New)(self.len() as isize) };
        let list = expect_owned(list, "list");
        for (index, element) in self.iter().enumerate() {
            // The list item store consumes one reference.
            let status = unsafe {
                (table().PyList_SetItem)(list.borrowed_ptr(), index as isize, element.to_python().owned_ptr())
            };
            assert_eq!(status, 0, "failed to store a Python list element");
        }
        list
    }
}

impl<T: ToPython> ToPython for Vec<T> {
    fn to_python(&self) -> PythonObject {
        self.as_slice().to_python()
    }
}

impl<T: FromPython> FromPython for Vec<T> {
    fn from_python(object: &PythonObject) -> Option<Vec<T>> {
        let mut iterator = match object.try_iter() {
            Ok(iterator) => iterator,
            Err(_) => return failed(),
        };
        let mut elements = Vec::new();
        loop {
            match iterator.try_next() {
                Ok(Some(element)) => elements.push(T::from_python(&element)?),
                Ok(None) => break,
                Err(_) => return failed(),
            }
        }
        Some(elements)
    }
}

// ----------------------------------------------------------------------
// Tuples
// ----------------------------------------------------------------------

macro_rules! tuple_conversion {
    ($arity:literal => $($name:ident : $index:tt),+) => {
        impl<$($name: ToPython),+> ToPython for ($($name,)+) {
            fn to_python(&self) -> PythonObject {
                let elements = [$(self.$index.to_python()),+];
                PythonObject::from_reference(call::build_positional_tuple(&elements))
            }
        }

        impl<$($name: FromPython),+> FromPython for ($($name,)+) {
            fn from_python(object: &PythonObject) -> Option<($($name,)+)> {
                if object.class_name().as_deref() != Some("tuple") {
                    return failed();
                }
                let size = unsafe { (table().PyTuple_Size)(object.borrowed_ptr()) };
                if size != $arity {
                    return failed();
                }
                Some(($(
                    {
                        let element = unsafe {
                            (table().PyTuple_GetItem)(object.borrowed_ptr(), $index)
                        };
                        if element.is_null() {
                            return failed();
                        }
                        let element = unsafe { PythonObject::from_borrowed_ptr(element) };
                        $name::from_python(&element)?
                    },
                )+))
            }
        }
    };
}

tuple_conversion!(2 => A: 0, B: 1);
tuple_conversion!(3 => A: 0, B: 1, C: 2);
tuple_conversion!(4 => A: 0, B: 1, C: 2, D: 3);

// ----------------------------------------------------------------------
// Associative maps
// ----------------------------------------------------------------------

impl<K: ToPython + Eq + Hash, V: ToPython> ToPython for HashMap<K, V> {
    fn to_python(&self) -> PythonObject {
        let dictionary = unsafe { (table().PyDict_New)() };
        let dictionary = expect_owned(dictionary, "dict");
        for (key, value) in self {
            let key = key.to_python();
            let value = value.to_python();
            let status = unsafe {
                (table().PyDict_SetItem)(
                    dictionary.borrowed_ptr(),
                    key.borrowed_ptr(),
                    value.borrowed_ptr(),
                )
            };
            assert_eq!(status, 0, "failed to store a Python dict entry");
        }
        dictionary
    }
}

impl<K: FromPython + Eq + Hash, V: FromPython> FromPython for HashMap<K, V> {
    fn from_python(object: &PythonObject) -> Option<HashMap<K, V>> {
        if object.class_name().as_deref() != Some("dict") {
            return failed();
        }
        let mut entries = HashMap::new();
        let mut position: isize = 0;
        let mut key: PyObjectPtr = ptr::null_mut();
        let mut value: PyObjectPtr = ptr::null_mut();
        // Dictionary iteration yields borrowed references.
        while unsafe {
            (table().PyDict_Next)(object.borrowed_ptr(), &mut position, &mut key, &mut value)
        } != 0
        {
            let key = unsafe { PythonObject::from_borrowed_ptr(key) };
            let value = unsafe { PythonObject::from_borrowed_ptr(value) };
            entries.insert(K::from_python(&key)?, V::from_python(&value)?);
        }
        Some(entries)
    }
}

// ----------------------------------------------------------------------
// Ranges (guest slice objects)
// ----------------------------------------------------------------------

fn slice_object(
    start: Option<PythonObject>,
    stop: Option<PythonObject>,
) -> PythonObject {
    let start_ptr = start.as_ref().map_or(ptr::null_mut(), |o| o.borrowed_ptr());
    let stop_ptr = stop.as_ref().map_or(ptr::null_mut(), |o| o.borrowed_ptr());
    let pointer = unsafe { (table().PySlice_New)(start_ptr, stop_ptr, ptr::null_mut()) };
    expect_owned(pointer, "slice")
}

impl ToPython for Range<i64> {
    fn to_python(&self) -> PythonObject {
        slice_object(Some(self.start.to_python()), Some(self.end.to_python()))
    }
}

impl ToPython for RangeFrom<i64> {
    fn to_python(&self) -> PythonObject {
        slice_object(Some(self.start.to_python()), None)
    }
}

impl ToPython for RangeTo<i64> {
    fn to_python(&self) -> PythonObject {
        slice_object(None, Some(self.end.to_python()))
    }
}

impl ToPython for RangeFull {
    fn to_python(&self) -> PythonObject {
        slice_object(None, None)
    }
}

impl FromPython for Range<i64> {
    fn from_python(object: &PythonObject) -> Option<Range<i64>> {
        let start = i64::from_python(&object.attr_opt("start")?)?;
        let stop = i64::from_python(&object.attr_opt("stop")?)?;
        Some(start..stop)
    }
}
