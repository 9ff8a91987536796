//! `PythonObject` - the type-erased handle to any Python object.
//!
//! Every dispatch operation is a stateless transformation of
//! `(receiver, arguments)` into `(result | error)`, delegating to one entry
//! point from the resolved table and wrapping a [`PyReference`] around every
//! guest pointer that crosses the boundary.
//!
//! Three access surfaces exist and share one implementation:
//!
//! - **throwing** (`try_*`): reflects guest failures as [`PythonError`];
//! - **non-throwing** (`attr`, `item`, `call`, ...): identical logic, but
//!   any error is escalated to a fatal abort at the outermost layer;
//! - **checked** (`attr_opt`, `item_opt`): returns `None` instead of an
//!   error, clearing the guest error state the failed lookup set.
//!
//! Operator overloads (`std::ops`, `PartialEq`, `PartialOrd`, `Hash`) are
//! ergonomic sugar over the non-throwing surface; the named methods are the
//! core contract.

use std::ffi::{CStr, CString};
use std::rc::Rc;

use pybridge_ffi::{CompareOp, Runtime};

use crate::call;
use crate::convert::ToPython;
use crate::error::{fatal_error, PythonError, PythonResult};
use crate::handle::PyReference;
use crate::iterator::PythonIterator;

fn table() -> &'static pybridge_ffi::EntryPoints {
    Runtime::get().entry_points()
}

/// A Python object, opaque to the host type system.
///
/// Clones share the same underlying [`PyReference`]; the object stays alive
/// as long as at least one clone does. A `PythonObject` never wraps null.
#[derive(Clone)]
pub struct PythonObject {
    reference: Rc<PyReference>,
}

/// Build a guest string object from host text. Shared with the call adapter.
pub(crate) fn string_object(text: &str) -> PythonObject {
    let pointer = unsafe {
        (table().PyUnicode_FromStringAndSize)(text.as_ptr() as *const _, text.len() as isize)
    };
    assert!(!pointer.is_null(), "failed to create a Python string");
    unsafe { PythonObject::from_owned_ptr(pointer) }
}

fn attribute_name(name: &str) -> CString {
    CString::new(name).expect("attribute name contains an interior nul byte")
}

impl PythonObject {
    /// Wrap a fresh owned reference handed back by a guest entry point.
    ///
    /// # Safety
    /// `pointer` must be a live Python object carrying one reference the
    /// caller is entitled to consume.
    pub unsafe fn from_owned_ptr(pointer: pybridge_ffi::PyObjectPtr) -> PythonObject {
        PythonObject {
            reference: Rc::new(PyReference::adopting(pointer)),
        }
    }

    /// Wrap a borrowed pointer, incrementing the guest reference count.
    ///
    /// # Safety
    /// `pointer` must be a live Python object.
    pub unsafe fn from_borrowed_ptr(pointer: pybridge_ffi::PyObjectPtr) -> PythonObject {
        PythonObject {
            reference: Rc::new(PyReference::retaining(pointer)),
        }
    }

    /// Wrap an already-constructed reference handle.
    pub(crate) fn from_reference(reference: PyReference) -> PythonObject {
        PythonObject {
            reference: Rc::new(reference),
        }
    }

    /// The raw pointer without a reference count change.
    pub fn borrowed_ptr(&self) -> pybridge_ffi::PyObjectPtr {
        self.reference.borrowed()
    }

    /// Increment the guest reference count and return the raw pointer, for
    /// entry points that consume one reference.
    pub fn owned_ptr(&self) -> pybridge_ffi::PyObjectPtr {
        self.reference.owned()
    }

    /// The guest reference count. Inspection hook for leak tests.
    pub fn reference_count(&self) -> isize {
        unsafe { Runtime::get().reference_count(self.borrowed_ptr()) }
    }

    // ------------------------------------------------------------------
    // Attribute access
    // ------------------------------------------------------------------

    /// Attribute lookup, reflecting the guest exception on failure.
    pub fn try_attr(&self, name: &str) -> PythonResult<PythonObject> {
        let cname = attribute_name(name);
        let result = unsafe { (table().PyObject_GetAttrString)(self.borrowed_ptr(), cname.as_ptr()) };
        if result.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("attribute lookup '{name}' failed with no Python exception pending")
            }));
        }
        Ok(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// Attribute lookup; fatal when the member is missing.
    pub fn attr(&self, name: &str) -> PythonObject {
        self.try_attr(name)
            .unwrap_or_else(|e| fatal_error(&format!("attribute lookup '{name}'"), &e))
    }

    /// Checked attribute lookup: `None` when the member is missing, with the
    /// guest error state cleared.
    pub fn attr_opt(&self, name: &str) -> Option<PythonObject> {
        let cname = attribute_name(name);
        let result = unsafe { (table().PyObject_GetAttrString)(self.borrowed_ptr(), cname.as_ptr()) };
        if result.is_null() {
            call::clear_error();
            return None;
        }
        Some(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// Attribute assignment, reflecting the guest exception on failure.
    pub fn try_set_attr<V: ToPython>(&self, name: &str, value: V) -> PythonResult<()> {
        let cname = attribute_name(name);
        let value = value.to_python();
        let status = unsafe {
            (table().PyObject_SetAttrString)(self.borrowed_ptr(), cname.as_ptr(), value.borrowed_ptr())
        };
        if status != 0 {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("attribute assignment '{name}' failed with no Python exception pending")
            }));
        }
        Ok(())
    }

    /// Attribute assignment; fatal on failure.
    pub fn set_attr<V: ToPython>(&self, name: &str, value: V) {
        self.try_set_attr(name, value)
            .unwrap_or_else(|e| fatal_error(&format!("attribute assignment '{name}'"), &e))
    }

    // ------------------------------------------------------------------
    // Subscripting
    // ------------------------------------------------------------------

    /// A lone key is passed unwrapped; two or more keys are flattened into
    /// one guest tuple. The asymmetry is deliberate: guest semantics differ
    /// between `obj[k]` and `obj[(k,)]`.
    fn subscript_key(keys: &[PythonObject]) -> PythonObject {
        match keys {
            [] => panic!("subscript requires at least one key"),
            [single] => single.clone(),
            multiple => PythonObject::from_reference(call::build_positional_tuple(multiple)),
        }
    }

    /// Subscript read, reflecting the guest exception on failure.
    pub fn try_subscript(&self, keys: &[PythonObject]) -> PythonResult<PythonObject> {
        let key = Self::subscript_key(keys);
        let result = unsafe { (table().PyObject_GetItem)(self.borrowed_ptr(), key.borrowed_ptr()) };
        if result.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("subscript read failed with no Python exception pending")
            }));
        }
        Ok(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// Subscript read; fatal on failure.
    pub fn subscript(&self, keys: &[PythonObject]) -> PythonObject {
        self.try_subscript(keys)
            .unwrap_or_else(|e| fatal_error("subscript read", &e))
    }

    /// Subscript write. Assigning the absent sentinel (`None` here) deletes
    /// the key instead of storing it.
    pub fn try_set_subscript(
        &self,
        keys: &[PythonObject],
        value: Option<PythonObject>,
    ) -> PythonResult<()> {
        let key = Self::subscript_key(keys);
        let status = match &value {
            Some(value) => unsafe {
                (table().PyObject_SetItem)(self.borrowed_ptr(), key.borrowed_ptr(), value.borrowed_ptr())
            },
            None => unsafe { (table().PyObject_DelItem)(self.borrowed_ptr(), key.borrowed_ptr()) },
        };
        if status != 0 {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("subscript write failed with no Python exception pending")
            }));
        }
        Ok(())
    }

    /// Subscript write; fatal on failure.
    pub fn set_subscript(&self, keys: &[PythonObject], value: Option<PythonObject>) {
        self.try_set_subscript(keys, value)
            .unwrap_or_else(|e| fatal_error("subscript write", &e))
    }

    /// Single-key subscript read, reflecting the guest exception on failure.
    pub fn try_item<K: ToPython>(&self, key: K) -> PythonResult<PythonObject> {
        self.try_subscript(&[key.to_python()])
    }

    /// Single-key subscript read; fatal on failure.
    pub fn item<K: ToPython>(&self, key: K) -> PythonObject {
        self.try_item(key)
            .unwrap_or_else(|e| fatal_error("subscript read", &e))
    }

    /// Checked single-key subscript read: `None` for a missing key, with the
    /// guest error state cleared.
    pub fn item_opt<K: ToPython>(&self, key: K) -> Option<PythonObject> {
        let key = key.to_python();
        let result = unsafe { (table().PyObject_GetItem)(self.borrowed_ptr(), key.borrowed_ptr()) };
        if result.is_null() {
            call::clear_error();
            return None;
        }
        Some(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// Single-key subscript write, reflecting the guest exception on failure.
    pub fn try_set_item<K: ToPython, V: ToPython>(&self, key: K, value: V) -> PythonResult<()> {
        self.try_set_subscript(&[key.to_python()], Some(value.to_python()))
    }

    /// Single-key subscript write; fatal on failure.
    pub fn set_item<K: ToPython, V: ToPython>(&self, key: K, value: V) {
        self.try_set_item(key, value)
            .unwrap_or_else(|e| fatal_error("subscript write", &e))
    }

    /// Single-key deletion, reflecting the guest exception on failure.
    pub fn try_del_item<K: ToPython>(&self, key: K) -> PythonResult<()> {
        self.try_set_subscript(&[key.to_python()], None)
    }

    /// Single-key deletion; fatal on failure.
    pub fn del_item<K: ToPython>(&self, key: K) {
        self.try_del_item(key)
            .unwrap_or_else(|e| fatal_error("subscript deletion", &e))
    }

    // ------------------------------------------------------------------
    // Calling
    // ------------------------------------------------------------------

    /// Positional call, reflecting guest failures per the adapter's triage
    /// order (pending exception strictly before invalid-call).
    pub fn try_call(&self, arguments: &[PythonObject]) -> PythonResult<PythonObject> {
        call::call(self, arguments)
    }

    /// Positional call; fatal on failure.
    pub fn call(&self, arguments: &[PythonObject]) -> PythonObject {
        self.try_call(arguments)
            .unwrap_or_else(|e| fatal_error("call", &e))
    }

    /// Mixed positional/keyword call; an empty name marks a positional
    /// argument.
    pub fn try_call_with_keywords(
        &self,
        pairs: &[(&str, PythonObject)],
    ) -> PythonResult<PythonObject> {
        call::call_with_keywords(self, pairs)
    }

    /// Mixed positional/keyword call; fatal on failure.
    pub fn call_with_keywords(&self, pairs: &[(&str, PythonObject)]) -> PythonObject {
        self.try_call_with_keywords(pairs)
            .unwrap_or_else(|e| fatal_error("keyword call", &e))
    }

    /// Look up a member and call it positionally.
    pub fn try_call_method(
        &self,
        name: &str,
        arguments: &[PythonObject],
    ) -> PythonResult<PythonObject> {
        self.try_attr(name)?.try_call(arguments)
    }

    /// Look up a member and call it positionally; fatal on failure.
    pub fn call_method(&self, name: &str, arguments: &[PythonObject]) -> PythonObject {
        self.try_call_method(name, arguments)
            .unwrap_or_else(|e| fatal_error(&format!("method call '{name}'"), &e))
    }

    // ------------------------------------------------------------------
    // Numeric operators
    // ------------------------------------------------------------------

    fn binary_result(
        &self,
        result: pybridge_ffi::PyObjectPtr,
        operator: &str,
    ) -> PythonResult<PythonObject> {
        if result.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("operator '{operator}' failed with no Python exception pending")
            }));
        }
        Ok(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// `self + other`, reflecting the guest exception on failure.
    pub fn try_add(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_Add)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "+")
    }

    /// `self - other`, reflecting the guest exception on failure.
    pub fn try_sub(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result =
            unsafe { (table().PyNumber_Subtract)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "-")
    }

    /// `self * other`, reflecting the guest exception on failure.
    pub fn try_mul(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result =
            unsafe { (table().PyNumber_Multiply)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "*")
    }

    /// `self / other`, reflecting the guest exception on failure.
    pub fn try_div(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result =
            unsafe { (table().PyNumber_TrueDivide)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "/")
    }

    /// `self % other`, reflecting the guest exception on failure.
    pub fn try_rem(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result =
            unsafe { (table().PyNumber_Remainder)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "%")
    }

    /// `self & other`, reflecting the guest exception on failure.
    pub fn try_bitand(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_And)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "&")
    }

    /// `self | other`, reflecting the guest exception on failure.
    pub fn try_bitor(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_Or)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "|")
    }

    /// `self ^ other`, reflecting the guest exception on failure.
    pub fn try_bitxor(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_Xor)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "^")
    }

    /// In-place `self += other`, reflecting the guest exception on failure.
    pub fn try_in_place_add(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result =
            unsafe { (table().PyNumber_InPlaceAdd)(self.borrowed_ptr(), other.borrowed_ptr()) };
        self.binary_result(result, "+=")
    }

    /// In-place `self -= other`, reflecting the guest exception on failure.
    pub fn try_in_place_sub(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe {
            (table().PyNumber_InPlaceSubtract)(self.borrowed_ptr(), other.borrowed_ptr())
        };
        self.binary_result(result, "-=")
    }

    /// In-place `self *= other`, reflecting the guest exception on failure.
    pub fn try_in_place_mul(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe {
            (table().PyNumber_InPlaceMultiply)(self.borrowed_ptr(), other.borrowed_ptr())
        };
        self.binary_result(result, "*=")
    }

    /// In-place `self /= other`, reflecting the guest exception on failure.
    pub fn try_in_place_div(&self, other: &PythonObject) -> PythonResult<PythonObject> {
        let result = unsafe {
            (table().PyNumber_InPlaceTrueDivide)(self.borrowed_ptr(), other.borrowed_ptr())
        };
        self.binary_result(result, "/=")
    }

    /// Unary `-self`, reflecting the guest exception on failure.
    pub fn try_neg(&self) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_Negative)(self.borrowed_ptr()) };
        self.binary_result(result, "unary -")
    }

    /// Unary `~self`, reflecting the guest exception on failure.
    pub fn try_invert(&self) -> PythonResult<PythonObject> {
        let result = unsafe { (table().PyNumber_Invert)(self.borrowed_ptr()) };
        self.binary_result(result, "~")
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Rich comparison returning the guest's result object.
    pub fn try_rich_compare(
        &self,
        other: &PythonObject,
        op: CompareOp,
    ) -> PythonResult<PythonObject> {
        let result = unsafe {
            (table().PyObject_RichCompare)(self.borrowed_ptr(), other.borrowed_ptr(), op as i32)
        };
        if result.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| {
                panic!("rich comparison failed with no Python exception pending")
            }));
        }
        Ok(unsafe { PythonObject::from_owned_ptr(result) })
    }

    /// Boolean rich comparison.
    ///
    /// Entering with a stale guest exception pending is a programming error;
    /// a comparison that itself raises is fatal.
    pub fn compare(&self, other: &PythonObject, op: CompareOp) -> bool {
        debug_assert!(
            !call::error_pending(),
            "rich comparison entered with a stale Python exception pending"
        );
        let result = unsafe {
            (table().PyObject_RichCompareBool)(self.borrowed_ptr(), other.borrowed_ptr(), op as i32)
        };
        match result {
            0 => false,
            1 => true,
            _ => {
                let error = call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                    receiver: self.clone(),
                });
                fatal_error("rich comparison", &error)
            }
        }
    }

    /// Identity comparison: do both values share the same reference handle?
    ///
    /// Deliberately distinct from `==`: this never enters the guest runtime.
    pub fn is_identical(&self, other: &PythonObject) -> bool {
        Rc::ptr_eq(&self.reference, &other.reference)
    }

    // ------------------------------------------------------------------
    // Iteration, length, hashing, rendering
    // ------------------------------------------------------------------

    /// Obtain a guest iterator; failure indicates a non-iterable receiver.
    pub fn try_iter(&self) -> PythonResult<PythonIterator> {
        let result = unsafe { (table().PyObject_GetIter)(self.borrowed_ptr()) };
        if result.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                receiver: self.clone(),
            }));
        }
        Ok(PythonIterator::new(unsafe {
            PythonObject::from_owned_ptr(result)
        }))
    }

    /// Obtain a guest iterator; fatal for non-iterable receivers.
    pub fn iter(&self) -> PythonIterator {
        self.try_iter()
            .unwrap_or_else(|e| fatal_error("iteration", &e))
    }

    /// Element count, reflecting the guest exception on failure.
    ///
    /// Distinct from checked member access: a length failure is a program
    /// error on the receiver, not an absence.
    pub fn try_len(&self) -> PythonResult<usize> {
        let length = unsafe { (table().PyObject_Length)(self.borrowed_ptr()) };
        if length < 0 {
            return Err(call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                receiver: self.clone(),
            }));
        }
        Ok(length as usize)
    }

    /// Element count; fatal on failure.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.try_len().unwrap_or_else(|e| fatal_error("len", &e))
    }

    /// The guest hash, via the object's own hash member. Fatal for an
    /// unhashable object; never silently degrades.
    pub fn hash_value(&self) -> i64 {
        let member = self.attr("__hash__");
        let result = member.call(&[]);
        let hashed = unsafe { (table().PyLong_AsLongLong)(result.borrowed_ptr()) };
        if call::error_pending() {
            let error = call::fetch_error().expect("hash error vanished");
            fatal_error("hash", &error);
        }
        hashed
    }

    /// `str(self)`, reflecting the guest exception on failure.
    pub fn try_str(&self) -> PythonResult<String> {
        let rendered = unsafe { (table().PyObject_Str)(self.borrowed_ptr()) };
        if rendered.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                receiver: self.clone(),
            }));
        }
        let rendered = unsafe { PythonObject::from_owned_ptr(rendered) };
        Self::text_of(&rendered).ok_or_else(|| PythonError::InvalidCall {
            receiver: self.clone(),
        })
    }

    /// `str(self)`; fatal on failure.
    pub fn str_value(&self) -> String {
        self.try_str().unwrap_or_else(|e| fatal_error("str", &e))
    }

    /// `repr(self)`, reflecting the guest exception on failure.
    pub fn try_repr(&self) -> PythonResult<String> {
        let rendered = unsafe { (table().PyObject_Repr)(self.borrowed_ptr()) };
        if rendered.is_null() {
            return Err(call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                receiver: self.clone(),
            }));
        }
        let rendered = unsafe { PythonObject::from_owned_ptr(rendered) };
        Self::text_of(&rendered).ok_or_else(|| PythonError::InvalidCall {
            receiver: self.clone(),
        })
    }

    /// `repr(self)`; fatal on failure.
    pub fn repr_value(&self) -> String {
        self.try_repr().unwrap_or_else(|e| fatal_error("repr", &e))
    }

    /// UTF-8 view of a guest string object, copied out immediately.
    pub(crate) fn text_of(string: &PythonObject) -> Option<String> {
        let text = unsafe { (table().PyUnicode_AsUTF8)(string.borrowed_ptr()) };
        if text.is_null() {
            call::clear_error();
            return None;
        }
        Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
    }

    // ------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------

    /// The name of the object's class, when introspectable.
    pub fn class_name(&self) -> Option<String> {
        let class = self.attr_opt("__class__")?;
        let name = class.attr_opt("__name__")?;
        Self::text_of(&name)
    }

    /// Whether this is the guest `None` singleton.
    pub fn is_none(&self) -> bool {
        self.class_name().as_deref() == Some("NoneType")
    }

    /// Whether the object is callable.
    pub fn is_callable(&self) -> bool {
        unsafe { (table().PyCallable_Check)(self.borrowed_ptr()) != 0 }
    }

    /// Guest truthiness; fatal when the object does not support it.
    pub fn is_truthy(&self) -> bool {
        let result = unsafe { (table().PyObject_IsTrue)(self.borrowed_ptr()) };
        if result < 0 {
            let error = call::fetch_error().unwrap_or_else(|| PythonError::InvalidCall {
                receiver: self.clone(),
            });
            fatal_error("truth test", &error);
        }
        result != 0
    }
}

// ----------------------------------------------------------------------
// Operator and trait sugar (non-throwing surface)
// ----------------------------------------------------------------------

macro_rules! binary_operator_sugar {
    ($trait_:ident, $method:ident, $try_method:ident, $symbol:literal) => {
        impl std::ops::$trait_ for &PythonObject {
            type Output = PythonObject;
            fn $method(self, rhs: &PythonObject) -> PythonObject {
                self.$try_method(rhs)
                    .unwrap_or_else(|e| fatal_error(concat!("operator '", $symbol, "'"), &e))
            }
        }

        impl std::ops::$trait_ for PythonObject {
            type Output = PythonObject;
            fn $method(self, rhs: PythonObject) -> PythonObject {
                (&self).$method(&rhs)
            }
        }
    };
}

binary_operator_sugar!(Add, add, try_add, "+");
binary_operator_sugar!(Sub, sub, try_sub, "-");
binary_operator_sugar!(Mul, mul, try_mul, "*");
binary_operator_sugar!(Div, div, try_div, "/");
binary_operator_sugar!(Rem, rem, try_rem, "%");
binary_operator_sugar!(BitAnd, bitand, try_bitand, "&");
binary_operator_sugar!(BitOr, bitor, try_bitor, "|");
binary_operator_sugar!(BitXor, bitxor, try_bitxor, "^");

macro_rules! assign_operator_sugar {
    ($trait_:ident, $method:ident, $try_method:ident, $symbol:literal) => {
        impl std::ops::$trait_ for PythonObject {
            fn $method(&mut self, rhs: PythonObject) {
                let result = self
                    .$try_method(&rhs)
                    .unwrap_or_else(|e| fatal_error(concat!("operator '", $symbol, "'"), &e));
                *self = result;
            }
        }
    };
}

assign_operator_sugar!(AddAssign, add_assign, try_in_place_add, "+=");
assign_operator_sugar!(SubAssign, sub_assign, try_in_place_sub, "-=");
assign_operator_sugar!(MulAssign, mul_assign, try_in_place_mul, "*=");
assign_operator_sugar!(DivAssign, div_assign, try_in_place_div, "/=");

impl std::ops::Neg for &PythonObject {
    type Output = PythonObject;
    fn neg(self) -> PythonObject {
        self.try_neg()
            .unwrap_or_else(|e| fatal_error("operator 'unary -'", &e))
    }
}

impl std::ops::Not for &PythonObject {
    type Output = PythonObject;
    fn not(self) -> PythonObject {
        self.try_invert()
            .unwrap_or_else(|e| fatal_error("operator '~'", &e))
    }
}

impl PartialEq for PythonObject {
    fn eq(&self, other: &PythonObject) -> bool {
        self.compare(other, CompareOp::Eq)
    }
}

impl PartialOrd for PythonObject {
    fn partial_cmp(&self, other: &PythonObject) -> Option<std::cmp::Ordering> {
        if self.compare(other, CompareOp::Eq) {
            Some(std::cmp::Ordering::Equal)
        } else if self.compare(other, CompareOp::Lt) {
            Some(std::cmp::Ordering::Less)
        } else if self.compare(other, CompareOp::Gt) {
            Some(std::cmp::Ordering::Greater)
        } else {
            None
        }
    }
}

impl std::hash::Hash for PythonObject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_i64(self.hash_value());
    }
}

impl std::fmt::Display for PythonObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_str() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<unrenderable Python object>"),
        }
    }
}

impl std::fmt::Debug for PythonObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_repr() {
            Ok(text) => write!(f, "PythonObject({text})"),
            Err(_) => write!(f, "PythonObject({:p})", self.borrowed_ptr()),
        }
    }
}

impl<'a> IntoIterator for &'a PythonObject {
    type Item = PythonObject;
    type IntoIter = PythonIterator;

    fn into_iter(self) -> PythonIterator {
        self.iter()
    }
}
