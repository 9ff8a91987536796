//! Iteration over Python objects via the guest iterator protocol.
//!
//! Advancing delegates to the iterator-next entry point. A null result with
//! no guest error pending is normal exhaustion (a terminal state); a null
//! result with an error pending is a mid-stream guest failure and must never
//! be mistaken for exhaustion.

use pybridge_ffi::Runtime;

use crate::call;
use crate::error::{fatal_error, PythonResult};
use crate::value::PythonObject;

/// An iterator over a Python object's elements.
///
/// Obtained from [`PythonObject::iter`] / [`PythonObject::try_iter`]. The
/// `std::iter::Iterator` impl is the non-throwing surface: a mid-stream guest
/// failure aborts instead of silently truncating. Use [`PythonIterator::try_next`]
/// to observe such failures as typed errors.
pub struct PythonIterator {
    iterator: PythonObject,
    exhausted: bool,
}

impl PythonIterator {
    pub(crate) fn new(iterator: PythonObject) -> PythonIterator {
        PythonIterator {
            iterator,
            exhausted: false,
        }
    }

    /// Advance, distinguishing exhaustion from a guest failure.
    pub fn try_next(&mut self) -> PythonResult<Option<PythonObject>> {
        if self.exhausted {
            return Ok(None);
        }
        let table = Runtime::get().entry_points();
        let next = unsafe { (table.PyIter_Next)(self.iterator.borrowed_ptr()) };
        if next.is_null() {
            self.exhausted = true;
            return match call::fetch_error() {
                Some(error) => Err(error),
                None => Ok(None),
            };
        }
        Ok(Some(unsafe { PythonObject::from_owned_ptr(next) }))
    }

    /// The underlying guest iterator object.
    pub fn object(&self) -> &PythonObject {
        &self.iterator
    }
}

impl Iterator for PythonIterator {
    type Item = PythonObject;

    fn next(&mut self) -> Option<PythonObject> {
        self.try_next()
            .unwrap_or_else(|e| fatal_error("iteration", &e))
    }
}
