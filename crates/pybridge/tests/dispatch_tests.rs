//! Dispatch protocol tests: attribute/item access surfaces, subscript
//! asymmetry, operators, comparison, iteration and reference count balance.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use pybridge::{CompareOp, FromPython, PythonError, PythonObject, ToPython};

#[test]
fn test_checked_vs_unchecked_member_access() {
    let Some(guest) = common::acquire() else { return };

    let value = guest.eval("object()");
    assert!(value.attr_opt("__class__").is_some());
    // Checked access reports absence.
    assert!(value.attr_opt("zzz").is_none());
    // Unchecked access is fatal.
    let outcome = catch_unwind(AssertUnwindSafe(|| value.attr("zzz")));
    assert!(outcome.is_err());
}

#[test]
fn test_attribute_set_and_get() {
    let Some(guest) = common::acquire() else { return };

    let types = guest.python.import("types");
    let namespace = types.attr("SimpleNamespace").call(&[]);
    namespace.set_attr("flag", 17i64);
    assert_eq!(i64::from_python(&namespace.attr("flag")), Some(17));

    let error = namespace.try_attr("missing").unwrap_err();
    assert!(matches!(error, PythonError::Exception { .. }));
}

#[test]
fn test_subscript_single_vs_multi_key_asymmetry() {
    let Some(guest) = common::acquire() else { return };

    // A lone key goes through unwrapped: 1 hits the int key, not (1,).
    let table = guest.eval("{1: 'plain', (1,): 'wrapped', (1, 2): 'pair'}");
    let single = table.subscript(&[1i64.to_python()]);
    assert_eq!(String::from_python(&single).as_deref(), Some("plain"));

    // Two or more keys are flattened into one guest tuple.
    let pair = table.subscript(&[1i64.to_python(), 2i64.to_python()]);
    assert_eq!(String::from_python(&pair).as_deref(), Some("pair"));
}

#[test]
fn test_absent_assignment_deletes_key() {
    let Some(guest) = common::acquire() else { return };

    let table = guest.eval("{'a': 1}");
    table.set_item("b", "c");
    assert!(table.item_opt("b").is_some());

    table.set_subscript(&["b".to_python()], None);
    assert!(table.item_opt("b").is_none());
    assert!(table.item_opt("a").is_some());
}

#[test]
fn test_missing_key_checked_vs_throwing() {
    let Some(guest) = common::acquire() else { return };

    let table = guest.eval("{'a': 1}");
    assert!(table.item_opt("zzz").is_none());
    let error = table.try_item("zzz").unwrap_err();
    assert!(matches!(error, PythonError::Exception { .. }));
}

#[test]
fn test_numeric_operators() {
    let Some(_guest) = common::acquire() else { return };

    let six = 6i64.to_python();
    let four = 4i64.to_python();
    assert_eq!(i64::from_python(&(&six + &four)), Some(10));
    assert_eq!(i64::from_python(&(&six - &four)), Some(2));
    assert_eq!(i64::from_python(&(&six * &four)), Some(24));
    assert_eq!(f64::from_python(&(&six / &four)), Some(1.5));
    assert_eq!(i64::from_python(&(&six % &four)), Some(2));
    assert_eq!(i64::from_python(&(&six & &four)), Some(4));
    assert_eq!(i64::from_python(&(&six | &four)), Some(6));
    assert_eq!(i64::from_python(&(&six ^ &four)), Some(2));
    assert_eq!(i64::from_python(&(-&six)), Some(-6));
    assert_eq!(i64::from_python(&(!&six)), Some(-7));

    let mut total = 1i64.to_python();
    total += 2i64.to_python();
    assert_eq!(i64::from_python(&total), Some(3));
}

#[test]
fn test_operator_failure_is_reflected() {
    let Some(_guest) = common::acquire() else { return };

    let number = 1i64.to_python();
    let text = "x".to_python();
    let error = number.try_sub(&text).unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("TypeError"));
        }
        other => panic!("expected a guest exception, got {other}"),
    }
}

#[test]
fn test_rich_comparison() {
    let Some(_guest) = common::acquire() else { return };

    let two = 2i64.to_python();
    let three = 3i64.to_python();
    assert!(two.compare(&three, CompareOp::Lt));
    assert!(two.compare(&three, CompareOp::Ne));
    assert!(!two.compare(&three, CompareOp::Gt));
    assert!(two < three);
    assert!(two != three);
    assert_eq!(two, 2i64.to_python());
}

#[test]
fn test_identity_is_distinct_from_equality() {
    let Some(_guest) = common::acquire() else { return };

    let a = 500i64.to_python();
    let b = 500i64.to_python();
    // Equal by guest comparison, not identical: separate handles.
    assert_eq!(a, b);
    assert!(!a.is_identical(&b));
    // Clones share the handle.
    let c = a.clone();
    assert!(a.is_identical(&c));
}

#[test]
fn test_iteration_yields_exactly_k_then_stops() {
    let Some(guest) = common::acquire() else { return };

    let list = guest.eval("[10, 20, 30]");
    let collected: Vec<i64> = list
        .iter()
        .map(|element| i64::from_python(&element).unwrap())
        .collect();
    assert_eq!(collected, vec![10, 20, 30]);

    let mut iterator = list.iter();
    let mut count = 0;
    while let Some(_element) = iterator.try_next().unwrap() {
        count += 1;
    }
    assert_eq!(count, 3);
    // Exhaustion is terminal, not an error.
    assert!(iterator.try_next().unwrap().is_none());
    assert!(iterator.try_next().unwrap().is_none());
}

#[test]
fn test_mid_stream_iterator_error_is_reflected() {
    let Some(guest) = common::acquire() else { return };

    // First element fine; the second raises ZeroDivisionError.
    let generator = guest.eval("(1 // (1 - i) for i in range(3))");
    let mut iterator = generator.try_iter().unwrap();
    assert!(iterator.try_next().unwrap().is_some());
    let error = iterator.try_next().unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("ZeroDivisionError"));
        }
        other => panic!("expected a guest exception, got {other}"),
    }
}

#[test]
fn test_non_iterable_is_an_error() {
    let Some(_guest) = common::acquire() else { return };

    let number = 5i64.to_python();
    assert!(number.try_iter().is_err());
}

#[test]
fn test_len_and_hash() {
    let Some(guest) = common::acquire() else { return };

    let list = guest.eval("[1, 2, 3]");
    assert_eq!(list.len(), 3);
    assert!(list.try_len().is_ok());
    // Length on a non-sized object is an error, not an absence.
    assert!(5i64.to_python().try_len().is_err());

    let text = "hash me".to_python();
    let first = text.hash_value();
    let second = text.hash_value();
    assert_eq!(first, second);

    // An unhashable object is fatal at the point of hashing.
    let unhashable = guest.eval("[]");
    let outcome = catch_unwind(AssertUnwindSafe(|| unhashable.hash_value()));
    assert!(outcome.is_err());
}

#[test]
fn test_reference_count_balance() {
    let Some(guest) = common::acquire() else { return };

    let value = guest.eval("[1, 2, 3]");
    let baseline = value.reference_count();

    for _ in 0..8 {
        let _ = value.len();
        let _ = value.str_value();
        let element = value.item(0i64);
        let _ = i64::from_python(&element);
        drop(element);
        let doubled = value.try_add(&value).unwrap();
        drop(doubled);
        let _ = value.iter().count();
        let _ = Vec::<i64>::from_python(&value);
        let _ = value.compare(&value, CompareOp::Eq);
    }
    assert_eq!(value.reference_count(), baseline);

    // One extra live handle is exactly one extra count.
    let second = unsafe { PythonObject::from_borrowed_ptr(value.borrowed_ptr()) };
    assert_eq!(value.reference_count(), baseline + 1);
    drop(second);
    assert_eq!(value.reference_count(), baseline);
}

#[test]
fn test_str_and_repr() {
    let Some(guest) = common::acquire() else { return };

    let list = guest.eval("[1, 2, 3]");
    assert_eq!(list.str_value(), "[1, 2, 3]");
    assert_eq!(list.repr_value(), "[1, 2, 3]");
    assert_eq!("x".to_python().repr_value(), "'x'");
    assert_eq!(format!("{list}"), "[1, 2, 3]");
}

#[test]
fn test_predicates() {
    let Some(guest) = common::acquire() else { return };

    assert!(guest.python.none().is_none());
    assert!(!1i64.to_python().is_none());
    assert!(guest.python.get("len").is_callable());
    assert!(!1i64.to_python().is_callable());
    assert!(1i64.to_python().is_truthy());
    assert!(!0i64.to_python().is_truthy());
    assert!(!guest.eval("[]").is_truthy());
}
