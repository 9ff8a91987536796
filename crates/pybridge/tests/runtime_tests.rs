//! End-to-end scenarios: interface construction, imports, error triage and
//! the call adapter's keyword handling against a live interpreter.

mod common;

use pybridge::{FromPython, PythonError, ToPython};

#[test]
fn test_interface_reports_interpreter_identity() {
    let Some(guest) = common::acquire() else { return };

    let info = guest.python.version_info();
    assert!(info.major >= 2);
    assert!(!guest.python.version().is_empty());
}

#[test]
fn test_list_scenario() {
    let Some(_guest) = common::acquire() else { return };

    let list = vec![1i64, 2, 3].to_python();
    assert_eq!(list.len(), 3);
    assert_eq!(list.str_value(), "[1, 2, 3]");
}

#[test]
fn test_dictionary_scenario() {
    let Some(guest) = common::acquire() else { return };

    // Mixed key types, built through the dispatch surface.
    let table = guest.python.get("dict").call(&[]);
    table.set_item("a", 1i64);
    table.set_item(1i64, 0.5f64);

    assert_eq!(i64::from_python(&table.item("a")), Some(1));
    assert_eq!(f64::from_python(&table.item(1i64)), Some(0.5));

    table.set_item("b", "c");
    assert_eq!(String::from_python(&table.item("b")).as_deref(), Some("c"));

    // Absent-assignment deletes.
    table.set_subscript(&["b".to_python()], None);
    assert!(table.item_opt("b").is_none());
}

#[test]
fn test_zero_division_through_throwing_surface() {
    let Some(guest) = common::acquire() else { return };

    let divide = guest.eval("lambda a, b: a / b");
    let error = divide
        .try_call(&[1i64.to_python(), 0i64.to_python()])
        .unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("ZeroDivisionError"));
        }
        other => panic!("expected ZeroDivisionError, got {other}"),
    }
}

#[test]
fn test_exception_triage_order() {
    let Some(guest) = common::acquire() else { return };

    // Non-callable receiver, no guest exception involved: invalid call.
    let number = 5i64.to_python();
    match number.try_call(&[]) {
        Err(PythonError::InvalidCall { .. }) => {}
        other => panic!("expected InvalidCall, got {other:?}"),
    }

    // A callable that raises reflects the raised value, never InvalidCall.
    let raiser = guest.eval("lambda: 1 / 0");
    match raiser.try_call(&[]) {
        Err(PythonError::Exception { value, .. }) => {
            assert_eq!(value.class_name().as_deref(), Some("ZeroDivisionError"));
        }
        other => panic!("expected the guest exception, got {other:?}"),
    }
}

#[test]
fn test_import_missing_module_is_invalid_module() {
    let Some(guest) = common::acquire() else { return };

    let error = guest
        .python
        .attempt_import("pybridge_surely_missing_module")
        .unwrap_err();
    match error {
        PythonError::InvalidModule { name } => {
            assert_eq!(name, "pybridge_surely_missing_module");
        }
        other => panic!("expected InvalidModule, got {other}"),
    }
}

#[test]
fn test_import_existing_module() {
    let Some(guest) = common::acquire() else { return };

    let math = guest.python.import("math");
    let pi = f64::from_python(&math.attr("pi")).unwrap();
    assert!((pi - std::f64::consts::PI).abs() < 1e-12);

    let sqrt = math.attr("sqrt");
    assert_eq!(f64::from_python(&sqrt.call(&[81i64.to_python()])), Some(9.0));
}

#[test]
fn test_keyword_positional_split_preserves_order() {
    let Some(guest) = common::acquire() else { return };

    let probe = guest.eval("lambda *args, **kwargs: (list(args), sorted(kwargs.items()))");
    let result = probe
        .try_call_with_keywords(&[
            ("", 1i64.to_python()),
            ("x", 10i64.to_python()),
            ("", 2i64.to_python()),
            ("y", 20i64.to_python()),
            ("", 3i64.to_python()),
        ])
        .unwrap();

    assert_eq!(
        result.str_value(),
        "([1, 2, 3], [('x', 10), ('y', 20)])"
    );
}

#[test]
fn test_run_executes_in_main_namespace() {
    let Some(guest) = common::acquire() else { return };

    guest
        .python
        .run("import sys\nsys.pybridge_probe = 41 + 1")
        .unwrap();
    let sys = guest.python.import("sys");
    assert_eq!(i64::from_python(&sys.attr("pybridge_probe")), Some(42));
}

#[test]
fn test_startup_fixup_sets_argv() {
    let Some(guest) = common::acquire() else { return };

    let sys = guest.python.import("sys");
    let argv = sys.attr("argv");
    assert!(argv.len() >= 1);
}

#[test]
fn test_builtin_lookup_surfaces() {
    let Some(guest) = common::acquire() else { return };

    assert!(guest.python.get_opt("len").is_some());
    assert!(guest.python.get_opt("no_such_builtin").is_none());

    let names = guest.python.dir(guest.python.builtins());
    assert!(names.iter().any(|name| name == "len"));
}
