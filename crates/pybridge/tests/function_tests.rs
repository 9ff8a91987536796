//! Host-callable bridge tests: calling conventions, error reflection back
//! into the guest, panic containment and eager release.

mod common;

use pybridge::{FromPython, PythonError, PythonFunction, PythonResult, PythonObject, ToPython};

#[test]
fn test_doubling_closure_mapped_over_guest_list() {
    let Some(guest) = common::acquire() else { return };

    let double = PythonFunction::from_arguments(|arguments| {
        let input = i64::from_python(&arguments[0]).expect("integer argument");
        Ok((input * 2).to_python())
    });

    let list = guest.eval("[-1, 20, 8]");
    let mapped = guest
        .python
        .get("map")
        .call(&[double.object().clone(), list]);
    let collected = guest.python.get("list").call(&[mapped]);
    assert_eq!(Vec::<i64>::from_python(&collected), Some(vec![-2, 40, 16]));
}

#[test]
fn test_tuple_convention_receives_whole_tuple() {
    let Some(_guest) = common::acquire() else { return };

    let arity = PythonFunction::new(|arguments: PythonObject| {
        Ok((arguments.len() as i64).to_python())
    });
    let result = arity
        .object()
        .call(&[1i64.to_python(), 2i64.to_python(), 3i64.to_python()]);
    assert_eq!(i64::from_python(&result), Some(3));
}

#[test]
fn test_keyword_convention_receives_split_arguments() {
    let Some(_guest) = common::acquire() else { return };

    let probe = PythonFunction::with_keywords(|arguments, keywords| {
        let positional: Vec<i64> = arguments
            .iter()
            .map(|a| i64::from_python(a).expect("integer positional"))
            .collect();
        let rendered: Vec<String> = keywords
            .iter()
            .map(|(name, value)| {
                format!("{name}={}", i64::from_python(value).expect("integer keyword"))
            })
            .collect();
        Ok(format!("{positional:?} {rendered:?}").to_python())
    });

    let result = probe
        .object()
        .try_call_with_keywords(&[
            ("", 1i64.to_python()),
            ("a", 2i64.to_python()),
            ("", 3i64.to_python()),
            ("b", 4i64.to_python()),
        ])
        .unwrap();
    assert_eq!(
        String::from_python(&result).as_deref(),
        Some("[1, 3] [\"a=2\", \"b=4\"]")
    );
}

#[test]
fn test_host_error_wrapping_guest_exception_is_reraised_exactly() {
    let Some(guest) = common::acquire() else { return };

    let exception = guest.python.get("ValueError").call(&["boom".to_python()]);
    let raiser = PythonFunction::from_arguments(move |_arguments| -> PythonResult<PythonObject> {
        Err(PythonError::Exception {
            value: exception.clone(),
            traceback: None,
        })
    });

    let error = raiser.object().try_call(&[]).unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("ValueError"));
            assert_eq!(value.str_value(), "boom");
        }
        other => panic!("expected the re-raised guest exception, got {other}"),
    }
}

#[test]
fn test_generic_host_error_becomes_runtime_error() {
    let Some(_guest) = common::acquire() else { return };

    let failing = PythonFunction::from_arguments(|arguments| {
        Err(PythonError::InvalidCall {
            receiver: arguments[0].clone(),
        })
    });

    let error = failing.object().try_call(&[1i64.to_python()]).unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("RuntimeError"));
        }
        other => panic!("expected a wrapped RuntimeError, got {other}"),
    }
}

#[test]
fn test_host_panic_becomes_runtime_error() {
    let Some(_guest) = common::acquire() else { return };

    let panicking =
        PythonFunction::from_arguments(|_arguments| -> PythonResult<PythonObject> {
            panic!("closure exploded")
        });

    let error = panicking.object().try_call(&[]).unwrap_err();
    match error {
        PythonError::Exception { value, .. } => {
            assert_eq!(value.class_name().as_deref(), Some("RuntimeError"));
            assert!(value.str_value().contains("closure exploded"));
        }
        other => panic!("expected a wrapped RuntimeError, got {other}"),
    }
}

#[test]
fn test_callable_from_guest_perspective() {
    let Some(guest) = common::acquire() else { return };

    let identity = PythonFunction::from_arguments(|arguments| Ok(arguments[0].clone()));
    assert!(identity.object().is_callable());

    // The guest can pass it around like any callable.
    let apply = guest.eval("lambda f, x: f(x)");
    let result = apply.call(&[identity.object().clone(), 9i64.to_python()]);
    assert_eq!(i64::from_python(&result), Some(9));
}

#[test]
fn test_eager_release() {
    let Some(_guest) = common::acquire() else { return };

    let function = PythonFunction::from_arguments(|_arguments| Ok(0i64.to_python()));
    // Caller asserts the guest holds no references; eager reclamation.
    function.release();
}
