//! Dynamic class construction tests: namespace members, instance-method
//! binding and inheritance through guest bases.

mod common;

use pybridge::{FromPython, Python, PythonClassBuilder, ToPython};

#[test]
fn test_class_with_members_and_methods() {
    let Some(guest) = common::acquire() else { return };
    if guest.python.version_info().major < 3 {
        eprintln!("skipping: instance methods require Python 3");
        return;
    }

    let class = PythonClassBuilder::new("Box")
        .member("kind", "container")
        .method("__init__", |arguments| {
            arguments[0].set_attr("value", arguments[1].clone());
            Ok(Python::shared().none().clone())
        })
        .method("doubled", |arguments| {
            let value = arguments[0].attr("value");
            value.try_add(&value)
        })
        .build();

    assert_eq!(String::from_python(&class.attr("__name__")).as_deref(), Some("Box"));

    let instance = class.call(&[21i64.to_python()]);
    assert_eq!(i64::from_python(&instance.attr("value")), Some(21));
    assert_eq!(
        String::from_python(&instance.attr("kind")).as_deref(),
        Some("container")
    );
    // The instance is bound as the first argument.
    assert_eq!(
        i64::from_python(&instance.call_method("doubled", &[])),
        Some(42)
    );
}

#[test]
fn test_class_with_guest_base() {
    let Some(guest) = common::acquire() else { return };
    if guest.python.version_info().major < 3 {
        eprintln!("skipping: instance methods require Python 3");
        return;
    }

    let base = guest.python.get("dict");
    let class = PythonClassBuilder::new("TaggedDict")
        .base(base)
        .member("tag", 7i64)
        .build();

    let instance = class.call(&[]);
    instance.set_item("k", 1i64);
    assert_eq!(i64::from_python(&instance.item("k")), Some(1));
    assert_eq!(i64::from_python(&instance.attr("tag")), Some(7));

    let isinstance = guest.python.get("isinstance");
    let verdict = isinstance.call(&[instance, guest.python.get("dict")]);
    assert_eq!(bool::from_python(&verdict), Some(true));
}
