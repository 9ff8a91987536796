//! Conversion protocol tests: round trips for representative and boundary
//! values, and the non-fatal failure contract (absence, guest error state
//! cleared).

mod common;

use std::collections::HashMap;

use pybridge::{FromPython, PythonObject, ToPython};

#[test]
fn test_bool_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    for value in [true, false] {
        let object = value.to_python();
        assert_eq!(bool::from_python(&object), Some(value));
    }
}

#[test]
fn test_bool_is_strict() {
    let Some(_guest) = common::acquire() else { return };

    // A guest integer is not a host bool.
    assert_eq!(bool::from_python(&1i64.to_python()), None);
    assert_eq!(bool::from_python(&0i64.to_python()), None);
}

#[test]
fn test_signed_integer_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    for value in [0i64, -1, 1, i64::MIN, i64::MAX] {
        let object = value.to_python();
        assert_eq!(i64::from_python(&object), Some(value));
    }
    for value in [i32::MIN, -1, 0, i32::MAX] {
        let object = value.to_python();
        assert_eq!(i32::from_python(&object), Some(value));
    }
    for value in [i8::MIN, 0, i8::MAX] {
        let object = value.to_python();
        assert_eq!(i8::from_python(&object), Some(value));
    }
}

#[test]
fn test_unsigned_integer_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    for value in [0u64, 1, u64::MAX] {
        let object = value.to_python();
        assert_eq!(u64::from_python(&object), Some(value));
    }
    for value in [0u8, u8::MAX] {
        let object = value.to_python();
        assert_eq!(u8::from_python(&object), Some(value));
    }
}

#[test]
fn test_narrowing_out_of_range_is_absence() {
    let Some(_guest) = common::acquire() else { return };

    let wide = 300i64.to_python();
    assert_eq!(u8::from_python(&wide), None);
    assert_eq!(i8::from_python(&wide), None);
    // A negative value never fits an unsigned host type.
    assert_eq!(u64::from_python(&(-1i64).to_python()), None);
}

#[test]
fn test_float_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    for value in [0.0f64, -1.5, 3.5, f64::MAX] {
        let object = value.to_python();
        assert_eq!(f64::from_python(&object), Some(value));
    }
    // A guest int coerces to a host float.
    assert_eq!(f64::from_python(&7i64.to_python()), Some(7.0));
}

#[test]
fn test_string_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    for value in ["", "hello", "snake \u{1F40D}"] {
        let object = value.to_python();
        assert_eq!(String::from_python(&object).as_deref(), Some(value));
    }
}

#[test]
fn test_bytes_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    let buffer = b"ab\x00cd";
    let object = PythonObject::from_bytes(buffer);
    assert_eq!(object.to_byte_vec().as_deref(), Some(&buffer[..]));

    // A string is not a byte buffer.
    assert_eq!("text".to_python().to_byte_vec(), None);
}

#[test]
fn test_sequence_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    let values = vec![1i64, -2, 3];
    let object = values.to_python();
    assert_eq!(Vec::<i64>::from_python(&object), Some(values));

    let empty: Vec<i64> = Vec::new();
    let object = empty.to_python();
    assert_eq!(Vec::<i64>::from_python(&object), Some(Vec::new()));
}

#[test]
fn test_map_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    let mut entries = HashMap::new();
    entries.insert("one".to_string(), 1i64);
    entries.insert("two".to_string(), 2i64);
    let object = entries.to_python();
    assert_eq!(HashMap::<String, i64>::from_python(&object), Some(entries));

    let empty: HashMap<String, i64> = HashMap::new();
    assert_eq!(
        HashMap::<String, i64>::from_python(&empty.to_python()),
        Some(HashMap::new())
    );
}

#[test]
fn test_map_requires_dict() {
    let Some(_guest) = common::acquire() else { return };

    let list = vec![1i64].to_python();
    assert_eq!(HashMap::<String, i64>::from_python(&list), None);
}

#[test]
fn test_tuple_round_trip() {
    let Some(_guest) = common::acquire() else { return };

    let pair = (1i64, "two".to_string());
    let object = pair.to_python();
    assert_eq!(object.class_name().as_deref(), Some("tuple"));
    assert_eq!(<(i64, String)>::from_python(&object), Some(pair));

    let triple = (1i64, 2i64, 3i64);
    assert_eq!(<(i64, i64, i64)>::from_python(&triple.to_python()), Some(triple));

    // Arity mismatch is absence, not an error.
    assert_eq!(<(i64, i64)>::from_python(&triple.to_python()), None);
}

#[test]
fn test_option_round_trip() {
    let Some(guest) = common::acquire() else { return };

    let none: Option<i64> = None;
    let object = none.to_python();
    assert!(object.is_none());
    assert!(object.is_identical(guest.python.none()));
    assert_eq!(Option::<i64>::from_python(&object), Some(None));

    let some = Some(41i64);
    assert_eq!(Option::<i64>::from_python(&some.to_python()), Some(some));
}

#[test]
fn test_range_round_trip_and_subscript() {
    let Some(guest) = common::acquire() else { return };

    let range = 2i64..5i64;
    let slice = range.clone().to_python();
    assert_eq!(slice.class_name().as_deref(), Some("slice"));
    assert_eq!(std::ops::Range::<i64>::from_python(&slice), Some(range));

    let list = guest.eval("[0, 1, 2, 3, 4, 5]");
    let window = list.item(2i64..5i64);
    assert_eq!(Vec::<i64>::from_python(&window), Some(vec![2, 3, 4]));
}

#[test]
fn test_conversion_failure_is_non_fatal_and_clears_error() {
    let Some(guest) = common::acquire() else { return };

    let text = "not a number".to_python();
    assert_eq!(i64::from_python(&text), None);
    assert_eq!(f64::from_python(&text), None);

    // A subsequent unrelated operation must not observe a stale error.
    let length = guest.python.get("len").call(&[text]);
    assert_eq!(i64::from_python(&length), Some(12));
}
