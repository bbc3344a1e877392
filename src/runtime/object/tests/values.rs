//! Value representation and capability tests

use crate::runtime::object::value::{format_complex, format_float};
use crate::runtime::object::{Obj, ObjectVm};
use crate::runtime::GuestRuntime;

#[test]
fn test_float_text() {
    assert_eq!(format_float(3.0), "3.0");
    assert_eq!(format_float(0.1), "0.1");
    assert_eq!(format_float(f64::INFINITY), "inf");
    assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    assert_eq!(format_float(f64::NAN), "nan");
}

#[test]
fn test_float_text_switches_to_exponent() {
    assert_eq!(format_float(1e16), "1e+16");
    assert_eq!(format_float(1e-7), "1e-07");
    assert_eq!(format_float(-1.5e-5), "-1.5e-05");
    assert_eq!(format_float(1.2345e100), "1.2345e+100");
    assert_eq!(format_float(1e15), "1000000000000000.0");
    assert_eq!(format_float(0.0001), "0.0001");
    assert_eq!(format_complex(1e16, 1.0), "(1e+16+1j)");
}

#[test]
fn test_complex_text() {
    assert_eq!(format_complex(1.0, 2.0), "(1+2j)");
    assert_eq!(format_complex(0.0, 2.5), "2.5j");
    assert_eq!(format_complex(1.5, -1.0), "(1.5-1j)");
}

#[test]
fn test_repr_forms() {
    assert_eq!(Obj::none().repr(), "None");
    assert_eq!(Obj::bool(true).repr(), "True");
    assert_eq!(Obj::str("it's").repr(), "\"it's\"");
    assert_eq!(Obj::bytes(vec![0u8, b'a']).repr(), "b'\\x00a'");
    assert_eq!(Obj::tuple(vec![]).repr(), "()");
}

#[test]
fn test_capabilities() {
    let vm = ObjectVm::new();
    let text = Obj::str("ab");
    assert_eq!(vm.as_text(&text).as_deref(), Some("ab"));
    assert_eq!(vm.sequence_items(&text).unwrap().map(|v| v.len()), Some(2));
    assert!(vm.mapping_items(&text).unwrap().is_none());

    let flag = Obj::bool(true);
    assert_eq!(vm.as_bool(&flag), Some(true));
    assert_eq!(vm.number_text(&flag).unwrap().as_deref(), Some("True"));

    let dict = Obj::dict(vec![(Obj::str("k"), Obj::int(1))]).unwrap();
    assert!(vm.mapping_items(&dict).unwrap().is_some());
    assert!(vm.sequence_items(&dict).unwrap().is_none());
}

#[test]
fn test_unhashable_dict_key() {
    assert!(Obj::dict(vec![(Obj::list(vec![]), Obj::none())]).is_err());
}

#[test]
fn test_failing_str_hook_raises() {
    let vm = ObjectVm::new();
    let obj = Obj::instance("Sulky").failing_text("refuses").build();
    assert!(vm.display(&obj).is_err());
    let exc = vm.take_exception().unwrap();
    assert_eq!(vm.display(&exc.value).unwrap(), "refuses");
}

#[test]
fn test_numeric_keys_collapse() {
    let d = Obj::dict(vec![
        (Obj::int(1), Obj::str("int")),
        (Obj::float(1.0), Obj::str("float")),
    ])
    .unwrap();
    assert_eq!(d.repr(), "{1: 'float'}");
}
