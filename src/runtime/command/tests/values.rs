//! String forms of command values

use indexmap::IndexMap;

use crate::runtime::command::{format_list, parse_list, quote_element, CmdValue};

#[test]
fn test_scalar_string_forms() {
    assert_eq!(CmdValue::Empty.as_string(), "");
    assert_eq!(CmdValue::Boolean(true).as_string(), "1");
    assert_eq!(CmdValue::Boolean(false).as_string(), "0");
    assert_eq!(CmdValue::Number("1e400".into()).as_string(), "1e400");
}

#[test]
fn test_bytearray_is_not_decoded() {
    let value = CmdValue::ByteArray(vec![0xff, 0x00, b'a']);
    let chars: Vec<u32> = value.as_string().chars().map(u32::from).collect();
    assert_eq!(chars, vec![0xff, 0x00, 0x61]);
}

#[test]
fn test_list_quoting() {
    assert_eq!(quote_element(""), "{}");
    assert_eq!(quote_element("plain"), "plain");
    assert_eq!(quote_element("two words"), "{two words}");
    assert_eq!(quote_element("a{b"), "a\\{b");
    let list = CmdValue::List(vec![
        CmdValue::text("a"),
        CmdValue::Empty,
        CmdValue::text("b c"),
    ]);
    assert_eq!(list.as_string(), "a {} {b c}");
}

#[test]
fn test_parse_list_reads_back_quoted_elements() {
    let items = vec!["a b", "", "x{y", "back\\slash", "#hash", "q\"uote", "new\nline"];
    let text = format_list(&items);
    assert_eq!(parse_list(&text).unwrap(), items);
}

#[test]
fn test_parse_list_errors() {
    assert!(parse_list("{a b").is_err());
    assert!(parse_list("\"a b").is_err());
    assert!(parse_list("{a}b").is_err());
}

#[test]
fn test_dict_string_form_and_lookup() {
    let mut map = IndexMap::new();
    map.insert("k".to_string(), CmdValue::text("v 1"));
    map.insert("n".to_string(), CmdValue::int(2));
    let dict = CmdValue::Dict(map);
    assert_eq!(dict.as_string(), "k {v 1} n 2");
    let reread = CmdValue::text(dict.as_string()).as_dict().unwrap();
    assert_eq!(reread.get("k").map(|v| v.as_string()).as_deref(), Some("v 1"));
}

#[test]
fn test_boolean_and_integer_reading() {
    assert!(CmdValue::text("yes").as_bool().unwrap());
    assert!(!CmdValue::text("0").as_bool().unwrap());
    assert!(CmdValue::text("maybe").as_bool().is_err());
    assert_eq!(CmdValue::text(" 42 ").as_int().unwrap(), 42);
    assert!(CmdValue::text("4x").as_int().is_err());
}
