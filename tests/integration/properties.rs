//! End-to-end behavior of the bridge command seen from the command runtime

use twinbridge::bridge::{Bootstrap, Embedding, BOUNDARY_MARKER};
use twinbridge::runtime::command::{CmdValue, CommandInterp};
use twinbridge::runtime::object::ModuleSource;
use twinbridge::util::config::BridgeConfig;

fn loaded() -> (Bootstrap, CommandInterp) {
    let embedding: &'static Embedding = Box::leak(Box::new(Embedding::new()));
    let bootstrap = Bootstrap::with_embedding(embedding, BridgeConfig::default());
    let interp = CommandInterp::new();
    bootstrap.load_into_command_host(&interp).unwrap();
    (bootstrap, interp)
}

#[test]
fn test_none_and_bools() {
    let (_b, interp) = loaded();
    interp
        .eval("guest eval {def nothing():\n    return None\ndef yes():\n    return True\ndef no():\n    return False}")
        .unwrap();
    assert_eq!(interp.eval("guest call nothing").unwrap(), CmdValue::Empty);
    assert_eq!(interp.eval("guest call yes").unwrap(), CmdValue::Boolean(true));
    assert_eq!(interp.eval("guest call no").unwrap(), CmdValue::Boolean(false));
}

#[test]
fn test_big_number_keeps_digits() {
    let (_b, interp) = loaded();
    interp
        .eval("guest eval {def big():\n    return 123456789012345678901234567890}")
        .unwrap();
    let value = interp.eval("guest call big").unwrap();
    assert_eq!(value.as_string(), "123456789012345678901234567890");
}

#[test]
fn test_mixed_sequence() {
    let (_b, interp) = loaded();
    interp
        .eval("guest eval {def mixed():\n    return [1, 'a', None]}")
        .unwrap();
    assert_eq!(interp.eval("llength [guest call mixed]").unwrap().as_string(), "3");
    assert_eq!(interp.eval("lindex [guest call mixed] 1").unwrap().as_string(), "a");
    assert_eq!(interp.eval("lindex [guest call mixed] 2").unwrap(), CmdValue::Empty);
}

#[test]
fn test_row_is_a_dict() {
    let (_b, interp) = loaded();
    interp
        .eval("guest eval {def row():\n    return Row({'id': 1, 'name': 'ada'})}")
        .unwrap();
    let value = interp.eval("guest call row").unwrap();
    let dict = value.as_dict().unwrap();
    assert_eq!(dict.get("name").map(CmdValue::as_string).as_deref(), Some("ada"));
}

#[test]
fn test_bytes_stay_bytes() {
    let (_b, interp) = loaded();
    interp
        .eval("guest eval {def raw():\n    return b'\\xff\\x00'}")
        .unwrap();
    assert_eq!(
        interp.eval("guest call raw").unwrap(),
        CmdValue::ByteArray(vec![0xff, 0x00])
    );
}

#[test]
fn test_call_needs_import() {
    let (b, interp) = loaded();
    b.guest().unwrap().register_module_source(
        "mod.sub",
        ModuleSource::Script("def fn(a, b):\n    return a + b".into()),
    );

    let err = interp.eval("guest call mod.sub.fn x y").unwrap_err().to_string();
    assert!(err.contains("\"mod\""));
    assert!(err.ends_with(BOUNDARY_MARKER));

    interp.eval("guest import mod.sub").unwrap();
    assert_eq!(
        interp.eval("guest call mod.sub.fn x y").unwrap().as_string(),
        "xy"
    );
}

#[test]
fn test_error_state_is_cleared() {
    let (_b, interp) = loaded();
    interp.eval("guest eval {value = 1}").unwrap();
    let err = interp.eval("guest call value").unwrap_err().to_string();
    assert!(err.ends_with(BOUNDARY_MARKER));
    assert!(interp.eval("guest eval 1").is_ok());
}

#[test]
fn test_catch_sees_the_message() {
    let (_b, interp) = loaded();
    let result = interp
        .eval("catch {guest eval {raise KeyError('missing')}} msg\nset msg")
        .unwrap()
        .as_string();
    assert!(result.starts_with("KeyError: missing\n"));
    assert!(result.ends_with(BOUNDARY_MARKER));
}
