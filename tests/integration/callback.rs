//! The guest calling back into the command runtime

use twinbridge::bridge::{Bootstrap, Embedding};
use twinbridge::runtime::command::CommandInterp;
use twinbridge::runtime::object::ObjectVm;
use twinbridge::runtime::GuestRuntime;
use twinbridge::util::config::BridgeConfig;

fn embedding() -> &'static Embedding {
    Box::leak(Box::new(Embedding::new()))
}

#[test]
fn test_host_procs_are_reachable_from_guest() {
    let bootstrap = Bootstrap::with_embedding(embedding(), BridgeConfig::default());
    let interp = CommandInterp::new();
    bootstrap.load_into_command_host(&interp).unwrap();

    interp.eval("proc square {x} {expr {$x * $x}}").unwrap();
    interp
        .eval("guest eval {import host\ndef area(side):\n    return int(host.evaluate('square ' + side))}")
        .unwrap();
    assert_eq!(interp.eval("guest call area 7").unwrap().as_string(), "49");
}

#[test]
fn test_callback_module_name_is_configurable() {
    let config = BridgeConfig {
        callback_module: "tcl".into(),
        ..BridgeConfig::default()
    };
    let bootstrap = Bootstrap::with_embedding(embedding(), config);
    let interp = CommandInterp::new();
    bootstrap.load_into_command_host(&interp).unwrap();

    assert!(interp.eval("guest eval {import tcl}").is_ok());
    assert!(interp.eval("guest eval {import host}").is_err());
}

#[test]
fn test_object_host_round_trip() {
    let bootstrap = Bootstrap::with_embedding(embedding(), BridgeConfig::default());
    let vm = ObjectVm::new();
    vm.run_script("def shout(s):\n    return s + '!'").unwrap();
    let interp = bootstrap.load_into_object_host(&vm).unwrap();

    interp.eval("proc relay {s} {guest call shout $s}").unwrap();
    vm.run_script("import host\nout = host.evaluate('relay hey')").unwrap();
    let out = vm.get_attr(&vm.main_namespace(), "out").unwrap();
    assert_eq!(vm.as_text(&out).as_deref(), Some("hey!"));
}

#[test]
fn test_callback_errors_carry_host_message() {
    let bootstrap = Bootstrap::with_embedding(embedding(), BridgeConfig::default());
    let vm = ObjectVm::new();
    bootstrap.load_into_object_host(&vm).unwrap();

    assert!(vm.run_script("import host\nhost.evaluate('nosuchcommand')").is_err());
    let exc = vm.take_exception().unwrap();
    assert_eq!(
        vm.display(&exc.value).unwrap(),
        "invalid command name \"nosuchcommand\""
    );
    assert!(vm.run_script("import host\nhost.evaluate('set ok 1')").is_ok());
}
