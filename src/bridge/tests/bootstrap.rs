//! Bootstrap tests, each with its own embedding state

use crate::bridge::bootstrap::{Bootstrap, HOST_GONE};
use crate::bridge::embedding::{Embedding, EmbeddingError, EmbeddingState, GuestPhase};
use crate::bridge::error::BridgeError;
use crate::bridge::{BOUNDARY_MARKER, PACKAGE_NAME};
use crate::runtime::command::{CmdError, CommandInterp};
use crate::runtime::object::ObjectVm;
use crate::runtime::{GuestRuntime, Side};
use crate::util::config::BridgeConfig;

fn fresh_embedding() -> &'static Embedding {
    Box::leak(Box::new(Embedding::new()))
}

fn bootstrap(config: BridgeConfig) -> Bootstrap {
    Bootstrap::with_embedding(fresh_embedding(), config)
}

fn eval(
    interp: &CommandInterp,
    script: &str,
) -> String {
    interp
        .eval(script)
        .unwrap_or_else(|e| panic!("{} failed: {}", script, e))
        .as_string()
}

// ============================================================================
// Command runtime as host
// ============================================================================

#[test]
fn test_command_host_registers_command_and_package() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();

    assert!(interp.has_command("guest"));
    assert_eq!(interp.package_present(PACKAGE_NAME).as_deref(), Some(crate::VERSION));
    assert_eq!(
        b.embedding().state(),
        EmbeddingState::HostedBy {
            host: Side::Command,
            guest: GuestPhase::Running
        }
    );
    assert_eq!(eval(&interp, "guest eval {x = 6 * 7}"), "");
    let vm = b.guest().unwrap();
    let x = vm.get_attribute(&vm.main_module(), "x").unwrap();
    assert_eq!(x.repr(), "42");
}

#[test]
fn test_loading_twice_is_idempotent() {
    let config = BridgeConfig {
        guest_startup: Some("print('started')".into()),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    let commands = interp.command_names().len();
    b.load_into_command_host(&interp).unwrap();

    assert_eq!(interp.command_names().len(), commands);
    let vm = b.guest().unwrap();
    assert_eq!(vm.take_output(), "started\n");
}

#[test]
fn test_guest_failure_becomes_command_error() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();

    let err = interp.eval("guest call nothing.here").unwrap_err();
    let CmdError::Failed(message) = err else {
        panic!("unexpected error kind");
    };
    assert!(message.ends_with(BOUNDARY_MARKER));
    assert_eq!(eval(&interp, "guest eval 1"), "");
}

#[test]
fn test_usage_error_is_not_guest_formatted() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    let err = interp.eval("guest frob").unwrap_err();
    assert_eq!(
        err,
        CmdError::Failed("bad command \"frob\": must be call, eval, or import".into())
    );
}

#[test]
fn test_custom_command_name() {
    let config = BridgeConfig {
        command_name: "py".into(),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    assert!(interp.has_command("py"));
    assert!(!interp.has_command("guest"));
}

#[test]
fn test_values_cross_as_command_values() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    eval(
        &interp,
        "guest eval {def info():\n    return {'name': 'x', 'tags': [1, 2], 'ok': True}}",
    );
    assert_eq!(eval(&interp, "dict get [guest call info] name"), "x");
    assert_eq!(eval(&interp, "llength [dict get [guest call info] tags]"), "2");
    assert_eq!(eval(&interp, "dict get [guest call info] ok"), "1");
}

// ============================================================================
// Callback module
// ============================================================================

#[test]
fn test_guest_calls_back_into_host() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    eval(&interp, "set greeting hello");

    eval(&interp, "guest eval {import host}");
    eval(&interp, "guest eval {def ask(v):\n    return host.evaluate('set ' + v)}");
    assert_eq!(eval(&interp, "guest call ask greeting"), "hello");
}

#[test]
fn test_callback_error_raises_runtime_error() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    let err = interp
        .eval("guest eval {import host\nhost.evaluate('error nope')}")
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("RuntimeError: nope"), "{}", message);
    assert!(message.ends_with(BOUNDARY_MARKER));
}

#[test]
fn test_nested_round_trip() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    eval(&interp, "guest eval {import host\ndef inner():\n    return 'deep'}");
    eval(
        &interp,
        "guest eval {def outer():\n    return host.evaluate('guest call inner')}",
    );
    assert_eq!(eval(&interp, "guest call outer"), "deep");
}

#[test]
fn test_dropped_interpreter() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    drop(interp);

    let vm = b.guest().unwrap();
    assert!(vm.run_script("import host\nhost.evaluate('set x 1')").is_err());
    let exc = vm.take_exception().unwrap();
    assert_eq!(vm.display(&exc.value).unwrap(), HOST_GONE);
}

#[test]
fn test_reload_rebinds_callback_to_new_interpreter() {
    let b = bootstrap(BridgeConfig::default());
    let first = CommandInterp::new();
    b.load_into_command_host(&first).unwrap();
    let second = CommandInterp::new();
    b.load_into_command_host(&second).unwrap();
    second.set_global("who", "second".into());
    first.set_global("who", "first".into());

    assert!(second.has_command("guest"));
    eval(&second, "guest eval {import host\ndef who():\n    return host.evaluate('set who')}");
    assert_eq!(eval(&first, "guest call who"), "second");
}

#[test]
fn test_second_bootstrap_reuses_running_guest() {
    let embedding = fresh_embedding();
    let first = Bootstrap::with_embedding(embedding, BridgeConfig::default());
    let first_interp = CommandInterp::new();
    first.load_into_command_host(&first_interp).unwrap();
    eval(&first_interp, "guest eval {shared = 7}");

    let second = Bootstrap::with_embedding(embedding, BridgeConfig::default());
    let second_interp = CommandInterp::new();
    second.load_into_command_host(&second_interp).unwrap();
    eval(&second_interp, "guest eval {copy = shared + 1}");

    // both bootstraps drive the one VM started first
    let vm = first.guest().unwrap();
    let copy = vm.get_attribute(&vm.main_module(), "copy").unwrap();
    assert_eq!(copy.repr(), "8");
    assert_eq!(
        embedding.state(),
        EmbeddingState::HostedBy {
            host: Side::Command,
            guest: GuestPhase::Running
        }
    );
}

// ============================================================================
// Start-up
// ============================================================================

#[test]
fn test_startup_failure_rolls_back() {
    let embedding = fresh_embedding();
    let config = BridgeConfig {
        guest_startup: Some("raise ValueError('no config')".into()),
        ..BridgeConfig::default()
    };
    let b = Bootstrap::with_embedding(embedding, config);
    let interp = CommandInterp::new();
    let err = b.load_into_command_host(&interp).unwrap_err();
    let BridgeError::Startup(text) = &err else {
        panic!("unexpected error {:?}", err);
    };
    assert!(text.starts_with("ValueError: no config"));
    assert_eq!(embedding.state(), EmbeddingState::Unset);
    assert!(!interp.has_command("guest"));
    assert!(b.guest().is_none());
}

#[test]
fn test_startup_can_use_callback() {
    let config = BridgeConfig {
        guest_startup: Some("import host\nmarker = host.evaluate('set boot 1')".into()),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    let interp = CommandInterp::new();
    b.load_into_command_host(&interp).unwrap();
    assert_eq!(eval(&interp, "set boot"), "1");
    let vm = b.guest().unwrap();
    let marker = vm.get_attribute(&vm.main_module(), "marker").unwrap();
    assert_eq!(marker.as_str(), Some("1"));
}

#[test]
fn test_missing_guest_library() {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig {
        guest_library: Some(dir.path().join("libguest.so")),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    let err = b.load_into_command_host(&CommandInterp::new()).unwrap_err();
    assert!(matches!(err, BridgeError::GuestLibrary { .. }));
    assert_eq!(b.embedding().state(), EmbeddingState::Unset);
}

#[test]
fn test_invalid_guest_library() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("libguest.so");
    std::fs::write(&library, b"").unwrap();
    let config = BridgeConfig {
        guest_library: Some(library),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    let interp = CommandInterp::new();
    let err = b.load_into_command_host(&interp).unwrap_err();
    assert!(matches!(err, BridgeError::GuestLibrary { .. }));
    assert!(!interp.has_command("guest"));
    assert!(b.embedding().preloaded().is_none());
}

#[test]
fn test_guest_library_is_preloaded_once() {
    let Some(library) = super::system_library() else {
        return;
    };
    let config = BridgeConfig {
        guest_library: Some(library.clone()),
        ..BridgeConfig::default()
    };
    let b = bootstrap(config);
    b.load_into_command_host(&CommandInterp::new()).unwrap();
    assert_eq!(b.embedding().preloaded(), Some(library.as_path()));
}

// ============================================================================
// Package loading
// ============================================================================

#[test]
fn test_package_require_loads_bridge() {
    let b = bootstrap(BridgeConfig::default());
    let interp = CommandInterp::new();
    b.register_package_loader(&interp);
    assert!(!interp.has_command("guest"));
    assert_eq!(eval(&interp, "package require twinbridge"), crate::VERSION);
    assert!(interp.has_command("guest"));
    assert_eq!(eval(&interp, "package require twinbridge"), crate::VERSION);
}

// ============================================================================
// Object runtime as host
// ============================================================================

#[test]
fn test_object_host_path() {
    let b = bootstrap(BridgeConfig::default());
    let vm = ObjectVm::new();
    vm.run_script("count = 3").unwrap();
    let interp = b.load_into_object_host(&vm).unwrap();

    assert_eq!(
        b.embedding().state(),
        EmbeddingState::HostedBy {
            host: Side::Object,
            guest: GuestPhase::Running
        }
    );
    // the command side drives the very same VM
    assert!(vm.run_script("import host\nr = host.evaluate('expr {2 + 3}')").is_ok());
    let r = vm.get_attribute(&vm.main_module(), "r").unwrap();
    assert_eq!(r.as_str(), Some("5"));
    assert!(interp.eval("guest eval {count = count + 1}").is_ok());
    let count = vm.get_attribute(&vm.main_module(), "count").unwrap();
    assert_eq!(count.repr(), "4");
}

#[test]
fn test_object_host_reuse_returns_same_interp() {
    let b = bootstrap(BridgeConfig::default());
    let vm = ObjectVm::new();
    let first = b.load_into_object_host(&vm).unwrap();
    let second = b.load_into_object_host(&vm).unwrap();
    assert!(first.same(&second));
}

#[test]
fn test_other_direction_after_bootstrap_is_rejected() {
    let b = bootstrap(BridgeConfig::default());
    b.load_into_command_host(&CommandInterp::new()).unwrap();
    let err = b.load_into_object_host(&ObjectVm::new()).unwrap_err();
    assert_eq!(
        err,
        BridgeError::Embedding(EmbeddingError::Conflict {
            host: Side::Command,
            requested: Side::Object
        })
    );
}
