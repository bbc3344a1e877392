//! Process-wide embedding and configuration

use std::fs;

use twinbridge::bridge::{
    Bootstrap, BridgeError, Embedding, EmbeddingError, EmbeddingState, GuestPhase, EMBEDDING,
};
use twinbridge::runtime::command::CommandInterp;
use twinbridge::runtime::object::ObjectVm;
use twinbridge::runtime::Side;
use twinbridge::util::config::BridgeConfig;
use twinbridge::Session;

// The only test in this binary that touches the process-wide state
#[test]
fn test_process_is_hosted_by_one_side() {
    let session = Session::start(BridgeConfig::default()).unwrap();
    assert_eq!(
        EMBEDDING.state(),
        EmbeddingState::HostedBy {
            host: Side::Command,
            guest: GuestPhase::Running
        }
    );

    session
        .eval("guest eval {def twice(x):\n    return int(x) * 2}")
        .unwrap();
    assert_eq!(session.eval("guest call twice 21").unwrap(), "42");
    let args: Vec<String> = ["call", "twice", "4"].iter().map(|s| s.to_string()).collect();
    assert_eq!(session.guest(&args).unwrap(), "8");

    session.eval("puts hello\nguest eval {print('from guest')}").unwrap();
    assert_eq!(session.take_output(), "hello\nfrom guest\n");

    // a second session on this thread shares the running guest
    let again = Session::start(BridgeConfig::default()).unwrap();
    assert_eq!(again.eval("guest call twice 5").unwrap(), "10");
    assert_eq!(session.eval("guest call twice 6").unwrap(), "12");

    let err = Bootstrap::new(BridgeConfig::default())
        .load_into_object_host(&ObjectVm::new())
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::Embedding(EmbeddingError::Conflict {
            host: Side::Command,
            requested: Side::Object,
        })
    );
}

#[test]
fn test_config_file_drives_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("twinbridge.ron");
    fs::write(
        &path,
        "(command_name: \"py\", guest_startup: Some(\"ready = 'yes'\"), max_depth: 4)",
    )
    .unwrap();
    let config = BridgeConfig::load(Some(&path)).unwrap();

    let embedding: &'static Embedding = Box::leak(Box::new(Embedding::new()));
    let bootstrap = Bootstrap::with_embedding(embedding, config);
    let interp = CommandInterp::new();
    bootstrap.load_into_command_host(&interp).unwrap();

    interp
        .eval("py eval {def ready_flag():\n    return ready\ndef deep():\n    return [[[[[1]]]]]}")
        .unwrap();
    assert_eq!(interp.eval("py call ready_flag").unwrap().as_string(), "yes");
    let err = interp.eval("py call deep").unwrap_err().to_string();
    assert!(err.starts_with("value nesting exceeds 4 levels"));
}
