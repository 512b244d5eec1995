//! End-to-end tests against the `fake_bsp_server` binary over real pipes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use girder_bsp::{
    BspClient, BspClientConfig, BspError, BuildClientListener, BuildServer, BuildTargetIdentifier,
    CompileParams, NoopListener, PublishDiagnosticsParams, SourcesParams, STATUS_OK, TAG_TEST,
};

const SERVER_EXE: &str = env!("CARGO_BIN_EXE_fake_bsp_server");

#[derive(Default)]
struct RecordingListener {
    diagnostics: Mutex<Vec<PublishDiagnosticsParams>>,
}

impl BuildClientListener for RecordingListener {
    fn on_publish_diagnostics(&self, params: PublishDiagnosticsParams) {
        self.diagnostics.lock().unwrap().push(params);
    }
}

fn base_dir_args(dir: &tempfile::TempDir) -> Vec<String> {
    vec!["--base-dir".to_string(), dir.path().display().to_string()]
}

#[test]
fn handshake_and_target_listing() {
    let dir = tempfile::tempdir().unwrap();
    let client = BspClient::connect(
        SERVER_EXE,
        &base_dir_args(&dir),
        dir.path(),
        Arc::new(NoopListener),
    )
    .unwrap();

    let result = client.workspace_build_targets().unwrap();
    assert_eq!(result.targets.len(), 2);
    assert!(!result.targets[0].is_test());
    assert!(result.targets[1].tags.iter().any(|tag| tag == TAG_TEST));

    let jvm = result.targets[0].jvm_data().unwrap();
    assert_eq!(jvm.target_bytecode_version.as_deref(), Some("17"));

    client.shutdown().unwrap();
}

#[test]
fn sources_are_scoped_to_the_requested_target() {
    let dir = tempfile::tempdir().unwrap();
    let client = BspClient::connect(
        SERVER_EXE,
        &base_dir_args(&dir),
        dir.path(),
        Arc::new(NoopListener),
    )
    .unwrap();

    let result = client
        .build_target_sources(SourcesParams {
            targets: vec![BuildTargetIdentifier {
                uri: "build://demo/test".to_string(),
            }],
        })
        .unwrap();
    assert_eq!(result.items.len(), 1);
    assert!(result.items[0].sources[0].uri.ends_with("src/test/java"));

    client.shutdown().unwrap();
}

#[test]
fn compile_reports_diagnostics_before_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let listener = Arc::new(RecordingListener::default());
    let client = BspClient::connect(
        SERVER_EXE,
        &base_dir_args(&dir),
        dir.path(),
        Arc::clone(&listener) as Arc<dyn BuildClientListener>,
    )
    .unwrap();

    let result = client
        .build_target_compile(CompileParams {
            targets: vec![BuildTargetIdentifier {
                uri: "build://demo/main".to_string(),
            }],
            origin_id: None,
        })
        .unwrap();
    assert_eq!(result.status_code, STATUS_OK);

    let diagnostics = listener.diagnostics.lock().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].diagnostics[0].message, "deprecated API");
    assert!(diagnostics[0].reset);

    client.shutdown().unwrap();
}

#[test]
fn request_timeout_fires_when_the_server_hangs() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = base_dir_args(&dir);
    args.extend([
        "--hang-method".to_string(),
        "workspace/buildTargets".to_string(),
    ]);

    let client = BspClient::spawn_with_config(
        SERVER_EXE,
        &args,
        dir.path(),
        Arc::new(NoopListener),
        BspClientConfig {
            request_timeout: Some(Duration::from_millis(200)),
            ..BspClientConfig::default()
        },
    )
    .unwrap();

    match client.workspace_build_targets().unwrap_err() {
        BspError::Timeout { method, .. } => assert_eq!(method, "workspace/buildTargets"),
        other => panic!("expected timeout, got {other:?}"),
    }
}
