//! Stdio JSON-RPC 2.0 client for the Build Server Protocol.
//!
//! Requests use standard BSP framing (`Content-Length` headers) over blocking
//! I/O and are issued strictly sequentially: each call suspends the calling
//! thread until the matching response arrives. Callers are expected to run on
//! a worker, not on the editor's interaction thread. A dedicated reader
//! thread decodes incoming messages and routes server-push notifications to a
//! [`BuildClientListener`] as they arrive.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    BuildClientCapabilities, CompileParams, CompileResult, DependencyModulesParams,
    DependencyModulesResult, DidChangeBuildTarget, InitializeBuildParams, InitializeBuildResult,
    LogMessageParams, OutputPathsParams, OutputPathsResult, PublishDiagnosticsParams,
    ResourcesParams, ResourcesResult, ShowMessageParams, SourcesParams, SourcesResult,
    TaskFinishParams, TaskProgressParams, TaskStartParams, WorkspaceBuildTargetsResult,
};

const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// JSON-RPC error payload returned by build servers.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("build server error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum BspError {
    #[error("failed to spawn build server `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Uri(#[from] girder_core::UriError),

    #[error("build server connection closed")]
    Disconnected,

    #[error("build server request `{method}` timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("build server message too large: {len} bytes (limit {limit})")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("build server protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Receiver for notifications pushed by the build server.
///
/// Callbacks run on the client's reader thread, in receipt order. Default
/// bodies drop the notification.
pub trait BuildClientListener: Send + Sync {
    fn on_publish_diagnostics(&self, _params: PublishDiagnosticsParams) {}
    fn on_log_message(&self, _params: LogMessageParams) {}
    fn on_show_message(&self, _params: ShowMessageParams) {}
    fn on_task_start(&self, _params: TaskStartParams) {}
    fn on_task_progress(&self, _params: TaskProgressParams) {}
    fn on_task_finish(&self, _params: TaskFinishParams) {}
    fn on_build_target_did_change(&self, _params: DidChangeBuildTarget) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl BuildClientListener for NoopListener {}

/// The request surface consumed by project synchronization.
///
/// [`BspClient`] is the production implementation; tests substitute fakes.
pub trait BuildServer: Send + Sync {
    fn workspace_reload(&self) -> Result<(), BspError>;
    fn workspace_build_targets(&self) -> Result<WorkspaceBuildTargetsResult, BspError>;
    fn build_target_sources(&self, params: SourcesParams) -> Result<SourcesResult, BspError>;
    fn build_target_resources(&self, params: ResourcesParams) -> Result<ResourcesResult, BspError>;
    fn build_target_output_paths(
        &self,
        params: OutputPathsParams,
    ) -> Result<OutputPathsResult, BspError>;
    fn build_target_dependency_modules(
        &self,
        params: DependencyModulesParams,
    ) -> Result<DependencyModulesResult, BspError>;
    fn build_target_compile(&self, params: CompileParams) -> Result<CompileResult, BspError>;
}

#[derive(Debug, Clone)]
pub struct BspClientConfig {
    /// Wall-clock bound for a single request. `None` means wait forever;
    /// a wedged build server then stalls the calling worker.
    pub request_timeout: Option<Duration>,
    pub max_message_bytes: usize,
}

impl Default for BspClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

pub struct BspClient {
    child: Option<Child>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    responses: Mutex<mpsc::Receiver<Value>>,
    next_id: AtomicI64,
    config: BspClientConfig,
    reader: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for BspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BspClient")
            .field("has_child", &self.child.is_some())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl BspClient {
    /// Spawn a build server process with `cwd` as working directory.
    ///
    /// Most build tools expect to be launched from the workspace root so they
    /// can find their own configuration and caches.
    pub fn spawn_in_dir(
        program: &str,
        args: &[String],
        cwd: &Path,
        listener: Arc<dyn BuildClientListener>,
    ) -> Result<Self, BspError> {
        Self::spawn_with_config(program, args, cwd, listener, BspClientConfig::default())
    }

    pub fn spawn_with_config(
        program: &str,
        args: &[String],
        cwd: &Path,
        listener: Arc<dyn BuildClientListener>,
        config: BspClientConfig,
    ) -> Result<Self, BspError> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| BspError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BspError::Protocol("build server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BspError::Protocol("build server stdout unavailable".into()))?;

        let mut client = Self::from_parts(Box::new(stdout), Box::new(stdin), listener, config);
        client.child = Some(child);
        Ok(client)
    }

    /// Spawn the server and run the `build/initialize` handshake for `root`.
    pub fn connect(
        program: &str,
        args: &[String],
        root: &Path,
        listener: Arc<dyn BuildClientListener>,
    ) -> Result<Self, BspError> {
        let client = Self::spawn_in_dir(program, args, root, listener)?;
        let root_uri = girder_core::path_to_file_uri(root)?;
        client.initialize(InitializeBuildParams {
            display_name: "girder".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bsp_version: "2.1.0".to_string(),
            root_uri,
            capabilities: BuildClientCapabilities {
                language_ids: vec!["java".to_string()],
            },
        })?;
        client.initialized()?;
        Ok(client)
    }

    /// Build a client over arbitrary streams. Used by tests.
    pub fn from_streams<R, W>(
        read: R,
        write: W,
        listener: Arc<dyn BuildClientListener>,
        config: BspClientConfig,
    ) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::from_parts(Box::new(read), Box::new(write), listener, config)
    }

    fn from_parts(
        read: Box<dyn Read + Send>,
        write: Box<dyn Write + Send>,
        listener: Arc<dyn BuildClientListener>,
        config: BspClientConfig,
    ) -> Self {
        let writer: Arc<Mutex<Box<dyn Write + Send>>> = Arc::new(Mutex::new(write));
        let (responses_tx, responses_rx) = mpsc::channel();
        let reader = {
            let writer = Arc::clone(&writer);
            let max_message_bytes = config.max_message_bytes;
            thread::spawn(move || reader_loop(read, writer, listener, responses_tx, max_message_bytes))
        };
        Self {
            child: None,
            writer,
            responses: Mutex::new(responses_rx),
            next_id: AtomicI64::new(1),
            config,
            reader: Some(reader),
        }
    }

    pub fn initialize(
        &self,
        params: InitializeBuildParams,
    ) -> Result<InitializeBuildResult, BspError> {
        self.request("build/initialize", params)
    }

    pub fn initialized(&self) -> Result<(), BspError> {
        self.notify("build/initialized", Value::Null)
    }

    pub fn shutdown(&self) -> Result<(), BspError> {
        self.request::<_, Value>("build/shutdown", Value::Null)
            .map(|_| ())
    }

    pub fn exit(&self) -> Result<(), BspError> {
        self.notify("build/exit", Value::Null)
    }

    fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, BspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        {
            let mut writer = self.writer.lock().map_err(|_| BspError::Disconnected)?;
            write_message(&mut **writer, &message)?;
        }

        let responses = self.responses.lock().map_err(|_| BspError::Disconnected)?;
        loop {
            let incoming = match self.config.request_timeout {
                Some(timeout) => responses.recv_timeout(timeout).map_err(|err| match err {
                    mpsc::RecvTimeoutError::Timeout => BspError::Timeout {
                        method: method.to_string(),
                        timeout,
                    },
                    mpsc::RecvTimeoutError::Disconnected => BspError::Disconnected,
                })?,
                None => responses.recv().map_err(|_| BspError::Disconnected)?,
            };

            if incoming.get("id").and_then(Value::as_i64) != Some(id) {
                // A response we no longer wait for; drop it.
                continue;
            }
            if let Some(error) = incoming.get("error") {
                if let Ok(parsed) = serde_json::from_value::<RpcError>(error.clone()) {
                    return Err(BspError::Rpc(parsed));
                }
                return Err(BspError::Protocol(format!("error response: {error}")));
            }
            let result = incoming.get("result").cloned().unwrap_or(Value::Null);
            return Ok(serde_json::from_value(result)?);
        }
    }

    fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), BspError> {
        let message = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        let mut writer = self.writer.lock().map_err(|_| BspError::Disconnected)?;
        Ok(write_message(&mut **writer, &message)?)
    }
}

impl BuildServer for BspClient {
    fn workspace_reload(&self) -> Result<(), BspError> {
        self.request::<_, Value>("workspace/reload", Value::Null)
            .map(|_| ())
    }

    fn workspace_build_targets(&self) -> Result<WorkspaceBuildTargetsResult, BspError> {
        self.request("workspace/buildTargets", Value::Null)
    }

    fn build_target_sources(&self, params: SourcesParams) -> Result<SourcesResult, BspError> {
        self.request("buildTarget/sources", params)
    }

    fn build_target_resources(&self, params: ResourcesParams) -> Result<ResourcesResult, BspError> {
        self.request("buildTarget/resources", params)
    }

    fn build_target_output_paths(
        &self,
        params: OutputPathsParams,
    ) -> Result<OutputPathsResult, BspError> {
        self.request("buildTarget/outputPaths", params)
    }

    fn build_target_dependency_modules(
        &self,
        params: DependencyModulesParams,
    ) -> Result<DependencyModulesResult, BspError> {
        self.request("buildTarget/dependencyModules", params)
    }

    fn build_target_compile(&self, params: CompileParams) -> Result<CompileResult, BspError> {
        self.request("buildTarget/compile", params)
    }
}

impl Drop for BspClient {
    fn drop(&mut self) {
        // Best-effort goodbye; errors are moot, the process is reaped below.
        let _ = self.notify("build/exit", Value::Null);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn reader_loop(
    read: Box<dyn Read + Send>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    listener: Arc<dyn BuildClientListener>,
    responses: mpsc::Sender<Value>,
    max_message_bytes: usize,
) {
    let mut reader = BufReader::new(read);
    loop {
        let message = match read_message(&mut reader, max_message_bytes) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "closing build server connection");
                break;
            }
        };

        let method = message.get("method").and_then(Value::as_str);
        match (method, message.get("id")) {
            (Some(method), Some(id)) => {
                // No server-to-client request surface; answer so the server
                // does not block waiting for us.
                let reply = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id.clone(),
                    "error": {
                        "code": -32601,
                        "message": format!("method not supported: {method}"),
                    }
                });
                if let Ok(mut writer) = writer.lock() {
                    let _ = write_message(&mut **writer, &reply);
                }
            }
            (Some(method), None) => {
                dispatch_notification(&*listener, method, message.get("params"));
            }
            (None, Some(_)) => {
                let _ = responses.send(message);
            }
            (None, None) => {
                tracing::warn!("ignoring message with neither method nor id");
            }
        }
    }
}

fn dispatch_notification(listener: &dyn BuildClientListener, method: &str, params: Option<&Value>) {
    fn parse<T: DeserializeOwned>(method: &str, params: Option<&Value>) -> Option<T> {
        let params = params.cloned().unwrap_or(Value::Null);
        match serde_json::from_value(params) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                tracing::warn!(method, error = %err, "dropping malformed notification");
                None
            }
        }
    }

    match method {
        "build/publishDiagnostics" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_publish_diagnostics(parsed);
            }
        }
        "build/logMessage" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_log_message(parsed);
            }
        }
        "build/showMessage" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_show_message(parsed);
            }
        }
        "build/taskStart" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_task_start(parsed);
            }
        }
        "build/taskProgress" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_task_progress(parsed);
            }
        }
        "build/taskFinish" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_task_finish(parsed);
            }
        }
        "buildTarget/didChange" => {
            if let Some(parsed) = parse(method, params) {
                listener.on_build_target_did_change(parsed);
            }
        }
        _ => tracing::debug!(method, "ignoring unknown notification"),
    }
}

pub(crate) fn write_message(writer: &mut dyn Write, message: &Value) -> std::io::Result<()> {
    let body = serde_json::to_vec(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()
}

fn read_message(
    reader: &mut impl BufRead,
    max_message_bytes: usize,
) -> Result<Option<Value>, BspError> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(BspError::Disconnected)
            };
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                content_length = Some(value.parse::<usize>().map_err(|_| {
                    BspError::Protocol(format!("invalid Content-Length `{value}`"))
                })?);
            }
        }
    }

    let len =
        content_length.ok_or_else(|| BspError::Protocol("missing Content-Length header".into()))?;
    if len > max_message_bytes {
        return Err(BspError::MessageTooLarge {
            len,
            limit: max_message_bytes,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl SharedWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        logs: Mutex<Vec<String>>,
        diagnostics: Mutex<Vec<PublishDiagnosticsParams>>,
    }

    impl BuildClientListener for RecordingListener {
        fn on_publish_diagnostics(&self, params: PublishDiagnosticsParams) {
            self.diagnostics.lock().unwrap().push(params);
        }

        fn on_log_message(&self, params: LogMessageParams) {
            self.logs.lock().unwrap().push(params.message);
        }
    }

    fn frame(message: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        write_message(&mut out, message).unwrap();
        out
    }

    fn scripted_client(
        script: Vec<u8>,
        listener: Arc<RecordingListener>,
        config: BspClientConfig,
    ) -> (BspClient, SharedWriter) {
        let writer = SharedWriter::default();
        let client = BspClient::from_streams(Cursor::new(script), writer.clone(), listener, config);
        (client, writer)
    }

    #[test]
    fn request_gets_response_and_notifications_reach_listener() {
        let mut script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "build/logMessage",
            "params": { "type": 4, "message": "resolving" }
        }));
        script.extend(frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "targets": [] }
        })));

        let listener = Arc::new(RecordingListener::default());
        let (client, _writer) =
            scripted_client(script, Arc::clone(&listener), BspClientConfig::default());

        let result = client.workspace_build_targets().unwrap();
        assert!(result.targets.is_empty());
        assert_eq!(*listener.logs.lock().unwrap(), vec!["resolving".to_string()]);
    }

    #[test]
    fn stale_response_ids_are_skipped() {
        let mut script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 99,
            "result": { "targets": [{ "id": { "uri": "build://stale" } }] }
        }));
        script.extend(frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "targets": [] }
        })));

        let listener = Arc::new(RecordingListener::default());
        let (client, _writer) =
            scripted_client(script, listener, BspClientConfig::default());

        let result = client.workspace_build_targets().unwrap();
        assert!(result.targets.is_empty());
    }

    #[test]
    fn rpc_errors_surface_with_code_and_message() {
        let script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32002, "message": "server not initialized" }
        }));

        let listener = Arc::new(RecordingListener::default());
        let (client, _writer) =
            scripted_client(script, listener, BspClientConfig::default());

        let err = client.workspace_reload().unwrap_err();
        match err {
            BspError::Rpc(rpc) => {
                assert_eq!(rpc.code, -32002);
                assert_eq!(rpc.message, "server not initialized");
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn closed_stream_reports_disconnected() {
        let listener = Arc::new(RecordingListener::default());
        let (client, _writer) =
            scripted_client(Vec::new(), listener, BspClientConfig::default());

        assert!(matches!(
            client.workspace_reload().unwrap_err(),
            BspError::Disconnected
        ));
    }

    #[test]
    fn oversized_message_closes_the_connection() {
        let script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "targets": [] }
        }));

        let listener = Arc::new(RecordingListener::default());
        let config = BspClientConfig {
            max_message_bytes: 8,
            ..BspClientConfig::default()
        };
        let (client, _writer) = scripted_client(script, listener, config);

        assert!(matches!(
            client.workspace_reload().unwrap_err(),
            BspError::Disconnected
        ));
    }

    #[test]
    fn server_side_requests_are_answered_with_method_not_supported() {
        let mut script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "workspace/unregisterCapability",
            "params": {}
        }));
        script.extend(frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "targets": [] }
        })));

        let listener = Arc::new(RecordingListener::default());
        let (client, writer) =
            scripted_client(script, listener, BspClientConfig::default());

        client.workspace_build_targets().unwrap();
        assert!(writer.contents().contains("-32601"));
    }

    #[test]
    fn diagnostics_notification_is_routed_before_response() {
        let mut script = frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "build/publishDiagnostics",
            "params": {
                "textDocument": { "uri": "file:///work/app/Main.java" },
                "diagnostics": [{
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 1 }
                    },
                    "severity": 2,
                    "message": "boom"
                }]
            }
        }));
        script.extend(frame(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "originId": null, "statusCode": 2 }
        })));

        let listener = Arc::new(RecordingListener::default());
        let (client, _writer) =
            scripted_client(script, Arc::clone(&listener), BspClientConfig::default());

        let result = client
            .build_target_compile(CompileParams {
                targets: Vec::new(),
                origin_id: None,
            })
            .unwrap();
        assert_eq!(result.status_code, 2);

        let diagnostics = listener.diagnostics.lock().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostics[0].message, "boom");
    }
}
