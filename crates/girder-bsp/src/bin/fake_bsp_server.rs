//! Test-only BSP server used by integration tests.
//!
//! Implements just enough framing/JSON-RPC to play a Gradle-shaped build
//! server: a canned workspace with a main and a test target rooted at
//! `--base-dir`, plus a `--hang-method <METHOD>` mode for exercising request
//! timeouts.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn main() -> Result<()> {
    let mut base_dir: Option<PathBuf> = None;
    let mut hang_method: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--base-dir" => base_dir = args.next().map(PathBuf::from),
            "--hang-method" => hang_method = args.next(),
            _ => {}
        }
    }
    let base_dir = base_dir.ok_or_else(|| anyhow!("--base-dir is required"))?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    while let Ok(Some(msg)) = read_message(&mut reader) {
        let method = msg.get("method").and_then(Value::as_str);
        let id = msg.get("id").and_then(Value::as_i64);

        let (Some(method), Some(id)) = (method, id) else {
            // Notifications need no reply.
            continue;
        };

        if hang_method.as_deref() == Some(method) {
            // Stall forever until the client kills us.
            loop {
                std::thread::sleep(Duration::from_secs(3600));
            }
        }

        let reply = match method {
            "build/initialize" => ok(
                id,
                serde_json::json!({
                    "displayName": "fake-bsp",
                    "version": "0.1.0",
                    "bspVersion": "2.1.0",
                    "capabilities": {
                        "compileProvider": { "languageIds": ["java"] },
                    }
                }),
            ),
            "build/shutdown" | "workspace/reload" => ok(id, Value::Null),
            "workspace/buildTargets" => ok(id, build_targets(&base_dir)?),
            "buildTarget/sources" => ok(id, sources(&msg, &base_dir)?),
            "buildTarget/resources" => ok(id, resources(&msg, &base_dir)?),
            "buildTarget/outputPaths" => ok(id, output_paths(&msg, &base_dir)?),
            "buildTarget/dependencyModules" => ok(id, dependency_modules(&msg)),
            "buildTarget/compile" => {
                // A compile pushes diagnostics before the response, like a
                // real server reporting as it goes.
                let diagnostics = serde_json::json!({
                    "textDocument": { "uri": uri(&base_dir.join("src/main/java/App.java"))? },
                    "buildTarget": { "uri": MAIN_TARGET },
                    "diagnostics": [{
                        "range": {
                            "start": { "line": 3, "character": 8 },
                            "end": { "line": 3, "character": 12 }
                        },
                        "severity": 2,
                        "message": "deprecated API"
                    }],
                    "reset": true
                });
                write_message(
                    &mut writer,
                    &serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "build/publishDiagnostics",
                        "params": diagnostics,
                    }),
                )?;
                ok(id, serde_json::json!({ "statusCode": 1 }))
            }
            other => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("method not found: {other}"),
                }
            }),
        };
        write_message(&mut writer, &reply)?;

        if method == "build/shutdown" {
            break;
        }
    }

    Ok(())
}

const MAIN_TARGET: &str = "build://demo/main";
const TEST_TARGET: &str = "build://demo/test";

fn ok(id: i64, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn uri(path: &Path) -> Result<String> {
    girder_core::path_to_file_uri(path).map_err(|err| anyhow!("{err}"))
}

fn build_targets(base_dir: &Path) -> Result<Value> {
    let base = uri(base_dir)?;
    Ok(serde_json::json!({
        "targets": [
            {
                "id": { "uri": MAIN_TARGET },
                "displayName": "demo [main]",
                "baseDirectory": base,
                "tags": [],
                "languageIds": ["java"],
                "dependencies": [],
                "dataKind": "jvm",
                "data": { "javaVersion": "17", "targetBytecodeVersion": "17" }
            },
            {
                "id": { "uri": TEST_TARGET },
                "displayName": "demo [test]",
                "baseDirectory": base,
                "tags": ["test"],
                "languageIds": ["java"],
                "dependencies": [{ "uri": MAIN_TARGET }],
                "dataKind": "jvm",
                "data": { "javaVersion": "17", "targetBytecodeVersion": "17" }
            }
        ]
    }))
}

fn requested_targets(msg: &Value) -> Vec<Value> {
    msg.pointer("/params/targets")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn sources(msg: &Value, base_dir: &Path) -> Result<Value> {
    let mut items = Vec::new();
    for target in requested_targets(msg) {
        let subdir = if target_uri(&target) == TEST_TARGET {
            "src/test/java"
        } else {
            "src/main/java"
        };
        items.push(serde_json::json!({
            "target": target,
            "sources": [{
                "uri": uri(&base_dir.join(subdir))?,
                "kind": 1,
                "generated": false
            }]
        }));
    }
    Ok(serde_json::json!({ "items": items }))
}

fn resources(msg: &Value, base_dir: &Path) -> Result<Value> {
    let mut items = Vec::new();
    for target in requested_targets(msg) {
        let subdir = if target_uri(&target) == TEST_TARGET {
            "src/test/resources"
        } else {
            "src/main/resources"
        };
        items.push(serde_json::json!({
            "target": target,
            "resources": [uri(&base_dir.join(subdir))?]
        }));
    }
    Ok(serde_json::json!({ "items": items }))
}

fn output_paths(msg: &Value, base_dir: &Path) -> Result<Value> {
    let mut items = Vec::new();
    for target in requested_targets(msg) {
        let subdir = if target_uri(&target) == TEST_TARGET {
            "build/classes/java/test"
        } else {
            "build/classes/java/main"
        };
        items.push(serde_json::json!({
            "target": target,
            "outputPaths": [
                { "uri": uri(&base_dir.join(subdir))?, "kind": 2 },
                { "uri": uri(&base_dir.join("build/resources"))?, "kind": 2 }
            ]
        }));
    }
    Ok(serde_json::json!({ "items": items }))
}

fn dependency_modules(msg: &Value) -> Value {
    let items: Vec<Value> = requested_targets(msg)
        .into_iter()
        .map(|target| serde_json::json!({ "target": target, "modules": [] }))
        .collect();
    serde_json::json!({ "items": items })
}

fn target_uri(target: &Value) -> &str {
    target.get("uri").and_then(Value::as_str).unwrap_or_default()
}

fn read_message(reader: &mut impl BufRead) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(value.trim().parse::<usize>()?);
            }
        }
    }

    let len = content_length.ok_or_else(|| anyhow!("missing Content-Length header"))?;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .context("failed to read framed JSON-RPC message")?;
    Ok(Some(serde_json::from_slice(&buf)?))
}

fn write_message(writer: &mut impl Write, msg: &Value) -> Result<()> {
    let json = serde_json::to_vec(msg)?;
    write!(writer, "Content-Length: {}\r\n\r\n", json.len())?;
    writer.write_all(&json)?;
    writer.flush()?;
    Ok(())
}
