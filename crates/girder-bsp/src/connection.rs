//! Discovery of `.bsp/*.json` connection files.
//!
//! Build tools advertise their BSP entry point by dropping a JSON file in the
//! workspace's `.bsp` directory whose `argv` array names the command to
//! launch. Environment variables can override the launch command, which is
//! how integration setups point at a wrapper script.

use std::path::Path;

use serde::Deserialize;

/// Overrides the program named in the connection file.
pub const ENV_PROGRAM: &str = "GIRDER_BSP_PROGRAM";
/// Overrides the argument list, either a JSON array or whitespace-separated
/// words with single/double quoting.
pub const ENV_ARGS: &str = "GIRDER_BSP_ARGS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BspConnectionFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub bsp_version: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub argv: Vec<String>,
}

/// Launch command for a build server: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunch {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerLaunch {
    fn from_argv(mut argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        let program = argv.remove(0);
        Some(Self {
            program,
            args: argv,
        })
    }
}

/// Find the launch command for `workspace_root`, if any.
///
/// Connection files are tried in lexicographic order; the first one with a
/// non-empty `argv` wins. Environment overrides are applied on top of the
/// discovered command, and `GIRDER_BSP_PROGRAM` alone is enough to form a
/// launch even without a connection file.
pub fn discover_server_launch(workspace_root: &Path) -> Option<ServerLaunch> {
    let mut launch = discover_connection_file(workspace_root);
    apply_env_overrides(&mut launch);
    launch
}

fn discover_connection_file(workspace_root: &Path) -> Option<ServerLaunch> {
    let dir = workspace_root.join(".bsp");
    let entries = std::fs::read_dir(&dir).ok()?;
    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    for path in files {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable connection file");
                continue;
            }
        };
        match serde_json::from_slice::<BspConnectionFile>(&bytes) {
            Ok(file) => match ServerLaunch::from_argv(file.argv) {
                Some(launch) => {
                    tracing::debug!(
                        path = %path.display(),
                        server = file.name.as_deref().unwrap_or("<unnamed>"),
                        "found build server connection"
                    );
                    return Some(launch);
                }
                None => {
                    tracing::warn!(path = %path.display(), "connection file has empty argv");
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unparseable connection file");
            }
        }
    }
    None
}

fn apply_env_overrides(launch: &mut Option<ServerLaunch>) {
    let program = std::env::var(ENV_PROGRAM)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let args = std::env::var(ENV_ARGS)
        .ok()
        .map(|value| parse_args(&value));

    if let Some(program) = program {
        match launch {
            Some(launch) => {
                launch.program = program;
                if let Some(args) = args {
                    launch.args = args;
                }
            }
            None => {
                *launch = Some(ServerLaunch {
                    program,
                    args: args.unwrap_or_default(),
                });
            }
        }
    } else if let (Some(launch), Some(args)) = (launch.as_mut(), args) {
        launch.args = args;
    }
}

/// Parse an argument override: a JSON string array, or quote-aware
/// whitespace-separated words.
pub fn parse_args(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(args) => return args,
            Err(err) => {
                tracing::warn!(error = %err, "argument override looks like JSON but failed to parse; splitting on whitespace");
            }
        }
    }
    split_quoted(raw)
}

fn split_quoted(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_first_parseable_connection_file() {
        let dir = tempfile::tempdir().unwrap();
        let bsp = dir.path().join(".bsp");
        fs::create_dir(&bsp).unwrap();
        fs::write(bsp.join("a-gradle.json"), "{ not json").unwrap();
        fs::write(
            bsp.join("b-gradle.json"),
            r#"{ "name": "gradle", "argv": ["gradle", "--bsp"] }"#,
        )
        .unwrap();

        let launch = discover_connection_file(dir.path()).unwrap();
        assert_eq!(launch.program, "gradle");
        assert_eq!(launch.args, vec!["--bsp".to_string()]);
    }

    #[test]
    fn missing_bsp_dir_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_connection_file(dir.path()).is_none());
    }

    #[test]
    fn empty_argv_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bsp = dir.path().join(".bsp");
        fs::create_dir(&bsp).unwrap();
        fs::write(bsp.join("gradle.json"), r#"{ "argv": [] }"#).unwrap();

        assert!(discover_connection_file(dir.path()).is_none());
    }

    #[test]
    fn parses_json_array_args() {
        assert_eq!(
            parse_args(r#"["--bsp", "--stacktrace"]"#),
            vec!["--bsp".to_string(), "--stacktrace".to_string()]
        );
    }

    #[test]
    fn splits_quoted_words() {
        assert_eq!(
            parse_args(r#"--bsp "two words" --flag='a b'"#),
            vec![
                "--bsp".to_string(),
                "two words".to_string(),
                "--flag=a b".to_string(),
            ]
        );
    }
}
