//! Classpath assembly from build-server target data.
//!
//! Takes the raw per-target answers a build server gives (sources, resources,
//! output paths, dependency modules) and folds them into the flat classpath
//! a Java project presents to the editor. Assembly is total: entries that
//! cannot be interpreted are logged and skipped rather than failing the whole
//! project.

use std::collections::HashSet;
use std::path::PathBuf;

use girder_bsp::{
    BuildTarget, BuildTargetIdentifier, DependencyModule, OutputPathItem, SourceItem,
    CLASSIFIER_SOURCES,
};
use girder_core::file_uri_to_path;
use girder_project::{ProjectId, ProjectRecord};

/// Java runtime backing a project, resolved from the build target's JVM data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmRuntime {
    pub java_home: Option<PathBuf>,
    /// Normalized Java version, e.g. `"17"` or `"1.8"`.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathEntry {
    Source {
        path: PathBuf,
        /// Compile output for this root; the project default applies when absent.
        output: Option<PathBuf>,
        test: bool,
        /// Optional roots (generated sources, resources) may vanish without
        /// breaking the project.
        optional: bool,
    },
    Library {
        path: PathBuf,
        source_attachment: Option<PathBuf>,
        test: bool,
    },
    Project {
        id: ProjectId,
    },
    Container {
        runtime: JvmRuntime,
    },
}

/// Everything fetched from the build server for one target.
#[derive(Debug, Clone, Default)]
pub struct TargetClasspathData {
    pub target: BuildTarget,
    pub sources: Vec<SourceItem>,
    /// Resource root URIs. Only queried when the target has a dedicated
    /// resource output, i.e. more than one output path.
    pub resources: Vec<String>,
    pub output_paths: Vec<OutputPathItem>,
    pub modules: Vec<DependencyModule>,
}

/// `"1.9"` and `"1.10"` were the last releases to carry the legacy `1.x`
/// scheme; every other version string already names the runtime directly.
pub fn normalize_java_version(version: &str) -> &str {
    match version {
        "1.9" => "9",
        "1.10" => "10",
        _ => version,
    }
}

/// Fold per-target data into one project classpath.
///
/// Emits project references, then libraries (main before test, a library seen
/// by both keeping its main entry), then a single runtime container, then
/// source and resource roots. `resolve_dependency` maps a dependency target
/// to the project that owns it; unresolved dependencies are external and are
/// covered by the library entries instead.
pub fn assemble(
    project: &ProjectRecord,
    targets: &[TargetClasspathData],
    resolve_dependency: &dyn Fn(&BuildTargetIdentifier) -> Option<ProjectId>,
) -> Vec<ClasspathEntry> {
    let mut entries = Vec::new();

    collect_project_references(project, targets, resolve_dependency, &mut entries);
    collect_libraries(targets, &mut entries);
    collect_runtime(targets, &mut entries);
    collect_source_roots(targets, &mut entries);

    entries
}

fn collect_project_references(
    project: &ProjectRecord,
    targets: &[TargetClasspathData],
    resolve_dependency: &dyn Fn(&BuildTargetIdentifier) -> Option<ProjectId>,
    entries: &mut Vec<ClasspathEntry>,
) {
    let mut seen = HashSet::new();
    for data in targets {
        for dependency in &data.target.dependencies {
            let Some(id) = resolve_dependency(dependency) else {
                continue;
            };
            if id == project.id {
                // Targets of one project depend on each other (test on main);
                // a project never references itself.
                continue;
            }
            if seen.insert(id.clone()) {
                entries.push(ClasspathEntry::Project { id });
            }
        }
    }
}

fn collect_libraries(targets: &[TargetClasspathData], entries: &mut Vec<ClasspathEntry>) {
    // First-seen order within each scope; main wins over test.
    let mut main: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();
    let mut test: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();
    let mut main_paths = HashSet::new();
    let mut test_paths = HashSet::new();

    for data in targets {
        let is_test = data.target.is_test();
        for module in &data.modules {
            let Some(maven) = module.maven_data() else {
                tracing::debug!(module = %module.name, "skipping non-maven dependency module");
                continue;
            };
            let Some(binary) = maven
                .artifacts
                .iter()
                .find(|artifact| artifact.classifier.is_none())
                .or_else(|| maven.artifacts.first())
            else {
                tracing::warn!(module = %module.name, "dependency module has no artifacts");
                continue;
            };
            let Some(path) = uri_to_entry_path(&binary.uri, "library") else {
                continue;
            };
            let source_attachment = maven
                .artifacts
                .iter()
                .find(|artifact| artifact.classifier.as_deref() == Some(CLASSIFIER_SOURCES))
                .and_then(|artifact| uri_to_entry_path(&artifact.uri, "source attachment"));

            if is_test {
                if test_paths.insert(path.clone()) {
                    test.push((path, source_attachment));
                }
            } else if main_paths.insert(path.clone()) {
                main.push((path, source_attachment));
            }
        }
    }

    for (path, source_attachment) in main {
        test_paths.remove(&path);
        entries.push(ClasspathEntry::Library {
            path,
            source_attachment,
            test: false,
        });
    }
    for (path, source_attachment) in test {
        if !test_paths.contains(&path) {
            continue;
        }
        entries.push(ClasspathEntry::Library {
            path,
            source_attachment,
            test: true,
        });
    }
}

fn collect_runtime(targets: &[TargetClasspathData], entries: &mut Vec<ClasspathEntry>) {
    // First target that carries JVM data; a target without it does not
    // veto the container.
    let Some(jvm) = targets.iter().find_map(|data| data.target.jvm_data()) else {
        tracing::warn!("no JVM data on any build target; omitting runtime container");
        return;
    };
    let Some(version) = jvm.target_bytecode_version.or(jvm.java_version) else {
        tracing::warn!("JVM data names no Java version; omitting runtime container");
        return;
    };
    let java_home = jvm
        .java_home
        .as_deref()
        .and_then(|uri| uri_to_entry_path(uri, "java home"));
    entries.push(ClasspathEntry::Container {
        runtime: JvmRuntime {
            java_home,
            version: normalize_java_version(&version).to_string(),
        },
    });
}

fn collect_source_roots(targets: &[TargetClasspathData], entries: &mut Vec<ClasspathEntry>) {
    let mut seen = HashSet::new();
    for data in targets {
        let is_test = data.target.is_test();
        let class_output = data
            .output_paths
            .first()
            .and_then(|item| uri_to_entry_path(&item.uri, "output path"));
        let resource_output = data
            .output_paths
            .get(1)
            .and_then(|item| uri_to_entry_path(&item.uri, "output path"));

        for source in &data.sources {
            let Some(path) = uri_to_entry_path(&source.uri, "source root") else {
                continue;
            };
            if !path.exists() {
                tracing::debug!(path = %path.display(), "skipping nonexistent source root");
                continue;
            }
            if !seen.insert(path.clone()) {
                continue;
            }
            entries.push(ClasspathEntry::Source {
                path,
                output: class_output.clone(),
                test: is_test,
                optional: source.generated,
            });
        }

        // Resource roots only exist as classpath entries when the build
        // separates resource output from class output.
        if resource_output.is_some() {
            for uri in &data.resources {
                let Some(path) = uri_to_entry_path(uri, "resource root") else {
                    continue;
                };
                if !path.exists() || !seen.insert(path.clone()) {
                    continue;
                }
                entries.push(ClasspathEntry::Source {
                    path,
                    output: resource_output.clone(),
                    test: is_test,
                    optional: true,
                });
            }
        }
    }
}

fn uri_to_entry_path(uri: &str, what: &str) -> Option<PathBuf> {
    match file_uri_to_path(uri) {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!(uri, error = %err, "skipping {what} with malformed URI");
            None
        }
    }
}
