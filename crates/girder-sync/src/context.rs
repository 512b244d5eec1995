//! Synchronization context: one workspace's view of its build server.
//!
//! Owns the project registry, the build-target snapshot, the build-file
//! digest store, and the connection to the build server. Every
//! synchronization operation runs through an explicit [`SyncContext`] so a
//! host can hold several independent workspaces side by side.

use std::collections::HashMap;
use std::path::PathBuf;

use girder_bsp::{
    BspError, BuildServer, BuildTargetIdentifier, DependencyModulesParams, OutputPathsParams,
    ResourcesParams, SourcesParams,
};
use girder_classpath::{assemble, ClasspathEntry, TargetClasspathData};
use girder_project::{
    DigestError, DigestStore, DiscoveryScanner, ProjectError, ProjectId, Workspace, BUILD_GRADLE,
    BUILD_GRADLE_KTS, GRADLE_PROPERTIES, SETTINGS_GRADLE, SETTINGS_GRADLE_KTS,
};

use crate::registry::BuildTargetRegistry;

/// Directory under the workspace root holding session state.
pub const STATE_DIR: &str = ".girder";

/// Build files whose digests gate a project sync, checked in this order.
const GATING_BUILD_FILES: &[&str] = &[
    SETTINGS_GRADLE,
    SETTINGS_GRADLE_KTS,
    BUILD_GRADLE,
    BUILD_GRADLE_KTS,
    GRADLE_PROPERTIES,
];

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no build server is connected")]
    NotConnected,

    #[error("unknown project `{0}`")]
    UnknownProject(ProjectId),

    #[error(transparent)]
    Bsp(#[from] BspError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

pub struct SyncContext {
    pub(crate) workspace: Workspace,
    pub(crate) registry: BuildTargetRegistry,
    pub(crate) digests: DigestStore,
    pub(crate) scanner: DiscoveryScanner,
    pub(crate) classpaths: HashMap<ProjectId, Vec<ClasspathEntry>>,
    pub(crate) server: Option<Box<dyn BuildServer>>,
    pub(crate) next_origin: u64,
}

impl SyncContext {
    pub fn new(workspace_root: PathBuf) -> Self {
        let digests = DigestStore::open(workspace_root.join(STATE_DIR).join("digests.json"));
        Self::with_digests(Workspace::new(workspace_root), digests)
    }

    pub fn with_digests(workspace: Workspace, digests: DigestStore) -> Self {
        Self {
            workspace,
            registry: BuildTargetRegistry::new(),
            digests,
            scanner: DiscoveryScanner::new(),
            classpaths: HashMap::new(),
            server: None,
            next_origin: 1,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &BuildTargetRegistry {
        &self.registry
    }

    pub fn classpath(&self, id: &ProjectId) -> Option<&[ClasspathEntry]> {
        self.classpaths.get(id).map(Vec::as_slice)
    }

    pub fn connect(&mut self, server: Box<dyn BuildServer>) {
        self.server = Some(server);
    }

    pub fn disconnect(&mut self) -> Option<Box<dyn BuildServer>> {
        self.server.take()
    }

    pub(crate) fn server(&self) -> Result<&dyn BuildServer, SyncError> {
        self.server.as_deref().ok_or(SyncError::NotConnected)
    }

    fn project(&self, id: &ProjectId) -> Result<&girder_project::ProjectRecord, SyncError> {
        self.workspace
            .get(id)
            .ok_or_else(|| SyncError::UnknownProject(id.clone()))
    }

    /// Synchronize one project against the build server.
    ///
    /// Unless `force` is set, the sync is gated on the project's build files:
    /// checking stops at the first changed digest, and when none changed the
    /// server is not contacted at all. Returns whether a sync ran.
    pub fn update(&mut self, id: &ProjectId, force: bool) -> Result<bool, SyncError> {
        let project = self.project(id)?;
        if !project.has_nature(girder_project::GRADLE_NATURE) {
            tracing::debug!(project = %id, "not a build-managed project; skipping sync");
            return Ok(false);
        }
        let location = project.location.clone();

        let mut changed = force;
        for name in GATING_BUILD_FILES {
            if changed {
                break;
            }
            let file = location.join(name);
            if !file.is_file() {
                continue;
            }
            match self.digests.update(&file) {
                Ok(updated) => changed = updated,
                Err(err) => {
                    // When in doubt, resync.
                    tracing::warn!(file = %file.display(), error = %err, "failed to digest build file");
                    changed = true;
                }
            }
        }
        if !changed {
            tracing::debug!(project = %id, "build files unchanged; skipping sync");
            return Ok(false);
        }

        tracing::info!(project = %id, force, "synchronizing project");
        self.server()?.workspace_reload()?;
        let targets = self.server()?.workspace_build_targets()?.targets;
        self.registry.replace(targets);
        self.update_classpath(id)?;

        if let Err(err) = self.digests.persist() {
            tracing::warn!(error = %err, "failed to persist digest store");
        }
        Ok(true)
    }

    /// Rebuild the classpath of `id` from the registry's current snapshot.
    ///
    /// A project with no registered targets keeps whatever classpath it has;
    /// an empty snapshot must not wipe a working project.
    pub fn update_classpath(&mut self, id: &ProjectId) -> Result<(), SyncError> {
        let project = self.project(id)?.clone();
        if self.registry.targets_in(&project.location).is_empty() {
            tracing::debug!(project = %id, "no registered build targets; leaving classpath untouched");
            return Ok(());
        }
        let server = self.server()?;

        let mut data = Vec::new();
        for target in self.registry.targets_in(&project.location) {
            let target = target.clone();
            let ids = vec![target.id.clone()];

            let sources = server
                .build_target_sources(SourcesParams {
                    targets: ids.clone(),
                })?
                .items
                .into_iter()
                .flat_map(|item| item.sources)
                .collect();
            let output_paths: Vec<_> = server
                .build_target_output_paths(OutputPathsParams {
                    targets: ids.clone(),
                })?
                .items
                .into_iter()
                .flat_map(|item| item.output_paths)
                .collect();
            // Resource roots only matter when the target routes resources to
            // a dedicated output, i.e. reports more than one output path.
            let resources = if output_paths.len() > 1 {
                server
                    .build_target_resources(ResourcesParams {
                        targets: ids.clone(),
                    })?
                    .items
                    .into_iter()
                    .flat_map(|item| item.resources)
                    .collect()
            } else {
                Vec::new()
            };
            let modules = server
                .build_target_dependency_modules(DependencyModulesParams { targets: ids })?
                .items
                .into_iter()
                .flat_map(|item| item.modules)
                .collect();

            data.push(TargetClasspathData {
                target,
                sources,
                resources,
                output_paths,
                modules,
            });
        }

        let registry = &self.registry;
        let workspace = &self.workspace;
        let resolve = |dependency: &BuildTargetIdentifier| -> Option<ProjectId> {
            let target = registry.get(dependency)?;
            let base = BuildTargetRegistry::base_directory(target)?;
            workspace.project_at(&base).map(|project| project.id.clone())
        };
        let entries = assemble(&project, &data, &resolve);

        tracing::info!(
            project = %id,
            targets = data.len(),
            entries = entries.len(),
            "classpath updated"
        );
        self.classpaths.insert(id.clone(), entries);
        Ok(())
    }

    /// React to file changes: reduce them to affected Gradle roots and
    /// resync the projects owning those roots. Returns the projects that
    /// actually resynced (digest gating still applies).
    pub fn on_build_files_changed(
        &mut self,
        changed: &[PathBuf],
    ) -> Result<Vec<ProjectId>, SyncError> {
        // Locations owned by projects of another build system are not ours
        // to resync, even when they hold Gradle-looking files.
        self.scanner.excluded_locations = self
            .workspace
            .iter()
            .filter(|project| !project.has_nature(girder_project::GRADLE_NATURE))
            .map(|project| project.location.clone())
            .collect();

        let mut synced = Vec::new();
        for root in self.scanner.match_changed_paths(changed) {
            let Some(project) = self.workspace.project_containing(&root) else {
                tracing::debug!(path = %root.display(), "build file change outside any managed project");
                continue;
            };
            let id = project.id.clone();
            if self.update(&id, false)? {
                synced.push(id);
            }
        }
        Ok(synced)
    }
}
