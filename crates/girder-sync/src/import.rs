//! Initial workspace import from the build server's target listing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use girder_bsp::BuildTarget;
use girder_project::{
    ProjectId, BSP_BUILDER, BUILD_GRADLE, BUILD_GRADLE_KTS, GRADLE_NATURE, GRADLE_PROPERTIES,
    JAVA_NATURE, SETTINGS_GRADLE, SETTINGS_GRADLE_KTS,
};

use crate::context::{SyncContext, SyncError};
use crate::registry::BuildTargetRegistry;

impl SyncContext {
    /// Import every project the build server reports.
    ///
    /// Targets are grouped by base directory; each directory becomes one
    /// project (or reuses the project already rooted there). Seeds the digest
    /// store so the next change-driven sync has a baseline, then builds each
    /// project's classpath. An empty target listing imports nothing.
    pub fn import_workspace(&mut self) -> Result<Vec<ProjectId>, SyncError> {
        let targets = self.server()?.workspace_build_targets()?.targets;
        let grouped = group_by_base_directory(targets);
        if grouped.is_empty() {
            tracing::info!("build server reported no targets; nothing to import");
            return Ok(Vec::new());
        }

        let mut all_targets = Vec::new();
        let mut imported = Vec::new();
        for (base_dir, targets) in grouped {
            all_targets.extend(targets);
            let id = match self.workspace.project_at(&base_dir) {
                Some(existing) => {
                    tracing::debug!(project = %existing.id, "reusing project at {}", base_dir.display());
                    existing.id.clone()
                }
                None => self.create_project_for(&base_dir)?,
            };
            self.seed_digests(&base_dir);
            imported.push(id);
        }
        self.registry.replace(all_targets);

        for id in &imported {
            self.update_classpath(id)?;
        }
        if let Err(err) = self.digests.persist() {
            tracing::warn!(error = %err, "failed to persist digest store");
        }

        tracing::info!(projects = imported.len(), "workspace import finished");
        Ok(imported)
    }

    fn create_project_for(&mut self, base_dir: &Path) -> Result<ProjectId, SyncError> {
        let base_name = base_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = self.workspace.unique_project_name(&base_name);
        tracing::info!(project = %name, "importing project at {}", base_dir.display());
        Ok(self.workspace.create_project(
            &name,
            base_dir.to_path_buf(),
            vec![JAVA_NATURE.to_string(), GRADLE_NATURE.to_string()],
            vec![BSP_BUILDER.to_string()],
        )?)
    }

    /// Record digests for the build files under `base_dir`. For build and
    /// settings scripts the Groovy spelling shadows the Kotlin one.
    fn seed_digests(&mut self, base_dir: &Path) {
        let mut seed = |file: PathBuf| {
            if let Err(err) = self.digests.update(&file) {
                tracing::warn!(file = %file.display(), error = %err, "failed to digest build file");
            }
        };
        for pair in [
            [BUILD_GRADLE, BUILD_GRADLE_KTS],
            [SETTINGS_GRADLE, SETTINGS_GRADLE_KTS],
        ] {
            if let Some(file) = pair
                .iter()
                .map(|name| base_dir.join(name))
                .find(|file| file.is_file())
            {
                seed(file);
            }
        }
        let properties = base_dir.join(GRADLE_PROPERTIES);
        if properties.is_file() {
            seed(properties);
        }
    }
}

/// Group targets by their base directory, keeping a deterministic project
/// order. Targets without a usable base directory cannot be mapped to a
/// project and are dropped with a warning.
fn group_by_base_directory(targets: Vec<BuildTarget>) -> BTreeMap<PathBuf, Vec<BuildTarget>> {
    let mut grouped: BTreeMap<PathBuf, Vec<BuildTarget>> = BTreeMap::new();
    for target in targets {
        match BuildTargetRegistry::base_directory(&target) {
            Some(base_dir) => grouped.entry(base_dir).or_default().push(target),
            None => {
                tracing::warn!(
                    target = %target.id.uri,
                    "build target has no usable base directory; not importing it"
                );
            }
        }
    }
    grouped
}
