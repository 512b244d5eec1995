//! Workspace project registry.
//!
//! Models the editor-side view of a workspace: named projects, each rooted
//! at a directory, carrying natures (what the project is) and builders (who
//! keeps it up to date). Build-managed Java projects get [`JAVA_NATURE`],
//! [`GRADLE_NATURE`] and the [`BSP_BUILDER`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const JAVA_NATURE: &str = "girder.java";
pub const GRADLE_NATURE: &str = "girder.gradle";
pub const BSP_BUILDER: &str = "girder.bsp.builder";

const DEFAULT_OUTPUT_DIR: &str = "bin";

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("a project named `{name}` already exists at {existing}")]
    DuplicateProject { name: String, existing: PathBuf },
}

/// Stable handle for a project, keyed by its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    /// Absolute directory the project is rooted at.
    pub location: PathBuf,
    pub natures: Vec<String>,
    pub builders: Vec<String>,
    /// Default compile-output directory for entries that name none.
    pub output_location: PathBuf,
}

impl ProjectRecord {
    pub fn has_nature(&self, nature: &str) -> bool {
        self.natures.iter().any(|n| n == nature)
    }
}

/// All projects known to the editor session.
#[derive(Debug, Default)]
pub struct Workspace {
    root: PathBuf,
    projects: BTreeMap<ProjectId, ProjectRecord>,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            projects: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, id: &ProjectId) -> Option<&ProjectRecord> {
        self.projects.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.projects.values()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Project rooted at exactly `location`.
    pub fn project_at(&self, location: &Path) -> Option<&ProjectRecord> {
        self.projects
            .values()
            .find(|project| project.location == location)
    }

    /// Innermost project whose location contains `path`.
    pub fn project_containing(&self, path: &Path) -> Option<&ProjectRecord> {
        self.projects
            .values()
            .filter(|project| path.starts_with(&project.location))
            .max_by_key(|project| project.location.as_os_str().len())
    }

    /// Derive a project name from `base` that is not yet taken.
    pub fn unique_project_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "project" } else { base };
        let mut candidate = base.to_string();
        let mut n = 2;
        while self.projects.contains_key(&ProjectId::new(candidate.clone())) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }

    pub fn create_project(
        &mut self,
        name: &str,
        location: PathBuf,
        natures: Vec<String>,
        builders: Vec<String>,
    ) -> Result<ProjectId, ProjectError> {
        let id = ProjectId::new(name);
        if let Some(existing) = self.projects.get(&id) {
            return Err(ProjectError::DuplicateProject {
                name: name.to_string(),
                existing: existing.location.clone(),
            });
        }
        let output_location = location.join(DEFAULT_OUTPUT_DIR);
        self.projects.insert(
            id.clone(),
            ProjectRecord {
                id: id.clone(),
                location,
                natures,
                builders,
                output_location,
            },
        );
        Ok(id)
    }

    pub fn remove_project(&mut self, id: &ProjectId) -> Option<ProjectRecord> {
        self.projects.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(locations: &[(&str, &str)]) -> Workspace {
        let mut workspace = Workspace::new(PathBuf::from("/work"));
        for (name, location) in locations {
            workspace
                .create_project(
                    name,
                    PathBuf::from(location),
                    vec![JAVA_NATURE.to_string()],
                    vec![BSP_BUILDER.to_string()],
                )
                .unwrap();
        }
        workspace
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut workspace = workspace_with(&[("app", "/work/app")]);
        let err = workspace
            .create_project("app", PathBuf::from("/work/other"), vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateProject { .. }));
    }

    #[test]
    fn unique_name_appends_a_counter() {
        let workspace = workspace_with(&[("app", "/work/app"), ("app-2", "/work/b")]);
        assert_eq!(workspace.unique_project_name("app"), "app-3");
        assert_eq!(workspace.unique_project_name("lib"), "lib");
    }

    #[test]
    fn project_containing_prefers_the_innermost_root() {
        let workspace = workspace_with(&[("root", "/work"), ("app", "/work/app")]);
        let hit = workspace
            .project_containing(Path::new("/work/app/src/Main.java"))
            .unwrap();
        assert_eq!(hit.id.as_str(), "app");

        let hit = workspace
            .project_containing(Path::new("/work/lib/build.gradle"))
            .unwrap();
        assert_eq!(hit.id.as_str(), "root");

        assert!(workspace
            .project_containing(Path::new("/elsewhere"))
            .is_none());
    }
}
