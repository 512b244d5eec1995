//! Registry of build targets reported by the build server.
//!
//! Holds the latest `workspace/buildTargets` snapshot. The server owns the
//! truth; every refresh replaces the registry wholesale rather than patching
//! targets in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use girder_bsp::{BuildTarget, BuildTargetIdentifier};
use girder_core::file_uri_to_path;

#[derive(Debug, Default)]
pub struct BuildTargetRegistry {
    targets: HashMap<BuildTargetIdentifier, BuildTarget>,
}

impl BuildTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with a fresh target listing.
    pub fn replace(&mut self, targets: Vec<BuildTarget>) {
        self.targets = targets
            .into_iter()
            .map(|target| (target.id.clone(), target))
            .collect();
    }

    pub fn get(&self, id: &BuildTargetIdentifier) -> Option<&BuildTarget> {
        self.targets.get(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildTarget> {
        self.targets.values()
    }

    /// Base directory of a target as a local path, when parseable.
    pub fn base_directory(target: &BuildTarget) -> Option<PathBuf> {
        let uri = target.base_directory.as_deref()?;
        match file_uri_to_path(uri) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(
                    target = %target.id.uri,
                    error = %err,
                    "build target has a malformed base directory"
                );
                None
            }
        }
    }

    /// Targets rooted at exactly `base_dir`, ordered by target URI so callers
    /// see a stable listing.
    pub fn targets_in(&self, base_dir: &Path) -> Vec<&BuildTarget> {
        let mut targets: Vec<&BuildTarget> = self
            .targets
            .values()
            .filter(|target| {
                Self::base_directory(target).is_some_and(|directory| directory == base_dir)
            })
            .collect();
        targets.sort_by(|a, b| a.id.uri.cmp(&b.id.uri));
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_core::path_to_file_uri;

    fn target(uri: &str, base_dir: Option<&Path>) -> BuildTarget {
        BuildTarget {
            id: BuildTargetIdentifier::new(uri),
            base_directory: base_dir.map(|dir| path_to_file_uri(dir).unwrap()),
            ..BuildTarget::default()
        }
    }

    #[test]
    fn replace_supersedes_the_previous_snapshot() {
        let dir = std::env::temp_dir();
        let mut registry = BuildTargetRegistry::new();
        registry.replace(vec![target("build://a", Some(&dir))]);
        registry.replace(vec![target("build://b", Some(&dir))]);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&BuildTargetIdentifier::new("build://a")).is_none());
        assert!(registry.get(&BuildTargetIdentifier::new("build://b")).is_some());
    }

    #[test]
    fn targets_in_matches_the_exact_base_directory() {
        let root = std::env::temp_dir();
        let nested = root.join("app");
        let mut registry = BuildTargetRegistry::new();
        registry.replace(vec![
            target("build://root/main", Some(&root)),
            target("build://app/test", Some(&nested)),
            target("build://app/main", Some(&nested)),
            target("build://detached", None),
        ]);

        let in_app: Vec<_> = registry
            .targets_in(&nested)
            .into_iter()
            .map(|t| t.id.uri.as_str())
            .collect();
        assert_eq!(in_app, vec!["build://app/main", "build://app/test"]);
    }
}
