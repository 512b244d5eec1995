//! Discovery of Gradle project roots and change matching.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

pub const BUILD_GRADLE: &str = "build.gradle";
pub const BUILD_GRADLE_KTS: &str = "build.gradle.kts";
pub const SETTINGS_GRADLE: &str = "settings.gradle";
pub const SETTINGS_GRADLE_KTS: &str = "settings.gradle.kts";
pub const GRADLE_PROPERTIES: &str = "gradle.properties";

/// Descriptor files whose presence marks a directory as a Gradle root.
pub const DESCRIPTOR_NAMES: &[&str] = &[
    BUILD_GRADLE,
    BUILD_GRADLE_KTS,
    SETTINGS_GRADLE,
    SETTINGS_GRADLE_KTS,
];

/// Directories never worth descending into.
const SKIPPED_DIRS: &[&str] = &[".git", ".gradle", "build", "bin", "out", "node_modules"];

/// True for file names that can affect the build model: any `*.gradle` or
/// `*.gradle.kts` script, plus `gradle.properties`.
pub fn is_build_like_file_name(name: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^(.*\.gradle(\.kts)?|gradle\.properties)$").unwrap());
    pattern.is_match(name)
}

pub fn is_build_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(is_build_like_file_name)
}

fn has_descriptor(dir: &Path) -> bool {
    DESCRIPTOR_NAMES.iter().any(|name| dir.join(name).is_file())
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryScanner {
    /// Directory names (beyond the built-in output/VCS set) to skip.
    pub exclusions: Vec<String>,
    /// Locations claimed by projects of another build system; the scanner
    /// neither descends into them nor attributes changes to them.
    pub excluded_locations: Vec<PathBuf>,
}

impl DiscoveryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_excluded(&self, name: &str) -> bool {
        SKIPPED_DIRS.iter().any(|skip| *skip == name)
            || self.exclusions.iter().any(|skip| skip == name)
    }

    fn is_claimed(&self, path: &Path) -> bool {
        self.excluded_locations
            .iter()
            .any(|claimed| path.starts_with(claimed))
    }

    /// Find Gradle roots under `root`, outermost first.
    ///
    /// A directory holding a build or settings script is a root; the walk
    /// does not descend into it, so subprojects of a multi-project build are
    /// reported through their outermost root only.
    pub fn scan_root(&self, root: &Path) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        let mut walker = WalkDir::new(root).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if entry.depth() > 0 && (self.is_excluded(&name) || self.is_claimed(entry.path())) {
                walker.skip_current_dir();
                continue;
            }

            if has_descriptor(entry.path()) {
                roots.push(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
        }
        roots
    }

    /// Reduce changed `paths` to the Gradle roots they affect.
    ///
    /// Keeps only build-like files outside any claimed location, maps each
    /// to its directory, and drops directories nested inside another match
    /// so a change in a subproject resolves to one root.
    pub fn match_changed_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = paths
            .iter()
            .filter(|path| is_build_file(path) && !self.is_claimed(path))
            .filter_map(|path| path.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();

        let mut outermost: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            // `dirs` is sorted, so any containing directory precedes `dir`.
            if outermost.iter().any(|kept| dir.starts_with(kept)) {
                continue;
            }
            outermost.push(dir);
        }
        outermost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn matches_gradle_script_names() {
        assert!(is_build_like_file_name("build.gradle"));
        assert!(is_build_like_file_name("build.gradle.kts"));
        assert!(is_build_like_file_name("settings.gradle"));
        assert!(is_build_like_file_name("custom.conventions.gradle.kts"));
        assert!(is_build_like_file_name("gradle.properties"));

        assert!(!is_build_like_file_name("pom.xml"));
        assert!(!is_build_like_file_name("build.gradle.bak"));
        assert!(!is_build_like_file_name("gradle.properties.orig"));
    }

    #[test]
    fn scan_reports_outermost_roots_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("settings.gradle"), "include 'app'").unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/build.gradle"), "").unwrap();

        let roots = DiscoveryScanner::new().scan_root(root);
        assert_eq!(roots, vec![root.to_path_buf()]);
    }

    #[test]
    fn scan_finds_sibling_projects_and_skips_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("one")).unwrap();
        fs::write(root.join("one/build.gradle.kts"), "").unwrap();
        fs::create_dir_all(root.join("two")).unwrap();
        fs::write(root.join("two/settings.gradle.kts"), "").unwrap();
        fs::create_dir_all(root.join("build/generated")).unwrap();
        fs::write(root.join("build/generated/build.gradle"), "").unwrap();

        let mut roots = DiscoveryScanner::new().scan_root(root);
        roots.sort();
        assert_eq!(roots, vec![root.join("one"), root.join("two")]);
    }

    #[test]
    fn scan_honors_configured_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("vendored")).unwrap();
        fs::write(root.join("vendored/build.gradle"), "").unwrap();

        let scanner = DiscoveryScanner {
            exclusions: vec!["vendored".to_string()],
            ..DiscoveryScanner::default()
        };
        assert!(scanner.scan_root(root).is_empty());
    }

    #[test]
    fn claimed_locations_are_neither_scanned_nor_matched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("legacy")).unwrap();
        fs::write(root.join("legacy/build.gradle"), "").unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/build.gradle"), "").unwrap();

        let scanner = DiscoveryScanner {
            excluded_locations: vec![root.join("legacy")],
            ..DiscoveryScanner::default()
        };
        assert_eq!(scanner.scan_root(root), vec![root.join("app")]);
        assert_eq!(
            scanner.match_changed_paths(&[
                root.join("legacy/build.gradle"),
                root.join("legacy/sub/settings.gradle"),
                root.join("app/build.gradle"),
            ]),
            vec![root.join("app")]
        );
    }

    #[test]
    fn changed_paths_collapse_to_outermost_directories() {
        let scanner = DiscoveryScanner::new();
        let matched = scanner.match_changed_paths(&[
            PathBuf::from("/work/settings.gradle"),
            PathBuf::from("/work/app/build.gradle"),
            PathBuf::from("/work/app/gradle.properties"),
            PathBuf::from("/other/lib/build.gradle.kts"),
            PathBuf::from("/work/app/src/Main.java"),
        ]);
        assert_eq!(
            matched,
            vec![PathBuf::from("/other/lib"), PathBuf::from("/work")]
        );
    }
}
