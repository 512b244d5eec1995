//! Content digests for build files.
//!
//! Synchronization is gated on build-file changes: a project whose build
//! scripts hash to the same values as last time keeps its classpath. Digests
//! are keyed by absolute path and persisted as JSON next to the rest of the
//! session state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist digest store to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode digest store: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct DigestStore {
    path: PathBuf,
    digests: BTreeMap<PathBuf, String>,
}

impl DigestStore {
    /// Load the store persisted at `path`, or start empty.
    ///
    /// A missing or unreadable store is not an error: the next sync simply
    /// treats every build file as changed.
    pub fn open(path: PathBuf) -> Self {
        let digests = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(digests) => digests,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "discarding corrupt digest store");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, digests }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            path: PathBuf::from("digests.json"),
            digests: BTreeMap::new(),
        }
    }

    /// Hash `file` and record the result. Returns `true` when the content
    /// differs from the recorded digest (or no digest was recorded).
    pub fn update(&mut self, file: &Path) -> Result<bool, DigestError> {
        let bytes = std::fs::read(file).map_err(|source| DigestError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));

        match self.digests.get(file) {
            Some(previous) if *previous == digest => Ok(false),
            _ => {
                self.digests.insert(file.to_path_buf(), digest);
                Ok(true)
            }
        }
    }

    /// Drop the digest recorded for `file`, e.g. after the file is deleted.
    pub fn forget(&mut self, file: &Path) -> bool {
        self.digests.remove(file).is_some()
    }

    /// Write the store to disk atomically (temp file, then rename).
    pub fn persist(&self) -> Result<(), DigestError> {
        let json = serde_json::to_vec_pretty(&self.digests)?;
        let persist_io = |source| DigestError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(persist_io)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(persist_io)?;
        std::fs::rename(&tmp, &self.path).map_err(persist_io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn update_reports_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("build.gradle");
        fs::write(&file, "plugins { id 'java' }").unwrap();

        let mut store = DigestStore::in_memory();
        assert!(store.update(&file).unwrap());
        assert!(!store.update(&file).unwrap());

        fs::write(&file, "plugins { id 'java-library' }").unwrap();
        assert!(store.update(&file).unwrap());
        assert!(!store.update(&file).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DigestStore::in_memory();
        assert!(matches!(
            store.update(&dir.path().join("absent.gradle")),
            Err(DigestError::Io { .. })
        ));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.gradle");
        fs::write(&file, "rootProject.name = 'demo'").unwrap();
        let store_path = dir.path().join("state/digests.json");

        let mut store = DigestStore::open(store_path.clone());
        assert!(store.update(&file).unwrap());
        store.persist().unwrap();

        let mut reopened = DigestStore::open(store_path);
        assert!(!reopened.update(&file).unwrap());
    }

    #[test]
    fn corrupt_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("digests.json");
        fs::write(&store_path, "not json").unwrap();

        let file = dir.path().join("build.gradle");
        fs::write(&file, "").unwrap();

        let mut store = DigestStore::open(store_path);
        assert!(store.update(&file).unwrap());
    }
}
