//! Workspace model, Gradle root discovery, and build-file digests.

mod digest;
mod scanner;
mod workspace;

pub use digest::{DigestError, DigestStore};
pub use scanner::{
    is_build_file, is_build_like_file_name, DiscoveryScanner, BUILD_GRADLE, BUILD_GRADLE_KTS,
    DESCRIPTOR_NAMES, GRADLE_PROPERTIES, SETTINGS_GRADLE, SETTINGS_GRADLE_KTS,
};
pub use workspace::{
    ProjectError, ProjectId, ProjectRecord, Workspace, BSP_BUILDER, GRADLE_NATURE, JAVA_NATURE,
};
