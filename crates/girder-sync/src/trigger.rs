//! Compile triggering through the build server.

use girder_bsp::{CompileParams, STATUS_OK};
use girder_project::ProjectId;

use crate::context::{SyncContext, SyncError};

impl SyncContext {
    /// Ask the build server to compile every target of `id`.
    ///
    /// Compilation failures are the server's to report through diagnostics;
    /// here a non-ok status is logged, not an error. Returns the BSP status
    /// code, or `STATUS_OK` when the project has no targets to build.
    pub fn trigger_build(&mut self, id: &ProjectId) -> Result<i32, SyncError> {
        let location = self
            .workspace
            .get(id)
            .ok_or_else(|| SyncError::UnknownProject(id.clone()))?
            .location
            .clone();
        let targets: Vec<_> = self
            .registry
            .targets_in(&location)
            .into_iter()
            .map(|target| target.id.clone())
            .collect();
        if targets.is_empty() {
            tracing::debug!(project = %id, "no build targets; skipping compile");
            return Ok(STATUS_OK);
        }

        let origin_id = format!("girder-build-{}", self.next_origin);
        self.next_origin += 1;

        tracing::info!(project = %id, origin = %origin_id, targets = targets.len(), "triggering build");
        let result = self.server()?.build_target_compile(CompileParams {
            targets,
            origin_id: Some(origin_id),
        })?;
        if result.status_code != STATUS_OK {
            tracing::error!(
                project = %id,
                status = result.status_code,
                "build finished with errors"
            );
        }
        Ok(result.status_code)
    }
}
