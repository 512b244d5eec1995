//! Project synchronization against a BSP build server.
//!
//! Ties the other layers together: [`SyncContext`] owns a workspace, its
//! build-target registry and digest store, and a connected build server, and
//! drives import, change-gated resync, classpath assembly, and compile
//! triggering. [`DiagnosticsRelay`] carries build diagnostics back to the
//! editor.

mod context;
mod import;
mod registry;
mod relay;
mod trigger;

pub use context::{SyncContext, SyncError, STATE_DIR};
pub use registry::BuildTargetRegistry;
pub use relay::{DiagnosticsRelay, DiagnosticsSink};
