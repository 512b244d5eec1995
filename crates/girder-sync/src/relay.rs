//! Relays build-server diagnostics to the editor.

use std::str::FromStr;
use std::sync::Arc;

use girder_bsp::{
    BspDiagnostic, BuildClientListener, LogMessageParams, PublishDiagnosticsParams,
    ShowMessageParams, TaskFinishParams, TaskProgressParams, TaskStartParams,
};
use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range, Uri};

/// Where relayed diagnostics go, usually the LSP client connection.
pub trait DiagnosticsSink: Send + Sync {
    /// `reset` means the document's previous diagnostics from this build are
    /// superseded rather than appended to.
    fn publish(&self, uri: Uri, diagnostics: Vec<Diagnostic>, reset: bool);
}

/// [`BuildClientListener`] that forwards `build/publishDiagnostics` to a
/// [`DiagnosticsSink`] and folds the server's log traffic into our own.
pub struct DiagnosticsRelay {
    sink: Arc<dyn DiagnosticsSink>,
}

impl DiagnosticsRelay {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }
}

impl BuildClientListener for DiagnosticsRelay {
    fn on_publish_diagnostics(&self, params: PublishDiagnosticsParams) {
        let uri = match Uri::from_str(&params.text_document.uri) {
            Ok(uri) => uri,
            Err(err) => {
                tracing::warn!(uri = %params.text_document.uri, ?err, "dropping diagnostics for unparseable document URI");
                return;
            }
        };
        let diagnostics = params.diagnostics.into_iter().map(to_lsp).collect();
        self.sink.publish(uri, diagnostics, params.reset);
    }

    fn on_log_message(&self, params: LogMessageParams) {
        match params.message_type {
            1 => tracing::error!(target: "build_server", "{}", params.message),
            2 => tracing::warn!(target: "build_server", "{}", params.message),
            3 => tracing::info!(target: "build_server", "{}", params.message),
            _ => tracing::debug!(target: "build_server", "{}", params.message),
        }
    }

    fn on_show_message(&self, params: ShowMessageParams) {
        tracing::info!(target: "build_server", "{}", params.message);
    }

    fn on_task_start(&self, params: TaskStartParams) {
        tracing::debug!(task = %params.task_id.id, message = params.message.as_deref().unwrap_or(""), "task started");
    }

    fn on_task_progress(&self, params: TaskProgressParams) {
        tracing::trace!(task = %params.task_id.id, message = params.message.as_deref().unwrap_or(""), "task progress");
    }

    fn on_task_finish(&self, params: TaskFinishParams) {
        tracing::debug!(task = %params.task_id.id, status = params.status, "task finished");
    }
}

fn to_lsp(diagnostic: BspDiagnostic) -> Diagnostic {
    Diagnostic {
        range: Range {
            start: Position {
                line: diagnostic.range.start.line,
                character: diagnostic.range.start.character,
            },
            end: Position {
                line: diagnostic.range.end.line,
                character: diagnostic.range.end.character,
            },
        },
        // Severity is intentionally forced to Error regardless of what the
        // server reported: Gradle compile diagnostics arrive unclassified,
        // and anything a failed build surfaces blocks the user.
        severity: Some(DiagnosticSeverity::ERROR),
        source: diagnostic.source.or_else(|| Some("gradle".to_string())),
        message: diagnostic.message,
        ..Diagnostic::default()
    }
}
