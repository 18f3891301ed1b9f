use std::time::Duration;

use super::process::{Termination, run_process};
use super::{Workspace, expand_command};
use crate::config::LanguageConfig;

/// Result of turning the workspace source into a runnable artifact
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub success: bool,
    /// Toolchain error stream, or a generic message when it printed nothing
    pub diagnostics: String,
}

impl CompileOutcome {
    fn failed(diagnostics: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Runs the language's compile command inside the workspace
///
/// Every way the toolchain can fail, including not being installed or running
/// past `limit`, is reported as an unsuccessful [`CompileOutcome`].
pub async fn compile(
    language: &LanguageConfig,
    workspace: &Workspace,
    limit: Duration,
    output_limit: usize,
) -> CompileOutcome {
    let command = expand_command(&language.compile, workspace);
    log::debug!("Compiling workspace {}: {command:?}", workspace.id());

    let output = match run_process(&command, workspace.dir(), None, limit, output_limit).await {
        Ok(output) => output,
        Err(e) => {
            log::error!("Failed to start compiler {:?}: {e}", command.first());
            return CompileOutcome::failed(format!("Failed to start compiler: {e}"));
        }
    };

    log::debug!(
        "Compilation of workspace {} finished in {} ms",
        workspace.id(),
        output.elapsed.as_millis()
    );

    let status = match output.termination {
        Termination::TimedOut => {
            return CompileOutcome::failed(format!(
                "Compilation timed out after {} ms",
                limit.as_millis()
            ));
        }
        Termination::Exited(status) => status,
    };

    if !status.success() {
        let diagnostics = [output.stderr.text, output.stdout.text]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Compiler exited with {status}"));
        return CompileOutcome::failed(diagnostics);
    }

    if !workspace.artifact_path().exists() {
        return CompileOutcome::failed(format!(
            "Compiler produced no {}",
            language.artifact
        ));
    }

    if language.executable {
        mark_executable(workspace);
    }

    CompileOutcome {
        success: true,
        diagnostics: output.stderr.text,
    }
}

#[cfg(unix)]
fn mark_executable(workspace: &Workspace) {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(0o755);
    if let Err(e) = std::fs::set_permissions(workspace.artifact_path(), permissions) {
        log::warn!("chmod of {} failed: {e}", workspace.artifact_path().display());
    }
}

#[cfg(not(unix))]
fn mark_executable(_workspace: &Workspace) {}
