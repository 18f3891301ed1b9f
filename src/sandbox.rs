mod compile;
mod execute;
mod process;
mod workspace;

pub use compile::{CompileOutcome, compile};
pub use execute::run;
pub use workspace::Workspace;

use std::process::ExitStatus;

/// How a single run of the submitted program ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exited with status zero
    Ok,
    /// Nonzero exit, death by signal, or failure to start
    ProcessError,
    /// Killed after exceeding the wall-clock limit
    Timeout,
}

/// Result of one execution of a compiled artifact
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    /// `None` when the process never started or was killed on timeout
    pub exit_status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    /// Set when stdout or stderr was cut at the output limit
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }

    /// The captured stderr, or a description of how the process ended
    pub fn failure_details(&self) -> String {
        if !self.stderr.trim().is_empty() {
            return self.stderr.clone();
        }
        match (self.outcome, self.exit_status) {
            (Outcome::Timeout, _) => "Execution timed out".to_string(),
            (_, Some(status)) => format!("Process exited with {status}"),
            (_, None) => "Process failed".to_string(),
        }
    }
}

/// Substitutes the workspace placeholders of a command template
fn expand_command(template: &[String], workspace: &Workspace) -> Vec<String> {
    let source = workspace.source_path().to_string_lossy();
    let artifact = workspace.artifact_path().to_string_lossy();
    let dir = workspace.dir().to_string_lossy();

    template
        .iter()
        .map(|arg| {
            arg.replace("%INPUT%", &source)
                .replace("%OUTPUT%", &artifact)
                .replace("%DIR%", &dir)
        })
        .collect()
}
