use std::time::Duration;

use super::process::{Termination, run_process};
use super::{ExecutionResult, Outcome, Workspace, expand_command};
use crate::config::LanguageConfig;

/// Runs the compiled artifact once with `input` on stdin
///
/// Returns only after the process has exited or been killed for running past
/// `limit`. Failing to start the program counts as a [`Outcome::ProcessError`].
pub async fn run(
    language: &LanguageConfig,
    workspace: &Workspace,
    input: &str,
    limit: Duration,
    output_limit: usize,
) -> ExecutionResult {
    let command = expand_command(&language.run, workspace);

    let output = match run_process(
        &command,
        workspace.dir(),
        Some(input.as_bytes()),
        limit,
        output_limit,
    )
    .await
    {
        Ok(output) => output,
        Err(e) => {
            log::error!("Failed to start {command:?} in workspace {}: {e}", workspace.id());
            return ExecutionResult {
                outcome: Outcome::ProcessError,
                exit_status: None,
                stdout: String::new(),
                stderr: format!("Failed to start program: {e}"),
                truncated: false,
            };
        }
    };

    let outcome = match output.termination {
        Termination::TimedOut => Outcome::Timeout,
        Termination::Exited(status) if status.success() => Outcome::Ok,
        Termination::Exited(_) => Outcome::ProcessError,
    };

    log::debug!(
        "Run in workspace {} ended with {outcome:?} after {} ms",
        workspace.id(),
        output.elapsed.as_millis()
    );

    ExecutionResult {
        outcome,
        exit_status: match output.termination {
            Termination::Exited(status) => Some(status),
            Termination::TimedOut => None,
        },
        stdout: output.stdout.text,
        stderr: output.stderr.text,
        truncated: output.stdout.truncated || output.stderr.truncated,
    }
}
