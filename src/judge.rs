use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{JudgeConfig, LanguageConfig};
use crate::sandbox::{self, ExecutionResult, Outcome, Workspace};

/// One (input, expected output) pair, graded in the order given
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Compilation Error")]
    CompilationError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::WrongAnswer => "Wrong Answer",
            Self::RuntimeError => "Runtime Error",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::CompilationError => "Compilation Error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The case that ended grading early
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FirstFailure {
    /// 1-based position in the submitted test cases
    #[serde(rename = "testCase")]
    pub case_index: usize,
    #[serde(rename = "error")]
    pub kind: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationReport {
    pub verdict: Verdict,
    pub score: u32,
    pub passed: usize,
    pub total: usize,
    pub first_failure: Option<FirstFailure>,
    /// Compiler output, only for [`Verdict::CompilationError`]
    pub diagnostics: Option<String>,
}

/// What a single ad-hoc run produced
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    CompileFailed(String),
    Ran(ExecutionResult),
}

/// Compiles submissions and runs them against input or test cases
///
/// Every call gets its own [`Workspace`], removed before the call returns.
#[derive(Debug, Clone)]
pub struct Judge {
    workspace_root: PathBuf,
    compile_timeout: Duration,
    run_timeout: Duration,
    output_limit: usize,
}

impl Judge {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            workspace_root: config.workspace_root(),
            compile_timeout: config.compile_timeout.into(),
            run_timeout: config.run_timeout.into(),
            output_limit: config.output_limit.as_usize(),
        }
    }

    /// Compiles once and runs once with `input`, without grading
    pub async fn execute(
        &self,
        language: &LanguageConfig,
        source: &str,
        input: &str,
    ) -> Result<ExecuteOutcome> {
        let workspace = Workspace::allocate(&self.workspace_root, language)?;
        workspace.write_source(source)?;

        let compiled = sandbox::compile(
            language,
            &workspace,
            self.compile_timeout,
            self.output_limit,
        )
        .await;

        let outcome = if compiled.success {
            let result = sandbox::run(
                language,
                &workspace,
                input,
                self.run_timeout,
                self.output_limit,
            )
            .await;
            log::info!(
                "Execution in workspace {} finished: {:?}",
                workspace.id(),
                result.outcome
            );
            ExecuteOutcome::Ran(result)
        } else {
            log::info!("Compilation failed in workspace {}", workspace.id());
            ExecuteOutcome::CompileFailed(compiled.diagnostics)
        };

        workspace.cleanup();
        Ok(outcome)
    }

    /// Compiles once and grades `cases` in order, stopping at the first failure
    ///
    /// `cases` must not be empty; the score is always taken over all of them,
    /// including those skipped after a failure.
    pub async fn evaluate(
        &self,
        language: &LanguageConfig,
        source: &str,
        cases: &[TestCase],
    ) -> Result<EvaluationReport> {
        let total = cases.len();
        let workspace = Workspace::allocate(&self.workspace_root, language)?;
        workspace.write_source(source)?;

        log::debug!("Workspace {}: compiling", workspace.id());
        let compiled = sandbox::compile(
            language,
            &workspace,
            self.compile_timeout,
            self.output_limit,
        )
        .await;

        if !compiled.success {
            log::info!("Workspace {}: {}", workspace.id(), Verdict::CompilationError);
            workspace.cleanup();
            return Ok(EvaluationReport {
                verdict: Verdict::CompilationError,
                score: 0,
                passed: 0,
                total,
                first_failure: None,
                diagnostics: Some(compiled.diagnostics),
            });
        }

        let mut passed = 0;
        let mut first_failure = None;

        for (idx, case) in cases.iter().enumerate() {
            let case_index = idx + 1;
            log::debug!("Workspace {}: running case {case_index}/{total}", workspace.id());

            let result = sandbox::run(
                language,
                &workspace,
                &case.input,
                self.run_timeout,
                self.output_limit,
            )
            .await;

            if let Some(failure) = grade_case(case_index, case, &result) {
                first_failure = Some(failure);
                break;
            }
            passed += 1;
        }

        let verdict = first_failure
            .as_ref()
            .map_or(Verdict::Accepted, |failure| failure.kind);

        log::info!(
            "Workspace {}: {verdict}, {passed}/{total} cases passed",
            workspace.id()
        );
        workspace.cleanup();

        Ok(EvaluationReport {
            verdict,
            score: score(passed, total),
            passed,
            total,
            first_failure,
            diagnostics: None,
        })
    }
}

/// Returns the failure for one executed case, or `None` if it passed
fn grade_case(
    case_index: usize,
    case: &TestCase,
    result: &ExecutionResult,
) -> Option<FirstFailure> {
    let kind = match result.outcome {
        Outcome::Ok => {
            let actual = result.stdout.trim_end();
            let expected = case.expected_output.trim_end();
            if outputs_match(actual, expected) {
                return None;
            }
            return Some(FirstFailure {
                case_index,
                kind: Verdict::WrongAnswer,
                expected: Some(expected.to_string()),
                actual: Some(actual.to_string()),
                details: None,
            });
        }
        Outcome::Timeout => Verdict::TimeLimitExceeded,
        Outcome::ProcessError => Verdict::RuntimeError,
    };

    Some(FirstFailure {
        case_index,
        kind,
        expected: None,
        actual: None,
        details: Some(result.failure_details()),
    })
}

/// Exact, case-sensitive comparison ignoring trailing whitespace only
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim_end() == expected.trim_end()
}

/// `round(100 * passed / total)`, rounding halves up
pub fn score(passed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let rounded = (200 * passed + total) / (2 * total);
    u32::try_from(rounded).unwrap_or(100)
}
