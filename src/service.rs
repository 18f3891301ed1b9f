use serde::{Deserialize, Serialize};

use crate::config::{Config, LanguageConfig, LanguageTable};
use crate::judge::{ExecuteOutcome, FirstFailure, Judge, TestCase, Verdict};
use crate::sandbox::Outcome;

fn default_language() -> String {
    "cpp".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(alias = "code")]
    pub source_code: String,
    #[serde(default)]
    pub input: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl ExecuteResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            truncated: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[serde(alias = "code")]
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Verdict>,
    pub score: u32,
    pub passed_tests: usize,
    pub total_tests: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FirstFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluateResponse {
    fn failure(error: String, total_tests: usize) -> Self {
        Self {
            success: false,
            status: None,
            score: 0,
            passed_tests: 0,
            total_tests,
            first_failure: None,
            error: Some(error),
        }
    }
}

/// The two operations offered to the API gateway
///
/// Neither operation fails: every problem, expected or not, is folded into
/// the response with `success: false` or a judging verdict.
pub struct JudgeService {
    judge: Judge,
    languages: LanguageTable,
}

impl JudgeService {
    pub fn new(config: &Config) -> Self {
        Self {
            judge: Judge::new(&config.judge),
            languages: config.languages.clone(),
        }
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    fn find_language(&self, name: &str) -> Result<&LanguageConfig, String> {
        self.languages
            .find(name)
            .ok_or_else(|| format!("Unsupported language: {name}"))
    }

    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteResponse {
        let language = match self.find_language(&request.language) {
            Ok(language) => language,
            Err(e) => return ExecuteResponse::failure(e),
        };

        let outcome = match self
            .judge
            .execute(language, &request.source_code, &request.input)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Execute request failed: {e:#}");
                return ExecuteResponse::failure(format!("{e:#}"));
            }
        };

        match outcome {
            ExecuteOutcome::CompileFailed(diagnostics) => ExecuteResponse::failure(format!(
                "{}: {diagnostics}",
                Verdict::CompilationError
            )),
            ExecuteOutcome::Ran(result) => match result.outcome {
                Outcome::Ok => ExecuteResponse {
                    success: true,
                    output: Some(result.stdout),
                    error: Some(result.stderr),
                    truncated: result.truncated,
                },
                Outcome::ProcessError | Outcome::Timeout => {
                    let verdict = if result.outcome == Outcome::Timeout {
                        Verdict::TimeLimitExceeded
                    } else {
                        Verdict::RuntimeError
                    };
                    ExecuteResponse {
                        truncated: result.truncated,
                        ..ExecuteResponse::failure(format!(
                            "{verdict}: {}",
                            result.failure_details()
                        ))
                    }
                }
            },
        }
    }

    pub async fn evaluate(&self, request: EvaluateRequest) -> EvaluateResponse {
        let total = request.test_cases.len();
        if total == 0 {
            return EvaluateResponse::failure("No test cases provided".to_string(), 0);
        }

        let language = match self.find_language(&request.language) {
            Ok(language) => language,
            Err(e) => return EvaluateResponse::failure(e, total),
        };

        match self
            .judge
            .evaluate(language, &request.source_code, &request.test_cases)
            .await
        {
            Ok(report) => EvaluateResponse {
                success: true,
                status: Some(report.verdict),
                score: report.score,
                passed_tests: report.passed,
                total_tests: report.total,
                first_failure: report.first_failure,
                error: report.diagnostics,
            },
            Err(e) => {
                log::error!("Evaluate request failed: {e:#}");
                EvaluateResponse::failure(format!("{e:#}"), total)
            }
        }
    }
}
