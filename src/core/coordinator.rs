use std::sync::Arc;

use serde_json::Value;

use crate::config::JudgeConfig;
use crate::core::domain::{
    ErrorType, ExecuteRequest, ExecutionLimits, ExecutionResult, Language, MemoryUsage, TestCase,
    TestCaseResult, Verdict, evaluation_order,
};
use crate::core::error::JudgeError;
use crate::core::evaluator::evaluate;
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::verdict::aggregate;
use crate::core::workspace::Workspace;
use crate::native::registry::RunnerRegistry;

/// Judges one submission at a time against its ordered test cases.
///
/// The coordinator holds no per-judgment state, so a single instance can be
/// shared by any number of concurrent judgments.
#[derive(Debug, Clone)]
pub struct SubmissionCoordinator {
    registry: Arc<RunnerRegistry>,
    config: Arc<JudgeConfig>,
}

impl SubmissionCoordinator {
    pub fn new(registry: Arc<RunnerRegistry>, config: Arc<JudgeConfig>) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    #[tracing::instrument(
        skip(self, request),
        fields(language = %request.language, tests = request.test_cases.len())
    )]
    pub async fn execute(&self, request: &ExecuteRequest) -> ExecutionResult {
        let test_cases = evaluation_order(&request.test_cases);
        let total = test_cases.len();

        let runner = match request
            .language
            .parse::<Language>()
            .and_then(|language| self.registry.get(language))
        {
            Ok(runner) => runner,
            Err(e) => {
                tracing::info!("Rejecting submission: {}", e);
                return ExecutionResult::rejected(Verdict::CompileError, total, e.to_string());
            }
        };

        if test_cases.is_empty() {
            tracing::info!("No test cases, accepting vacuously");
            return Tally::new(0).finish();
        }

        let workspace = match Workspace::create(self.config.workspace_root.clone()).await {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::error!("Failed to acquire workspace: {}", e);
                return ExecutionResult::rejected(
                    Verdict::SystemError,
                    total,
                    "failed to prepare workspace",
                );
            }
        };

        let result = self
            .judge(runner.as_ref(), &request.code, &test_cases, &request.limits(), &workspace)
            .await;

        if let Err(e) = workspace.remove().await {
            tracing::warn!("Failed to remove workspace: {}", e);
        }

        tracing::info!(
            status = ?result.status,
            passed = result.passed_test_cases,
            total = result.total_test_cases,
            runtime_ms = result.runtime_ms,
            "Judgment finished"
        );
        result
    }

    async fn judge(
        &self,
        runner: &dyn LanguageRunner,
        code: &str,
        test_cases: &[TestCase],
        limits: &ExecutionLimits,
        workspace: &Workspace,
    ) -> ExecutionResult {
        let mut tally = Tally::new(test_cases.len());

        tracing::debug!("Start compiling");
        let artifact = match runner.compile(code, workspace, limits).await {
            Ok(artifact) => artifact,
            Err(e) => {
                let (error_type, message) = match e {
                    CompileError::Failed { msg } => (ErrorType::CompileError, msg),
                    CompileError::TimedOut { limit_ms } => (
                        ErrorType::CompileError,
                        format!("compilation exceeded {limit_ms} ms"),
                    ),
                    CompileError::Internal { msg } => {
                        tracing::error!("Internal error while compiling: {}", msg);
                        (ErrorType::SystemError, msg)
                    }
                };
                tally.push(TestCaseResult::failed(
                    test_cases[0].id,
                    error_type,
                    self.sanitize(workspace, &message),
                ));
                return tally.finish();
            }
        };

        for test_case in test_cases {
            let result = self
                .run_test_case(runner, &artifact, test_case, limits, workspace)
                .await;
            tracing::debug!(
                test_case_id = test_case.id,
                passed = result.passed,
                error_type = ?result.error_type,
                "Test case finished"
            );

            let halts = result.error_type.is_some_and(|t| t.halts_judging());
            tally.push(result);
            if halts {
                tracing::debug!("Fatal outcome, skipping remaining test cases");
                break;
            }
        }

        tally.finish()
    }

    async fn run_test_case(
        &self,
        runner: &dyn LanguageRunner,
        artifact: &Artifact,
        test_case: &TestCase,
        limits: &ExecutionLimits,
        workspace: &Workspace,
    ) -> TestCaseResult {
        let input = match normalize_input(test_case) {
            Ok(input) => input,
            Err(e) => {
                tracing::error!("{}", e);
                return TestCaseResult::failed(test_case.id, ErrorType::SystemError, e.to_string());
            }
        };

        match runner.run(artifact, &input, limits).await {
            Outcome::Success {
                stdout,
                runtime_ms,
                memory,
                ..
            } => {
                let evaluation = evaluate(&stdout, &test_case.expected_output);
                TestCaseResult {
                    test_case_id: test_case.id,
                    passed: evaluation.passed,
                    output: Some(evaluation.output),
                    expected_output: Some(expected_value(&test_case.expected_output)),
                    error: None,
                    error_type: (!evaluation.passed).then_some(ErrorType::WrongAnswer),
                    runtime_ms: Some(runtime_ms),
                    memory_kb: memory.kilobytes(),
                }
            }
            Outcome::RuntimeError {
                stderr,
                exit_code,
                runtime_ms,
            } => {
                let message = match (stderr.trim().is_empty(), exit_code) {
                    (false, _) => self.sanitize(workspace, &stderr),
                    (true, Some(code)) => format!("process exited with code {code}"),
                    (true, None) => "process terminated abnormally".to_string(),
                };
                TestCaseResult {
                    runtime_ms: Some(runtime_ms),
                    ..TestCaseResult::failed(test_case.id, ErrorType::RuntimeError, message)
                }
            }
            Outcome::Timeout { runtime_ms } => TestCaseResult {
                runtime_ms: Some(runtime_ms),
                ..TestCaseResult::failed(
                    test_case.id,
                    ErrorType::TimeLimitExceeded,
                    format!("time limit of {} ms exceeded", limits.time_limit_ms),
                )
            },
            Outcome::MemoryLimitExceeded { stderr, runtime_ms } => TestCaseResult {
                runtime_ms: Some(runtime_ms),
                ..TestCaseResult::failed(
                    test_case.id,
                    ErrorType::MemoryLimitExceeded,
                    self.sanitize(workspace, &stderr),
                )
            },
            Outcome::SystemError { cause } => {
                tracing::error!("System error while running test case {}: {}", test_case.id, cause);
                TestCaseResult::failed(
                    test_case.id,
                    ErrorType::SystemError,
                    self.sanitize(workspace, &cause),
                )
            }
        }
    }

    fn sanitize(&self, workspace: &Workspace, text: &str) -> String {
        workspace.sanitize(text, self.config.max_diagnostic_bytes)
    }
}

/// Re-encodes the test input as one compact JSON document.
fn normalize_input(test_case: &TestCase) -> Result<String, JudgeError> {
    serde_json::from_str::<Value>(&test_case.input_data)
        .map(|value| value.to_string())
        .map_err(|source| JudgeError::InvalidTestData {
            test_case_id: test_case.id,
            source,
        })
}

fn expected_value(expected_output: &str) -> Value {
    serde_json::from_str(expected_output)
        .unwrap_or_else(|_| Value::String(expected_output.to_string()))
}

/// Running totals over the attempted test cases of one judgment.
struct Tally {
    total: usize,
    passed: usize,
    runtime_ms: u64,
    memory: MemoryUsage,
    error_message: Option<String>,
    results: Vec<TestCaseResult>,
}

impl Tally {
    fn new(total: usize) -> Self {
        Self {
            total,
            passed: 0,
            runtime_ms: 0,
            memory: MemoryUsage::Unmeasured,
            error_message: None,
            results: Vec::with_capacity(total),
        }
    }

    fn push(&mut self, result: TestCaseResult) {
        if result.passed {
            self.passed += 1;
        } else if self.error_message.is_none() {
            self.error_message = Some(match &result.error {
                Some(error) => error.clone(),
                None => format!("wrong answer on test case {}", result.test_case_id),
            });
        }
        self.runtime_ms += result.runtime_ms.unwrap_or(0);
        if let Some(kb) = result.memory_kb {
            self.memory = self.memory.max(MemoryUsage::Kilobytes(kb));
        }
        self.results.push(result);
    }

    fn finish(self) -> ExecutionResult {
        ExecutionResult {
            status: aggregate(&self.results, self.passed, self.total),
            passed_test_cases: self.passed,
            total_test_cases: self.total,
            runtime_ms: self.runtime_ms,
            memory_kb: self.memory.kilobytes().unwrap_or(0),
            memory_measured: self.memory.kilobytes().is_some(),
            error_message: self.error_message,
            test_case_results: self.results,
        }
    }
}
