use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::JudgeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Java,
    Javascript,
    Cpp,
    Go,
    Rust,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::Java,
        Language::Javascript,
        Language::Cpp,
        Language::Go,
        Language::Rust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "javascript" | "js" | "node" => Ok(Language::Javascript),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            _ => Err(JudgeError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Overall status of a judged submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompileError,
    SystemError,
}

/// Classification of a single failed test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompileError,
    SystemError,
}

impl ErrorType {
    /// Errors after which no further test case is attempted.
    pub fn halts_judging(&self) -> bool {
        matches!(
            self,
            ErrorType::CompileError | ErrorType::RuntimeError | ErrorType::SystemError
        )
    }
}

impl From<ErrorType> for Verdict {
    fn from(value: ErrorType) -> Self {
        match value {
            ErrorType::WrongAnswer => Verdict::WrongAnswer,
            ErrorType::TimeLimitExceeded => Verdict::TimeLimitExceeded,
            ErrorType::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
            ErrorType::RuntimeError => Verdict::RuntimeError,
            ErrorType::CompileError => Verdict::CompileError,
            ErrorType::SystemError => Verdict::SystemError,
        }
    }
}

/// Peak memory of a run. `Unmeasured` is reported as `0` on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemoryUsage {
    #[default]
    Unmeasured,
    Kilobytes(u64),
}

impl MemoryUsage {
    pub fn kilobytes(&self) -> Option<u64> {
        match self {
            MemoryUsage::Unmeasured => None,
            MemoryUsage::Kilobytes(kb) => Some(*kb),
        }
    }

    pub fn max(self, other: MemoryUsage) -> MemoryUsage {
        match (self.kilobytes(), other.kilobytes()) {
            (None, None) => MemoryUsage::Unmeasured,
            (a, b) => MemoryUsage::Kilobytes(a.unwrap_or(0).max(b.unwrap_or(0))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit_ms: 1000,
            memory_limit_mb: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    /// JSON text written to the program's stdin.
    pub input_data: String,
    /// JSON text the program's stdout is compared against.
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_sample: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeQuestion {
    pub id: i64,
    pub language: Language,
    #[serde(default)]
    pub template_code: String,
    #[serde(default)]
    pub starter_code: String,
    pub function_signature: String,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl CodeQuestion {
    pub fn validate(&self) -> Result<(), String> {
        if self.time_limit_ms == 0 {
            return Err(format!("question {}: time limit must be positive", self.id));
        }
        if self.memory_limit_mb == 0 {
            return Err(format!("question {}: memory limit must be positive", self.id));
        }
        if let Some(dup) = self.test_cases.iter().map(|t| t.id).duplicates().next() {
            return Err(format!("question {}: duplicate test case id {}", self.id, dup));
        }
        Ok(())
    }

    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
        }
    }

    /// Builds a judging request with test cases in evaluation order.
    pub fn to_request(&self, code: &str, language: Language) -> ExecuteRequest {
        ExecuteRequest {
            code: code.to_string(),
            language: language.as_str().to_string(),
            test_cases: evaluation_order(&self.test_cases),
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
        }
    }
}

/// Test cases sorted by `order`, ties broken by id.
pub fn evaluation_order(test_cases: &[TestCase]) -> Vec<TestCase> {
    test_cases
        .iter()
        .sorted_by_key(|t| (t.order, t.id))
        .cloned()
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    /// Kept as text so that unknown languages reach the judge and are
    /// reported as a compile error instead of a decoding failure.
    pub language: String,
    #[serde(default, alias = "testCases")]
    pub test_cases: Vec<TestCase>,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
}

impl ExecuteRequest {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit_ms: self.time_limit_ms,
            memory_limit_mb: self.memory_limit_mb,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case_id: i64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

impl TestCaseResult {
    pub fn failed(test_case_id: i64, error_type: ErrorType, error: impl Into<String>) -> Self {
        Self {
            test_case_id,
            passed: false,
            output: None,
            expected_output: None,
            error: Some(error.into()),
            error_type: Some(error_type),
            runtime_ms: None,
            memory_kb: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: Verdict,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
    pub runtime_ms: u64,
    /// `0` doubles as the unmeasured sentinel, see `memory_measured`.
    pub memory_kb: u64,
    #[serde(default)]
    pub memory_measured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub test_case_results: Vec<TestCaseResult>,
}

impl ExecutionResult {
    /// Result for a submission that never reached its test cases.
    pub fn rejected(status: Verdict, total_test_cases: usize, message: impl Into<String>) -> Self {
        Self {
            status,
            passed_test_cases: 0,
            total_test_cases,
            runtime_ms: 0,
            memory_kb: 0,
            memory_measured: false,
            error_message: Some(message.into()),
            test_case_results: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "verdict")]
pub enum SubmissionStatus {
    Pending,
    Running,
    Finished(Verdict),
}

impl SubmissionStatus {
    fn rank(&self) -> u8 {
        match self {
            SubmissionStatus::Pending => 0,
            SubmissionStatus::Running => 1,
            SubmissionStatus::Finished(_) => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeSubmission {
    pub id: Uuid,
    pub question_id: i64,
    pub code: String,
    pub language: String,
    pub status: SubmissionStatus,
    pub runtime_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub passed_test_cases: usize,
    pub total_test_cases: usize,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub test_case_results: Vec<TestCaseResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl CodeSubmission {
    pub fn new(question_id: i64, code: &str, language: &str, total_test_cases: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id,
            code: code.to_string(),
            language: language.to_string(),
            status: SubmissionStatus::Pending,
            runtime_ms: None,
            memory_kb: None,
            passed_test_cases: 0,
            total_test_cases,
            error_message: String::new(),
            test_case_results: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Moves the submission forward. Statuses never regress and a finished
    /// submission stays finished.
    pub fn advance(&mut self, to: SubmissionStatus) -> Result<(), JudgeError> {
        if to.rank() <= self.status.rank() {
            return Err(JudgeError::StatusRegression {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn apply_result(&mut self, result: &ExecutionResult) -> Result<(), JudgeError> {
        self.advance(SubmissionStatus::Finished(result.status))?;
        self.runtime_ms = Some(result.runtime_ms);
        self.memory_kb = Some(result.memory_kb);
        self.passed_test_cases = result.passed_test_cases;
        self.total_test_cases = result.total_test_cases;
        self.error_message = result.error_message.clone().unwrap_or_default();
        self.test_case_results = result.test_case_results.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: i64, order: i64) -> TestCase {
        TestCase {
            id,
            input_data: "{}".to_string(),
            expected_output: "0".to_string(),
            is_hidden: false,
            is_sample: false,
            order,
            difficulty: None,
        }
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("js".parse::<Language>().unwrap(), Language::Javascript);
        assert_eq!(" golang ".parse::<Language>().unwrap(), Language::Go);
        assert!(matches!(
            "cobol".parse::<Language>(),
            Err(JudgeError::UnsupportedLanguage(name)) if name == "cobol"
        ));
        for language in Language::ALL {
            assert_eq!(language.as_str().parse::<Language>().unwrap(), language);
        }
    }

    #[test]
    fn test_evaluation_order() {
        let ordered = evaluation_order(&[case(3, 2), case(1, 1), case(2, 1), case(4, 0)]);
        let ids: Vec<_> = ordered.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_question_validation() {
        let mut question = CodeQuestion {
            id: 7,
            language: Language::Python,
            template_code: String::new(),
            starter_code: String::new(),
            function_signature: "def solution(nums):".to_string(),
            time_limit_ms: 1000,
            memory_limit_mb: 256,
            test_cases: vec![case(1, 0), case(2, 1)],
        };
        assert!(question.validate().is_ok());

        question.test_cases.push(case(2, 2));
        assert!(question.validate().unwrap_err().contains("duplicate"));

        question.test_cases.pop();
        question.time_limit_ms = 0;
        assert!(question.validate().is_err());
    }

    #[test]
    fn test_question_to_request() {
        let question = CodeQuestion {
            id: 1,
            language: Language::Java,
            template_code: String::new(),
            starter_code: String::new(),
            function_signature: "int solve()".to_string(),
            time_limit_ms: 2000,
            memory_limit_mb: 128,
            test_cases: vec![case(2, 5), case(1, 3)],
        };
        let request = question.to_request("class A {}", Language::Java);
        assert_eq!(request.language, "java");
        assert_eq!(request.limits().time_limit_ms, 2000);
        assert_eq!(request.test_cases[0].id, 1);
    }

    #[test]
    fn test_memory_usage_max() {
        assert_eq!(
            MemoryUsage::Unmeasured.max(MemoryUsage::Unmeasured),
            MemoryUsage::Unmeasured
        );
        assert_eq!(
            MemoryUsage::Unmeasured.max(MemoryUsage::Kilobytes(0)),
            MemoryUsage::Kilobytes(0)
        );
        assert_eq!(
            MemoryUsage::Kilobytes(10).max(MemoryUsage::Kilobytes(4)),
            MemoryUsage::Kilobytes(10)
        );
    }

    #[test]
    fn test_submission_status_is_monotonic() {
        let mut submission = CodeSubmission::new(1, "print(1)", "python", 2);
        submission.advance(SubmissionStatus::Running).unwrap();
        assert!(matches!(
            submission.advance(SubmissionStatus::Pending),
            Err(JudgeError::StatusRegression { .. })
        ));

        let result = ExecutionResult {
            status: Verdict::WrongAnswer,
            passed_test_cases: 1,
            total_test_cases: 2,
            runtime_ms: 40,
            memory_kb: 0,
            memory_measured: false,
            error_message: None,
            test_case_results: Vec::new(),
        };
        submission.apply_result(&result).unwrap();
        assert_eq!(
            submission.status,
            SubmissionStatus::Finished(Verdict::WrongAnswer)
        );
        assert_eq!(submission.runtime_ms, Some(40));
        assert_eq!(submission.passed_test_cases, 1);

        assert!(submission.apply_result(&result).is_err());
        assert!(submission.advance(SubmissionStatus::Running).is_err());
    }

    #[test]
    fn test_verdict_wire_names() {
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"time_limit_exceeded\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorType::CompileError).unwrap(),
            "\"compile_error\""
        );
    }
}
