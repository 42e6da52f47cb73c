use crate::core::domain::{ErrorType, TestCaseResult, Verdict};

/// Failure classes from highest to lowest precedence.
const PRIORITY: [ErrorType; 5] = [
    ErrorType::CompileError,
    ErrorType::SystemError,
    ErrorType::RuntimeError,
    ErrorType::TimeLimitExceeded,
    ErrorType::MemoryLimitExceeded,
];

/// Maps per-test outcomes to the overall status of a submission.
///
/// An empty test set is a vacuous pass.
pub fn aggregate(results: &[TestCaseResult], passed: usize, total: usize) -> Verdict {
    let worst = PRIORITY
        .iter()
        .find(|class| results.iter().any(|r| r.error_type == Some(**class)));

    match worst {
        Some(class) => Verdict::from(*class),
        None if passed == total => Verdict::Accepted,
        None => Verdict::WrongAnswer,
    }
}
