use thiserror::Error;

use crate::core::domain::SubmissionStatus;

/// Infrastructure failures of the judging core. Classified outcomes of user
/// code (compile errors, crashes, timeouts) are not errors and never show up
/// here.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("test case {test_case_id} has invalid input data: {source}")]
    InvalidTestData {
        test_case_id: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("submission status cannot move from {from:?} to {to:?}")]
    StatusRegression {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("judgment cancelled")]
    Cancelled,

    #[error("judgment task failed: {0}")]
    Join(String),
}
