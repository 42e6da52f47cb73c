use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::core::{
    domain::{
        CodeSubmission, ExecuteRequest, ExecutionLimits, ExecutionResult, SubmissionStatus,
        TestCase, Verdict,
    },
    error::JudgeError,
    pool::JudgePool,
};

/// One submission waiting to be judged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeTask {
    pub submission: CodeSubmission,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub limits: ExecutionLimits,
}

impl JudgeTask {
    fn request(&self) -> ExecuteRequest {
        ExecuteRequest {
            code: self.submission.code.clone(),
            language: self.submission.language.clone(),
            test_cases: self.test_cases.clone(),
            time_limit_ms: self.limits.time_limit_ms,
            memory_limit_mb: self.limits.memory_limit_mb,
        }
    }
}

/// Judges every task from `judge_rx`, publishing a `Running` snapshot and
/// then the terminal snapshot of each submission on `res_tx`.
#[tracing::instrument(skip_all)]
pub fn handle_judging(
    res_tx: Sender<CodeSubmission>,
    mut judge_rx: Receiver<JudgeTask>,
    pool: JudgePool,
) {
    tokio::spawn(async move {
        while let Some(task) = judge_rx.recv().await {
            let res_tx = res_tx.clone();
            let pool = pool.clone();

            tokio::spawn(async move {
                handle_task(task, res_tx, pool).await;
            });
        }
        tracing::debug!("Judge channel closed");
    });
}

#[tracing::instrument(skip_all, fields(submission_id = %task.submission.id))]
async fn handle_task(task: JudgeTask, res_tx: Sender<CodeSubmission>, pool: JudgePool) {
    let request = task.request();
    let mut submission = task.submission;

    if let Err(e) = submission.advance(SubmissionStatus::Running) {
        tracing::warn!("Skipping submission: {}", e);
        return;
    }
    if res_tx.send(submission.clone()).await.is_err() {
        tracing::warn!("Result channel closed, dropping submission");
        return;
    }

    let total = request.test_cases.len();
    let result = match pool.submit_with_id(submission.id, request).join().await {
        Ok(result) => result,
        Err(JudgeError::Cancelled) => {
            tracing::info!("Judgment cancelled");
            ExecutionResult::rejected(Verdict::SystemError, total, "judgment cancelled")
        }
        Err(e) => {
            tracing::error!("Judgment failed: {}", e);
            ExecutionResult::rejected(Verdict::SystemError, total, e.to_string())
        }
    };

    if let Err(e) = submission.apply_result(&result) {
        tracing::error!("Failed to record result: {}", e);
        return;
    }
    if res_tx.send(submission).await.is_err() {
        tracing::warn!("Result channel closed, dropping verdict");
    }
}
