use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::core::coordinator::SubmissionCoordinator;
use crate::core::domain::{ExecuteRequest, ExecutionResult, Verdict};
use crate::core::error::JudgeError;

/// Runs judgments on the tokio runtime, at most `max_concurrent_judgments`
/// at a time.
#[derive(Debug, Clone)]
pub struct JudgePool {
    coordinator: Arc<SubmissionCoordinator>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashMap<Uuid, AbortHandle>>,
}

/// Handle to one submitted judgment.
#[derive(Debug)]
pub struct JudgeHandle {
    id: Uuid,
    task: JoinHandle<ExecutionResult>,
}

impl JudgeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn join(self) -> Result<ExecutionResult, JudgeError> {
        match self.task.await {
            Ok(result) => Ok(result),
            Err(e) if e.is_cancelled() => Err(JudgeError::Cancelled),
            Err(e) => Err(JudgeError::Join(e.to_string())),
        }
    }

    /// Aborts the judgment and waits until it has unwound. The running
    /// process is killed and the workspace removed before this returns.
    /// A judgment that already finished still yields its result.
    pub async fn cancel(self) -> Result<ExecutionResult, JudgeError> {
        self.task.abort();
        self.join().await
    }
}

/// Removes a judgment from the in-flight map however its task ends.
struct InFlightGuard {
    id: Uuid,
    in_flight: Arc<DashMap<Uuid, AbortHandle>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

impl JudgePool {
    pub fn new(coordinator: SubmissionCoordinator) -> Self {
        let permits = coordinator.config().max_concurrent_judgments;
        Self {
            coordinator: Arc::new(coordinator),
            permits: Arc::new(Semaphore::new(permits)),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn submit(&self, request: ExecuteRequest) -> JudgeHandle {
        self.submit_with_id(Uuid::new_v4(), request)
    }

    #[tracing::instrument(skip(self, request), fields(language = %request.language))]
    pub fn submit_with_id(&self, id: Uuid, request: ExecuteRequest) -> JudgeHandle {
        let coordinator = self.coordinator.clone();
        let permits = self.permits.clone();
        let in_flight = self.in_flight.clone();
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(
            async move {
                // Wait for the abort handle to be registered so the guard
                // cannot run before the insert below.
                let _ = registered_rx.await;
                let _guard = InFlightGuard { id, in_flight };

                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        tracing::error!("Judge pool is closed: {}", e);
                        return ExecutionResult::rejected(
                            Verdict::SystemError,
                            request.test_cases.len(),
                            "judge pool is closed",
                        );
                    }
                };
                tracing::debug!("Judgment started");
                coordinator.execute(&request).await
            }
            .instrument(tracing::info_span!("judgment", %id)),
        );

        self.in_flight.insert(id, task.abort_handle());
        let _ = registered_tx.send(());

        JudgeHandle { id, task }
    }

    /// Aborts a judgment by id. Returns false when it is not in flight.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.in_flight.remove(&id) {
            Some((_, handle)) => {
                tracing::info!(%id, "Cancelling judgment");
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JudgeConfig;
    use crate::core::domain::{Language, MemoryUsage, TestCase};
    use crate::core::traits::runner::{LanguageRunner, Outcome};
    use crate::native::registry::RunnerRegistry;
    use crate::stubs::process::{is_running, read_pid, wait_until_gone};
    use crate::stubs::runner::{RunnerStub, ShellRunner};
    use std::time::Duration;

    fn accepted_outcome() -> Outcome {
        Outcome::Success {
            stdout: "1".to_string(),
            stderr: String::new(),
            runtime_ms: 1,
            memory: MemoryUsage::Unmeasured,
        }
    }

    fn pool(
        runner: impl LanguageRunner + 'static,
        root: &std::path::Path,
        max_concurrent: usize,
    ) -> JudgePool {
        let config = JudgeConfig {
            workspace_root: Some(root.to_path_buf()),
            max_concurrent_judgments: max_concurrent,
            ..Default::default()
        };
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(runner));
        JudgePool::new(SubmissionCoordinator::new(
            Arc::new(registry),
            Arc::new(config),
        ))
    }

    fn request() -> ExecuteRequest {
        ExecuteRequest {
            code: "print(1)".to_string(),
            language: "python".to_string(),
            test_cases: vec![TestCase {
                id: 1,
                input_data: "{}".to_string(),
                expected_output: "1".to_string(),
                is_hidden: false,
                is_sample: true,
                order: 0,
                difficulty: None,
            }],
            time_limit_ms: 1000,
            memory_limit_mb: 64,
        }
    }

    fn is_empty_dir(path: &std::path::Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_submit_and_join() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(Language::Python, accepted_outcome(), Duration::ZERO);
        let pool = pool(runner, root.path(), 2);

        let result = pool.submit(request()).join().await.unwrap();

        assert_eq!(result.status, Verdict::Accepted);
        assert_eq!(pool.in_flight(), 0);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(
            Language::Python,
            accepted_outcome(),
            Duration::from_millis(100),
        );
        let pool = pool(runner.clone(), root.path(), 2);

        let handles: Vec<_> = (0..6).map(|_| pool.submit(request())).collect();
        let results = futures::future::join_all(handles.into_iter().map(|h| h.join())).await;

        assert!(
            results
                .into_iter()
                .all(|r| r.unwrap().status == Verdict::Accepted)
        );
        let peak = runner.peak_concurrency();
        assert!(peak >= 1 && peak <= 2, "peak concurrency {peak}");
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(
            Language::Python,
            accepted_outcome(),
            Duration::from_secs(30),
        );
        let pool = pool(runner, root.path(), 1);

        let handle = pool.submit(request());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!is_empty_dir(root.path()));
        assert_eq!(pool.in_flight(), 1);

        let result = handle.cancel().await;

        assert!(matches!(result, Err(JudgeError::Cancelled)));
        assert!(is_empty_dir(root.path()));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_process_group() {
        let root = tempfile::tempdir().unwrap();
        let marks = tempfile::tempdir().unwrap();
        let leader_file = marks.path().join("leader");
        let sleeper_file = marks.path().join("sleeper");
        let pool = pool(ShellRunner::new(Language::Python), root.path(), 1);

        let script = format!(
            "echo $$ > {}; sleep 300 & echo $! > {}; wait",
            leader_file.display(),
            sleeper_file.display()
        );
        let handle = pool.submit(ExecuteRequest {
            code: script,
            time_limit_ms: 60_000,
            ..request()
        });

        let leader = read_pid(&leader_file).await;
        let sleeper = read_pid(&sleeper_file).await;
        assert!(is_running(leader));
        assert!(is_running(sleeper));
        assert!(!is_empty_dir(root.path()));

        let result = handle.cancel().await;

        assert!(matches!(result, Err(JudgeError::Cancelled)));
        assert!(wait_until_gone(leader).await);
        assert!(wait_until_gone(sleeper).await);
        assert!(is_empty_dir(root.path()));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_by_id() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(
            Language::Python,
            accepted_outcome(),
            Duration::from_secs(30),
        );
        let pool = pool(runner, root.path(), 1);

        let handle = pool.submit(request());
        let id = handle.id();
        assert!(pool.is_in_flight(id));

        assert!(pool.cancel(id));
        assert!(matches!(handle.join().await, Err(JudgeError::Cancelled)));
        assert!(!pool.cancel(id));
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_keeps_result() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(Language::Python, accepted_outcome(), Duration::ZERO);
        let pool = pool(runner, root.path(), 1);

        let handle = pool.submit(request());
        let id = handle.id();
        while pool.is_in_flight(id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result = handle.cancel().await.unwrap();
        assert_eq!(result.status, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_queued_judgment_can_be_cancelled() {
        let root = tempfile::tempdir().unwrap();
        let runner = RunnerStub::new(
            Language::Python,
            accepted_outcome(),
            Duration::from_millis(300),
        );
        let pool = pool(runner, root.path(), 1);

        let running = pool.submit(request());
        let queued = pool.submit(request());
        assert!(pool.cancel(queued.id()));

        assert!(matches!(queued.join().await, Err(JudgeError::Cancelled)));
        assert_eq!(running.join().await.unwrap().status, Verdict::Accepted);
    }
}
