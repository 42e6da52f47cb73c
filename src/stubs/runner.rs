use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    core::domain::{ExecutionLimits, Language},
    core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome},
    core::workspace::Workspace,
    native::process::CommandSpec,
    native::{RunnerSettings, run_artifact},
};

/// Runner that answers every run with a fixed outcome after `delay`.
/// Clones share their concurrency counters.
#[derive(Debug, Clone)]
pub struct RunnerStub {
    language: Language,
    compile_result: Result<(), CompileError>,
    outcome: Outcome,
    delay: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RunnerStub {
    pub fn new(language: Language, outcome: Outcome, delay: Duration) -> Self {
        Self {
            language,
            compile_result: Ok(()),
            outcome,
            delay,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_compile_result(mut self, result: Result<(), CompileError>) -> Self {
        self.compile_result = result;
        self
    }

    /// Highest number of runs observed executing at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the active counter even when the run is aborted mid-sleep.
struct ActiveRun<'a>(&'a AtomicUsize);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LanguageRunner for RunnerStub {
    fn language(&self) -> Language {
        self.language
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        tracing::debug!("Start compilation: source_len={}", source.len());
        workspace
            .write_file("solution.txt", source)
            .await
            .map_err(|e| CompileError::Internal { msg: e.to_string() })?;
        tracing::debug!("Compilation result: {:?}", self.compile_result);

        self.compile_result.clone().map(|_| Artifact {
            command: CommandSpec::new("stub").current_dir(workspace.path()),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, artifact))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveRun(&self.active);
        self.peak.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.outcome);

        self.outcome.clone()
    }
}

/// Runs the submission as a `/bin/sh` script through the native process path.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    language: Language,
    settings: RunnerSettings,
}

impl ShellRunner {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            settings: RunnerSettings::default(),
        }
    }
}

#[async_trait::async_trait]
impl LanguageRunner for ShellRunner {
    fn language(&self) -> Language {
        self.language
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        let script = workspace
            .write_file("solution.sh", source)
            .await
            .map_err(|e| CompileError::Internal { msg: e.to_string() })?;

        Ok(Artifact {
            command: CommandSpec::new("/bin/sh")
                .arg(script.to_string_lossy())
                .current_dir(workspace.path()),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, artifact))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        run_artifact(artifact, stdin, limits, &self.settings).await
    }
}
