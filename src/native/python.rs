use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, run_artifact};

const SOURCE_FILE: &str = "solution.py";

/// Interprets the submission as a script; it reads its input from stdin.
#[derive(Clone, Debug)]
pub struct PythonRunner {
    interpreter: PathBuf,
    settings: RunnerSettings,
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            interpreter: interpreter.into(),
            settings,
        }
    }
}

#[async_trait]
impl LanguageRunner for PythonRunner {
    fn language(&self) -> Language {
        Language::Python
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        _limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        let script = workspace
            .write_file(SOURCE_FILE, source)
            .await
            .map_err(|e| CompileError::Internal {
                msg: format!("failed to stage source: {e}"),
            })?;

        Ok(Artifact {
            command: CommandSpec::new(&self.interpreter)
                .arg("-B")
                .arg(script.to_string_lossy())
                .env("PYTHONIOENCODING", "utf-8")
                .current_dir(workspace.path()),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, stdin))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        run_artifact(artifact, stdin, limits, &self.settings).await
    }
}
