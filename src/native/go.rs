use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, build, run_artifact};

const SOURCE_FILE: &str = "main.go";
const EXECUTABLE: &str = "main";

#[derive(Clone, Debug)]
pub struct GoRunner {
    go: PathBuf,
    settings: RunnerSettings,
}

impl GoRunner {
    pub fn new(go: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            go: go.into(),
            settings,
        }
    }

    fn compile_command(&self, workspace: &Workspace) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.go)
            .arg("build")
            .arg("-o")
            .arg(workspace.join(EXECUTABLE).to_string_lossy())
            .arg(workspace.join(SOURCE_FILE).to_string_lossy())
            .env("GO111MODULE", "off")
            .current_dir(workspace.path());
        // The build cache must be writable; fall back to the workspace when
        // the host does not provide one.
        if std::env::var_os("GOCACHE").is_none() && std::env::var_os("HOME").is_none() {
            spec = spec.env("GOCACHE", workspace.join(".gocache").to_string_lossy());
        }
        spec
    }
}

#[async_trait]
impl LanguageRunner for GoRunner {
    fn language(&self) -> Language {
        Language::Go
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        _limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        workspace
            .write_file(SOURCE_FILE, source)
            .await
            .map_err(|e| CompileError::Internal {
                msg: format!("failed to stage source: {e}"),
            })?;

        build(&self.compile_command(workspace), &self.settings).await?;

        Ok(Artifact {
            command: CommandSpec::new(workspace.join(EXECUTABLE)).current_dir(workspace.path()),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, stdin))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        run_artifact(artifact, stdin, limits, &self.settings).await
    }
}
