use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, build, run_artifact};

const SOURCE_FILE: &str = "main.rs";
const EXECUTABLE: &str = "main";

#[derive(Clone, Debug)]
pub struct RustRunner {
    rustc: PathBuf,
    settings: RunnerSettings,
}

impl RustRunner {
    pub fn new(rustc: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            rustc: rustc.into(),
            settings,
        }
    }

    fn compile_command(&self, workspace: &Workspace) -> CommandSpec {
        CommandSpec::new(&self.rustc)
            .arg("-O")
            .arg("--edition")
            .arg("2021")
            .arg(workspace.join(SOURCE_FILE).to_string_lossy())
            .arg("-o")
            .arg(workspace.join(EXECUTABLE).to_string_lossy())
            .current_dir(workspace.path())
    }
}

#[async_trait]
impl LanguageRunner for RustRunner {
    fn language(&self) -> Language {
        Language::Rust
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_command() {
        let workspace = Workspace::acquire(None).unwrap();
        let runner = RustRunner::new("rustc", RunnerSettings::default());
        let spec = runner.compile_command(&workspace);
        assert_eq!(&spec.args[..3], ["-O", "--edition", "2021"]);
        assert!(spec.args.last().unwrap().ends_with(EXECUTABLE));
    }
}
