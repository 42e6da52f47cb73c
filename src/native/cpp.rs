use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, build, run_artifact};

const SOURCE_FILE: &str = "solution.cpp";
const EXECUTABLE: &str = "solution";

#[derive(Clone, Debug)]
pub struct CppRunner {
    compiler: PathBuf,
    settings: RunnerSettings,
}

impl CppRunner {
    pub fn new(compiler: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            compiler: compiler.into(),
            settings,
        }
    }

    fn compile_command(&self, workspace: &Workspace) -> CommandSpec {
        CommandSpec::new(&self.compiler)
            .arg("-std=c++17")
            .arg("-O2")
            .arg("-pipe")
            .arg("-o")
            .arg(workspace.join(EXECUTABLE).to_string_lossy())
            .arg(workspace.join(SOURCE_FILE).to_string_lossy())
            .current_dir(workspace.path())
    }
}

#[async_trait]
impl LanguageRunner for CppRunner {
    fn language(&self) -> Language {
        Language::Cpp
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
        let runner = CppRunner::new("/usr/bin/g++", RunnerSettings::default());
        let spec = runner.compile_command(&workspace);
        assert_eq!(spec.program, PathBuf::from("/usr/bin/g++"));
        assert_eq!(&spec.args[..3], ["-std=c++17", "-O2", "-pipe"]);
        assert!(spec.args.last().unwrap().ends_with(SOURCE_FILE));
    }

    #[tokio::test]
    async fn test_missing_compiler_is_internal_error() {
        let workspace = Workspace::acquire(None).unwrap();
        let runner = CppRunner::new("/nonexistent/g++", RunnerSettings::default());
        let result = runner
            .compile("int main() {}", &workspace, &ExecutionLimits::default())
            .await;
        assert!(matches!(result, Err(CompileError::Internal { .. })));
    }
}
