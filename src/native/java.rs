use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, build, run_artifact};

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+class\s+(\w+)").expect("public class pattern is valid")
});

const OUT_OF_MEMORY: &str = "java.lang.OutOfMemoryError";

/// Name of the first public class in `source`, which javac requires to match
/// the file name.
pub fn extract_class_name(source: &str) -> Option<&str> {
    PUBLIC_CLASS
        .captures(source)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
}

#[derive(Clone, Debug)]
pub struct JavaRunner {
    javac: PathBuf,
    java: PathBuf,
    settings: RunnerSettings,
}

impl JavaRunner {
    pub fn new(
        javac: impl Into<PathBuf>,
        java: impl Into<PathBuf>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            javac: javac.into(),
            java: java.into(),
            settings,
        }
    }

    fn compile_command(&self, workspace: &Workspace, source_file: &str) -> CommandSpec {
        CommandSpec::new(&self.javac)
            .arg("-encoding")
            .arg("UTF-8")
            .arg("-d")
            .arg(workspace.path().to_string_lossy())
            .arg(workspace.join(source_file).to_string_lossy())
            .current_dir(workspace.path())
    }

    fn run_command(
        &self,
        workspace: &Workspace,
        class_name: &str,
        limits: &ExecutionLimits,
    ) -> CommandSpec {
        CommandSpec::new(&self.java)
            .arg(format!("-Xmx{}m", limits.memory_limit_mb))
            .arg("-Xss64m")
            .arg("-XX:+UseSerialGC")
            .arg("-Dfile.encoding=UTF-8")
            .arg("-cp")
            .arg(workspace.path().to_string_lossy())
            .arg(class_name)
            .current_dir(workspace.path())
    }
}

#[async_trait]
impl LanguageRunner for JavaRunner {
    fn language(&self) -> Language {
        Language::Java
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        let Some(class_name) = extract_class_name(source) else {
            return Err(CompileError::Failed {
                msg: "no public class declaration found".to_string(),
            });
        };
        let source_file = format!("{class_name}.java");

        workspace
            .write_file(&source_file, source)
            .await
            .map_err(|e| CompileError::Internal {
                msg: format!("failed to stage source: {e}"),
            })?;

        build(&self.compile_command(workspace, &source_file), &self.settings).await?;

        Ok(Artifact {
            command: self.run_command(workspace, class_name, limits),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, stdin))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        match run_artifact(artifact, stdin, limits, &self.settings).await {
            Outcome::RuntimeError {
                stderr, runtime_ms, ..
            } if stderr.contains(OUT_OF_MEMORY) => {
                Outcome::MemoryLimitExceeded { stderr, runtime_ms }
            }
            outcome => outcome,
        }
    }
}
