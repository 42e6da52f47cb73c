use std::path::PathBuf;

use async_trait::async_trait;

use crate::core::domain::{ExecutionLimits, Language};
use crate::core::traits::runner::{Artifact, CompileError, LanguageRunner, Outcome};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;
use crate::native::{RunnerSettings, run_artifact};

const SOURCE_FILE: &str = "solution.js";

/// Wraps the submission so that `solution` receives the decoded stdin and its
/// return value is printed as JSON.
pub fn harness(source: &str) -> String {
    format!(
        r#"{source}

const __input = require('fs').readFileSync(0, 'utf-8');
const __inputData = JSON.parse(__input);
console.log(JSON.stringify(solution(__inputData)));
"#
    )
}

#[derive(Clone, Debug)]
pub struct JavascriptRunner {
    node: PathBuf,
    settings: RunnerSettings,
}

impl JavascriptRunner {
    pub fn new(node: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            node: node.into(),
            settings,
        }
    }
}

#[async_trait]
impl LanguageRunner for JavascriptRunner {
    fn language(&self) -> Language {
        Language::Javascript
    }

    #[tracing::instrument(skip(self, source, workspace))]
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        _limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError> {
        let script = workspace
            .write_file(SOURCE_FILE, &harness(source))
            .await
            .map_err(|e| CompileError::Internal {
                msg: format!("failed to stage source: {e}"),
            })?;

        Ok(Artifact {
            command: CommandSpec::new(&self.node)
                .arg(script.to_string_lossy())
                .current_dir(workspace.path()),
            dir: workspace.path().to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self, stdin))]
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome {
        run_artifact(artifact, stdin, limits, &self.settings).await
    }
}
