/// Native module contains `LanguageRunner` implementations that drive the
/// host toolchains directly as child processes. Isolation beyond a private
/// workspace and a wall-clock kill is expected from the host environment.
pub mod cpp;
pub mod go;
pub mod java;
pub mod javascript;
pub mod process;
pub mod python;
pub mod registry;
pub mod rust;

use std::path::Path;

use tokio::time::Duration;

use crate::config::JudgeConfig;
use crate::core::domain::{ExecutionLimits, MemoryUsage};
use crate::core::traits::runner::{Artifact, CompileError, Outcome};
use crate::native::process::{CommandSpec, ProcessError, execute};

/// Process settings shared by every native runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunnerSettings {
    pub compile_timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl From<&JudgeConfig> for RunnerSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            compile_timeout_ms: config.compile_timeout_ms,
            max_output_bytes: config.max_output_bytes,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            compile_timeout_ms: 10_000,
            max_output_bytes: 1024 * 1024,
        }
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

/// Invokes a build command and maps its result onto `CompileError`.
pub(crate) async fn build(
    spec: &CommandSpec,
    settings: &RunnerSettings,
) -> Result<(), CompileError> {
    tracing::debug!("Start compiling: {:?}", spec);
    let output = execute(
        spec,
        "",
        Duration::from_millis(settings.compile_timeout_ms),
        settings.max_output_bytes,
    )
    .await
    .map_err(|e| match e {
        ProcessError::Spawn { source, .. } => CompileError::Internal {
            msg: format!(
                "compiler {} is not available: {}",
                program_name(&spec.program),
                source
            ),
        },
        ProcessError::Io(source) => CompileError::Internal {
            msg: format!("compiler i/o failure: {source}"),
        },
    })?;

    if output.timed_out {
        return Err(CompileError::TimedOut {
            limit_ms: settings.compile_timeout_ms,
        });
    }
    if !output.success {
        let msg = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        return Err(CompileError::Failed { msg });
    }
    Ok(())
}

/// Runs an artifact under the shared stdin/stdout contract.
pub(crate) async fn run_artifact(
    artifact: &Artifact,
    stdin: &str,
    limits: &ExecutionLimits,
    settings: &RunnerSettings,
) -> Outcome {
    let output = match execute(
        &artifact.command,
        stdin,
        Duration::from_millis(limits.time_limit_ms),
        settings.max_output_bytes,
    )
    .await
    {
        Ok(output) => output,
        Err(ProcessError::Spawn { source, .. }) => {
            return Outcome::SystemError {
                cause: format!(
                    "failed to start {}: {}",
                    program_name(&artifact.command.program),
                    source
                ),
            };
        }
        Err(ProcessError::Io(source)) => {
            return Outcome::SystemError {
                cause: format!("process i/o failure: {source}"),
            };
        }
    };

    if output.timed_out {
        return Outcome::Timeout {
            runtime_ms: limits.time_limit_ms,
        };
    }

    let runtime_ms = output.elapsed_ms();
    if !output.success {
        let stderr = match output.exit_code {
            Some(_) => output.stderr,
            None if output.stderr.is_empty() => "process terminated by signal".to_string(),
            None => format!("{}\nprocess terminated by signal", output.stderr.trim_end()),
        };
        return Outcome::RuntimeError {
            stderr,
            exit_code: output.exit_code,
            runtime_ms,
        };
    }

    if output.stdout_truncated {
        return Outcome::RuntimeError {
            stderr: format!(
                "output limit exceeded: stdout is larger than {} bytes",
                settings.max_output_bytes
            ),
            exit_code: output.exit_code,
            runtime_ms,
        };
    }

    Outcome::Success {
        stdout: output.stdout,
        stderr: output.stderr,
        runtime_ms,
        memory: MemoryUsage::Unmeasured,
    }
}
