use std::path::PathBuf;

use crate::core::domain::{ExecutionLimits, Language, MemoryUsage};
use crate::core::workspace::Workspace;
use crate::native::process::CommandSpec;

/// Something a runner can start: the staged or compiled program together with
/// the directory it lives in.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub command: CommandSpec,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The submission does not build. `msg` is the compiler's diagnostic.
    Failed { msg: String },
    TimedOut { limit_ms: u64 },
    /// The toolchain could not be invoked at all.
    Internal { msg: String },
}

/// Classified result of running an artifact against one input.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        stdout: String,
        stderr: String,
        runtime_ms: u64,
        memory: MemoryUsage,
    },
    RuntimeError {
        stderr: String,
        exit_code: Option<i32>,
        runtime_ms: u64,
    },
    Timeout {
        runtime_ms: u64,
    },
    MemoryLimitExceeded {
        stderr: String,
        runtime_ms: u64,
    },
    SystemError {
        cause: String,
    },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait LanguageRunner: std::fmt::Debug + Send + Sync {
    fn language(&self) -> Language;

    /// Stages `source` in the workspace and builds it when the language has a
    /// build step. Called once per submission.
    async fn compile(
        &self,
        source: &str,
        workspace: &Workspace,
        limits: &ExecutionLimits,
    ) -> Result<Artifact, CompileError>;

    /// Runs the artifact with `stdin` as its only input. Never fails: every
    /// fault is folded into the returned `Outcome`.
    async fn run(&self, artifact: &Artifact, stdin: &str, limits: &ExecutionLimits) -> Outcome;
}
