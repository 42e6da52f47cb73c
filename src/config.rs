use std::path::{Path, PathBuf};

use serde::Deserialize;

const ENV_PREFIX: &str = "JUDGE";
const DEFAULT_CONFIG_PATH: &str = "config/judge";

/// Host toolchain executables, one per binary the runners invoke.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Toolchains {
    pub python: PathBuf,
    pub javac: PathBuf,
    pub java: PathBuf,
    pub node: PathBuf,
    pub gpp: PathBuf,
    pub go: PathBuf,
    pub rustc: PathBuf,
}

impl Default for Toolchains {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            javac: "javac".into(),
            java: "java".into(),
            node: "node".into(),
            gpp: "g++".into(),
            go: "go".into(),
            rustc: "rustc".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Parent directory for workspaces; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
    pub compile_timeout_ms: u64,
    pub max_concurrent_judgments: usize,
    pub max_output_bytes: usize,
    pub max_diagnostic_bytes: usize,
    pub toolchains: Toolchains,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            compile_timeout_ms: 10_000,
            max_concurrent_judgments: 4,
            max_output_bytes: 1024 * 1024,
            max_diagnostic_bytes: 4096,
            toolchains: Toolchains::default(),
        }
    }
}

impl JudgeConfig {
    /// Reads `path` (any format the `config` crate knows, optional) and then
    /// `JUDGE__*` environment variables, e.g. `JUDGE__TOOLCHAINS__GPP`.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: JudgeConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let checks = [
            (self.compile_timeout_ms == 0, "compile_timeout_ms must be positive"),
            (
                self.max_concurrent_judgments == 0,
                "max_concurrent_judgments must be positive",
            ),
            (self.max_output_bytes == 0, "max_output_bytes must be positive"),
            (
                self.max_diagnostic_bytes == 0,
                "max_diagnostic_bytes must be positive",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(config::ConfigError::Message(msg.to_string())),
            None => Ok(()),
        }
    }
}
