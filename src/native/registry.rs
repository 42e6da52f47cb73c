use std::collections::HashMap;
use std::sync::Arc;

use crate::config::JudgeConfig;
use crate::core::domain::Language;
use crate::core::error::JudgeError;
use crate::core::traits::runner::LanguageRunner;
use crate::native::RunnerSettings;
use crate::native::cpp::CppRunner;
use crate::native::go::GoRunner;
use crate::native::java::JavaRunner;
use crate::native::javascript::JavascriptRunner;
use crate::native::python::PythonRunner;
use crate::native::rust::RustRunner;

/// Table of runners keyed by language. The coordinator only ever looks
/// runners up here, so adding a language means registering one more entry.
#[derive(Clone, Debug, Default)]
pub struct RunnerRegistry {
    runners: HashMap<Language, Arc<dyn LanguageRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six host-toolchain runners configured from `config`.
    pub fn native(config: &JudgeConfig) -> Self {
        let settings = RunnerSettings::from(config);
        let toolchains = &config.toolchains;

        let mut registry = Self::new();
        registry.register(Arc::new(PythonRunner::new(&toolchains.python, settings)));
        registry.register(Arc::new(JavaRunner::new(
            &toolchains.javac,
            &toolchains.java,
            settings,
        )));
        registry.register(Arc::new(JavascriptRunner::new(&toolchains.node, settings)));
        registry.register(Arc::new(CppRunner::new(&toolchains.gpp, settings)));
        registry.register(Arc::new(GoRunner::new(&toolchains.go, settings)));
        registry.register(Arc::new(RustRunner::new(&toolchains.rustc, settings)));
        registry
    }

    /// Adds a runner, replacing any previous one for the same language.
    pub fn register(&mut self, runner: Arc<dyn LanguageRunner>) -> &mut Self {
        self.runners.insert(runner.language(), runner);
        self
    }

    pub fn get(&self, language: Language) -> Result<Arc<dyn LanguageRunner>, JudgeError> {
        self.runners
            .get(&language)
            .cloned()
            .ok_or_else(|| JudgeError::UnsupportedLanguage(language.to_string()))
    }

    pub fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.runners.contains_key(language))
            .collect()
    }
}
