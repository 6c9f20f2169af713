//! One entry point for running code in either language.
//!
//! Every run is registered under a slot (an editor tab, a lesson) in a
//! [`RunRegistry`]. Starting a new run in a slot supersedes the old one, and
//! the old run's result is discarded instead of overwriting the newer state.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use codeflow_core::{NoopObserver, RunRegistry, Test, TraceLimits, TraceObserver, TraceResult};
use codeflow_js::{Entry, JsHost, RunRequest};
use codeflow_python::PythonDriver;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckError;
use crate::runner::{run_tests, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
}

impl Language {
    /// Guesses the language from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, CheckError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "js" | "mjs" | "cjs" => Ok(Language::JavaScript),
            "py" => Ok(Language::Python),
            other => Err(CheckError::UnsupportedLanguage {
                name: format!(".{}", other),
            }),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Python => write!(f, "python"),
        }
    }
}

impl FromStr for Language {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            _ => Err(CheckError::UnsupportedLanguage { name: s.to_string() }),
        }
    }
}

/// What a playground run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(TraceResult),
    /// A newer run started in the same slot; this result was dropped.
    Superseded,
}

impl RunOutcome {
    pub fn into_result(self) -> Option<TraceResult> {
        match self {
            RunOutcome::Completed(result) => Some(result),
            RunOutcome::Superseded => None,
        }
    }
}

/// A JavaScript host and a Python driver sharing one set of limits.
#[derive(Debug, Default)]
pub struct Playground {
    limits: TraceLimits,
    js: JsHost,
    python: PythonDriver,
    runs: RunRegistry,
}

impl Playground {
    pub fn new(limits: TraceLimits) -> Self {
        Playground {
            js: JsHost::new(limits.clone()),
            python: PythonDriver::new(limits.clone()),
            limits,
            runs: RunRegistry::new(),
        }
    }

    pub fn limits(&self) -> &TraceLimits {
        &self.limits
    }

    /// Runs top-level code.
    pub async fn run(&self, slot: &str, language: Language, source: &str) -> RunOutcome {
        self.run_entry(slot, language, source, Entry::Script, Vec::new(), &mut NoopObserver)
            .await
    }

    /// Runs `source` and, for JavaScript, calls `entry` with `args`. Python
    /// programs always run as scripts.
    pub async fn run_entry(
        &self,
        slot: &str,
        language: Language,
        source: &str,
        entry: Entry,
        args: Vec<Value>,
        observer: &mut (dyn TraceObserver + Send),
    ) -> RunOutcome {
        let token = self.runs.begin(slot);
        tracing::debug!("slot {}: {} run {} started", slot, language, token);
        let result = match language {
            Language::JavaScript => {
                let request = RunRequest::new(source)
                    .with_entry(entry)
                    .with_args(args)
                    .with_token(token);
                self.js.run(request, observer).await
            }
            Language::Python => self.python.run(source).await,
        };
        if !self.runs.finish(slot, token) {
            tracing::debug!("slot {}: dropping result of superseded run {}", slot, token);
            return RunOutcome::Superseded;
        }
        RunOutcome::Completed(result)
    }

    /// Validates JavaScript `user` code against `tests`.
    pub async fn validate(&self, starter: &str, user: &str, tests: &[Test]) -> ValidationReport {
        run_tests(starter, user, tests, &self.limits).await
    }

    /// Runs still in flight.
    pub fn active_runs(&self) -> usize {
        self.runs.active_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn languages_parse_from_names_and_paths() {
        assert_eq!("JS".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("python".parse::<Language>().unwrap(), Language::Python);
        assert!("ruby".parse::<Language>().is_err());
        assert_eq!(
            Language::from_path(Path::new("lesson/main.py")).unwrap(),
            Language::Python
        );
        assert!(Language::from_path(Path::new("notes.txt")).is_err());
        assert_eq!(Language::JavaScript.to_string(), "javascript");
    }

    #[test]
    fn superseded_outcomes_have_no_result() {
        assert!(RunOutcome::Superseded.into_result().is_none());
    }
}
