use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Exit code recorded for a script killed by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when the interpreter never produced one
/// (spawn failure, killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Script language selected by the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    R,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::R];

    /// Human-readable name, as used in advisory prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::R => "R",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::R => write!(f, "r"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "r" => Ok(Language::R),
            _ => Err(anyhow::anyhow!(
                "unknown language: {s} (expected one of: python, r)"
            )),
        }
    }
}

/// A discovered script, identified by its canonical absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script {
    pub path: PathBuf,
    pub language: Language,
}

impl Script {
    pub fn new(path: PathBuf, language: Language) -> Self {
        Self { path, language }
    }

    /// Directory the interpreter runs in.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Bare file name passed to the interpreter.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Outcome of linting one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintResult {
    pub passed: bool,
    pub output: String,
}

/// Outcome of running one script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Rendered command line, for diagnostics.
    pub command: String,
    pub exit_code: i32,
    #[serde(rename = "duration_secs", with = "duration_secs")]
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Per-script record in a [`Report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub path: PathBuf,
    /// 1-based position in the order the scripts were checked.
    pub order: usize,
    /// `None` when linting was disabled.
    pub lint: Option<LintResult>,
    pub execution: ExecutionResult,
    pub execution_passed: bool,
    pub overall_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl CheckResult {
    pub fn new(path: PathBuf, lint: Option<LintResult>, execution: ExecutionResult) -> Self {
        let execution_passed = execution.passed();
        let lint_passed = lint.as_ref().is_none_or(|l| l.passed);
        Self {
            path,
            order: 0,
            lint,
            execution,
            execution_passed,
            overall_passed: execution_passed && lint_passed,
            explanation: None,
        }
    }

    /// `true` when linting ran and failed.
    pub fn lint_failed(&self) -> bool {
        self.lint.as_ref().is_some_and(|l| !l.passed)
    }
}

/// Result of one `check` run over a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub root: PathBuf,
    pub language: Language,
    pub started_at: DateTime<Utc>,
    pub results: Vec<CheckResult>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub has_circular_dependency: bool,
    /// Groups of scripts that depend on each other in a loop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycles: Vec<Vec<PathBuf>>,
}

impl Report {
    /// Build a report, deriving the counts from `results`.
    pub fn new(
        root: PathBuf,
        language: Language,
        started_at: DateTime<Utc>,
        results: Vec<CheckResult>,
        has_circular_dependency: bool,
        cycles: Vec<Vec<PathBuf>>,
    ) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.overall_passed).count();
        Self {
            root,
            language,
            started_at,
            results,
            total,
            passed,
            failed: total - passed,
            has_circular_dependency,
            cycles,
        }
    }

    /// `true` when no checked script failed (including when none were found).
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Percentage of passing scripts, 0 for an empty report.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64 * 100.0
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64((d.as_secs_f64() * 1000.0).round() / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
