//! Lint + run pipeline for a single script.
//!
//! Every failure mode of the subprocess layer (missing interpreter,
//! permission errors, timeouts) is folded into the returned
//! [`CheckResult`]; nothing here returns an error to the caller.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;

use crate::analyzer::{ScriptLanguage, ToolCommand};
use crate::types::{
    CheckResult, ExecutionResult, LintResult, Script, NO_EXIT_CODE, TIMEOUT_EXIT_CODE,
};

/// Why a subprocess did not produce an exit status.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed while waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Timed out after {}s", format_secs(.0))]
    Timeout(Duration),
}

impl ProcessError {
    /// `true` when the program itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Run `cmd` in `cwd`, capturing output and killing it after `timeout`.
pub async fn run_process(
    cmd: &ToolCommand,
    cwd: &Path,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the child on timeout kills it.
        .kill_on_drop(true);

    let start = Instant::now();
    let child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: cmd.program.clone(),
        source,
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(NO_EXIT_CODE),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        }),
        Ok(Err(source)) => Err(ProcessError::Wait {
            program: cmd.program.clone(),
            source,
        }),
        Err(_elapsed) => Err(ProcessError::Timeout(timeout)),
    }
}

/// Runs the lint and execution steps for scripts of one language.
pub struct ScriptChecker<'a> {
    language: &'a dyn ScriptLanguage,
    timeout: Duration,
    lint_timeout: Duration,
}

impl<'a> ScriptChecker<'a> {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_LINT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(language: &'a dyn ScriptLanguage, timeout: Duration) -> Self {
        Self {
            language,
            timeout,
            lint_timeout: Self::DEFAULT_LINT_TIMEOUT,
        }
    }

    pub fn with_lint_timeout(mut self, lint_timeout: Duration) -> Self {
        self.lint_timeout = lint_timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lint (optionally) and run one script.
    pub async fn check(&self, path: &Path, lint_enabled: bool) -> CheckResult {
        let script = Script::new(path.to_path_buf(), self.language.language());

        let lint = if lint_enabled {
            Some(self.lint(&script).await)
        } else {
            None
        };
        let execution = self.execute(&script).await;

        let result = CheckResult::new(script.path.clone(), lint, execution);
        tracing::debug!(
            script = %script,
            exit_code = result.execution.exit_code,
            passed = result.overall_passed,
            "checked script"
        );
        result
    }

    /// Lint one script. A missing lint tool counts as a pass.
    pub async fn lint(&self, script: &Script) -> LintResult {
        let Some(cmd) = self.language.lint_command(&script.path) else {
            return LintResult {
                passed: true,
                output: format!("no linter configured for {}, skipping lint", self.language.language()),
            };
        };

        match run_process(&cmd, script.directory(), self.lint_timeout).await {
            Ok(out) if out.exit_code == 0 => {
                let output = combine_output(&out.stdout, &out.stderr);
                LintResult {
                    passed: true,
                    output: if output.trim().is_empty() {
                        "No linting issues found".to_string()
                    } else {
                        output
                    },
                }
            }
            Ok(out) => LintResult {
                passed: false,
                output: combine_output(&out.stdout, &out.stderr),
            },
            Err(e) if e.is_not_found() => {
                tracing::debug!(tool = %cmd.program, "lint tool not installed");
                LintResult {
                    passed: true,
                    output: format!("{} not available, skipping lint", cmd.program),
                }
            }
            Err(e) => LintResult {
                passed: false,
                output: format!("Linting failed: {e}"),
            },
        }
    }

    /// Run one script from its own directory, by bare file name.
    pub async fn execute(&self, script: &Script) -> ExecutionResult {
        let cmd = self.language.run_command(&script.file_name());
        let command = cmd.to_string();
        let start = Instant::now();

        match run_process(&cmd, script.directory(), self.timeout).await {
            Ok(out) => ExecutionResult {
                command,
                exit_code: out.exit_code,
                duration: out.duration,
                stdout: out.stdout,
                stderr: out.stderr,
                timed_out: false,
            },
            Err(e @ ProcessError::Timeout(_)) => {
                tracing::debug!(script = %script, "script timed out");
                ExecutionResult {
                    command,
                    exit_code: TIMEOUT_EXIT_CODE,
                    duration: self.timeout,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    timed_out: true,
                }
            }
            Err(e) => ExecutionResult {
                command,
                exit_code: NO_EXIT_CODE,
                duration: start.elapsed(),
                stdout: String::new(),
                stderr: e.to_string(),
                timed_out: false,
            },
        }
    }

    /// Check scripts in the given order, tagging each with its 1-based position.
    pub async fn check_all(&self, order: &[PathBuf], lint_enabled: bool) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(order.len());
        for (i, path) in order.iter().enumerate() {
            let mut result = self.check(path, lint_enabled).await;
            result.order = i + 1;
            results.push(result);
        }
        results
    }
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    format!("{stdout}{stderr}")
}

fn format_secs(d: &Duration) -> String {
    if d.subsec_nanos() == 0 {
        d.as_secs().to_string()
    } else {
        format!("{}", d.as_secs_f64())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::Language;
    use std::collections::BTreeSet;

    /// Runs `.sh` scripts with `sh`; the lint command is configurable.
    struct ShellLanguage {
        lint: Option<ToolCommand>,
        interpreter: &'static str,
    }

    impl ShellLanguage {
        fn new() -> Self {
            Self {
                lint: None,
                interpreter: "sh",
            }
        }

        fn with_lint(program: &str, args: &[&str]) -> Self {
            Self {
                lint: Some(ToolCommand::new(program, args.iter().copied())),
                interpreter: "sh",
            }
        }
    }

    impl ScriptLanguage for ShellLanguage {
        fn language(&self) -> Language {
            Language::Python
        }
        fn default_patterns(&self) -> &[&str] {
            &["**/*.sh"]
        }
        fn extract_dependencies(&self, _path: &Path) -> anyhow::Result<BTreeSet<PathBuf>> {
            Ok(BTreeSet::new())
        }
        fn lint_command(&self, _path: &Path) -> Option<ToolCommand> {
            self.lint.clone()
        }
        fn run_command(&self, file_name: &str) -> ToolCommand {
            ToolCommand::new(self.interpreter, [file_name])
        }
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path.canonicalize().unwrap()
    }

    #[tokio::test]
    async fn test_passing_script_captures_output() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "ok.sh", "echo hello\necho oops >&2\n");
        let lang = ShellLanguage::new();
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, false).await;
        assert!(result.execution_passed);
        assert!(result.overall_passed);
        assert!(result.lint.is_none());
        assert_eq!(result.execution.exit_code, 0);
        assert_eq!(result.execution.stdout, "hello\n");
        assert_eq!(result.execution.stderr, "oops\n");
        assert_eq!(result.execution.command, "sh ok.sh");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "bad.sh", "exit 3\n");
        let lang = ShellLanguage::new();
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, false).await;
        assert_eq!(result.execution.exit_code, 3);
        assert!(!result.execution_passed);
        assert!(!result.overall_passed);
    }

    #[tokio::test]
    async fn test_runs_from_script_directory_with_bare_name() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("input.txt"), "payload\n").unwrap();
        let script = write_script(tmp.path(), "probe.sh", "echo \"$0\"\ncat input.txt\n");
        let lang = ShellLanguage::new();
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, false).await;
        assert!(result.execution_passed, "stderr: {}", result.execution.stderr);
        assert_eq!(result.execution.stdout, "probe.sh\npayload\n");
    }

    #[tokio::test]
    async fn test_timeout_is_recorded_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "slow.sh", "sleep 5\n");
        let lang = ShellLanguage::new();
        let timeout = Duration::from_millis(300);
        let checker = ScriptChecker::new(&lang, timeout);

        let started = Instant::now();
        let result = checker.check(&script, false).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(result.execution.timed_out);
        assert!(!result.execution_passed);
        assert_eq!(result.execution.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.execution.duration, timeout);
        assert_eq!(result.execution.stderr, "Timed out after 0.3s");
    }

    #[tokio::test]
    async fn test_whole_second_timeout_message() {
        assert_eq!(
            ProcessError::Timeout(Duration::from_secs(60)).to_string(),
            "Timed out after 60s"
        );
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_captured() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage {
            lint: None,
            interpreter: "repcheck-no-such-interpreter",
        };
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, false).await;
        assert!(!result.execution_passed);
        assert!(!result.execution.timed_out);
        assert_eq!(result.execution.exit_code, NO_EXIT_CODE);
        assert!(result.execution.stderr.contains("failed to start"));
    }

    #[tokio::test]
    async fn test_lint_disabled_ignores_failing_linter() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage::with_lint("false", &[]);
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, false).await;
        assert!(result.lint.is_none());
        assert!(result.overall_passed);
    }

    #[tokio::test]
    async fn test_lint_failure_fails_overall_only() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage::with_lint("sh", &["-c", "echo 'line too long'; exit 1"]);
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, true).await;
        let lint = result.lint.as_ref().unwrap();
        assert!(!lint.passed);
        assert_eq!(lint.output, "line too long\n");
        assert!(result.execution_passed);
        assert!(!result.overall_passed);
    }

    #[tokio::test]
    async fn test_clean_lint_reports_no_issues() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage::with_lint("true", &[]);
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, true).await;
        let lint = result.lint.unwrap();
        assert!(lint.passed);
        assert_eq!(lint.output, "No linting issues found");
        assert!(result.overall_passed);
    }

    #[tokio::test]
    async fn test_missing_lint_tool_is_not_penalized() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage::with_lint("repcheck-no-such-linter", &[]);
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let result = checker.check(&script, true).await;
        let lint = result.lint.unwrap();
        assert!(lint.passed);
        assert_eq!(lint.output, "repcheck-no-such-linter not available, skipping lint");
        assert!(result.overall_passed);
    }

    #[tokio::test]
    async fn test_lint_timeout_fails_lint() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "a.sh", "exit 0\n");
        let lang = ShellLanguage::with_lint("sleep", &["5"]);
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10))
            .with_lint_timeout(Duration::from_millis(200));

        let result = checker.check(&script, true).await;
        let lint = result.lint.as_ref().unwrap();
        assert!(!lint.passed);
        assert!(lint.output.starts_with("Linting failed: Timed out"));
        assert!(result.execution_passed);
    }

    #[tokio::test]
    async fn test_check_all_tags_positions() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write_script(tmp.path(), "a.sh", "exit 0\n");
        let b = write_script(tmp.path(), "b.sh", "exit 1\n");
        let lang = ShellLanguage::new();
        let checker = ScriptChecker::new(&lang, Duration::from_secs(10));

        let results = checker.check_all(&[b.clone(), a.clone()], false).await;
        assert_eq!(results.len(), 2);
        assert_eq!((results[0].path.clone(), results[0].order), (b, 1));
        assert_eq!((results[1].path.clone(), results[1].order), (a, 2));
        assert!(!results[0].overall_passed);
        assert!(results[1].overall_passed);
    }
}
