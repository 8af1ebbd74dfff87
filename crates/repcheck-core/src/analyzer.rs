use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;

use crate::types::Language;

/// An external program invocation (interpreter or lint tool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Capability each supported script language implements.
pub trait ScriptLanguage: Send + Sync {
    /// Language tag this implementation serves.
    fn language(&self) -> Language;

    /// Include globs used when the caller gives none (e.g., `&["**/*.py"]`).
    fn default_patterns(&self) -> &[&str];

    /// Read and analyze one script, returning the absolute paths it references.
    fn extract_dependencies(&self, path: &Path) -> Result<BTreeSet<PathBuf>>;

    /// Command that lints `path`, or `None` if the language has no linter.
    fn lint_command(&self, path: &Path) -> Option<ToolCommand>;

    /// Command that runs a script given its bare file name, from its own directory.
    fn run_command(&self, file_name: &str) -> ToolCommand;

    /// Dependencies of `path`; analysis failures degrade to an empty set.
    fn dependencies(&self, path: &Path) -> BTreeSet<PathBuf> {
        match self.extract_dependencies(path) {
            Ok(deps) => deps,
            Err(e) => {
                tracing::debug!(
                    script = %path.display(),
                    "dependency extraction failed, assuming none: {e:#}"
                );
                BTreeSet::new()
            }
        }
    }
}

/// Resolve a path referenced from a script living in `dir`.
///
/// Relative references are joined onto `dir`. The result is canonicalized
/// when the target exists, otherwise lexically normalized.
pub fn resolve_reference(dir: &Path, reference: &Path) -> PathBuf {
    let joined = if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        dir.join(reference)
    };
    joined
        .canonicalize()
        .unwrap_or_else(|_| normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
