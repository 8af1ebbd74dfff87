use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use repcheck_core::analyzer::{resolve_reference, ScriptLanguage, ToolCommand};
use repcheck_core::types::Language;

/// R script support: `source()` scanning, lintr, Rscript.
///
/// Dependency extraction is purely textual. Every `source("...")` call with
/// a literal path counts, including ones inside comments or dead branches.
pub struct RLanguage {
    source_call: Regex,
}

impl RLanguage {
    pub fn new() -> Result<Self> {
        let source_call = Regex::new(r#"(?i)source\s*\(\s*["']([^"']+)["']"#)
            .context("failed to compile source() pattern")?;
        Ok(Self { source_call })
    }

    /// Literal paths passed to `source()`, in order of appearance.
    fn sourced_paths<'a>(&self, content: &'a str) -> Vec<&'a str> {
        self.source_call
            .captures_iter(content)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }
}

impl ScriptLanguage for RLanguage {
    fn language(&self) -> Language {
        Language::R
    }

    fn default_patterns(&self) -> &[&str] {
        &["**/*.[Rr]"]
    }

    fn extract_dependencies(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(self
            .sourced_paths(&content)
            .into_iter()
            .map(|reference| resolve_reference(dir, Path::new(reference)))
            .collect())
    }

    fn lint_command(&self, path: &Path) -> Option<ToolCommand> {
        Some(ToolCommand::new("Rscript", ["-e".to_string(), lintr_program(path)]))
    }

    fn run_command(&self, file_name: &str) -> ToolCommand {
        ToolCommand::new("Rscript", ["--vanilla", file_name])
    }
}

/// R program that lints `path` with lintr, exiting 1 on findings. A missing
/// lintr package prints a notice and exits 0.
fn lintr_program(path: &Path) -> String {
    let literal = r_string_literal(&path.to_string_lossy());
    format!(
        r#"if (requireNamespace("lintr", quietly = TRUE)) {{
  results <- lintr::lint({literal})
  if (length(results) > 0) {{
    for (r in results) print(r)
    quit(status = 1)
  }} else {{
    cat("No linting issues found\n")
  }}
}} else {{
  cat("lintr package not available\n")
}}"#
    )
}

fn r_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
