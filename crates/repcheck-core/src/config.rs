use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::Language;

pub const CONFIG_FILE: &str = ".repcheck.toml";

/// Top-level configuration from `.repcheck.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub language: Language,
    /// Include globs. Empty means the language's defaults.
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Per-script lint and execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub lint: bool,
    #[serde(default = "default_lint_timeout_secs")]
    pub lint_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_lint_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            lint: true,
            lint_timeout_secs: default_lint_timeout_secs(),
        }
    }
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint_timeout_secs)
    }
}

/// Local language-model service used to explain failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "granite3.3:2b".to_string()
}

fn default_temperature() -> f64 {
    0.8
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            probe_timeout_secs: default_probe_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a `.repcheck.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `repcheck init` to create a valid config file",
                path.display()
            )
        })?;
        config
            .validate()
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Reject values that would make every check fail.
    pub fn validate(&self) -> Result<()> {
        if self.check.timeout_secs == 0 {
            anyhow::bail!("check.timeout_secs must be at least 1");
        }
        if self.check.lint_timeout_secs == 0 {
            anyhow::bail!("check.lint_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Load from `.repcheck.toml` in the given directory or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Self {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let config_path = current.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => {
                        tracing::debug!(path = %config_path.display(), "loaded config");
                        config
                    }
                    Err(e) => {
                        tracing::warn!(
                            "failed to load config from '{}': {e:#}. Using defaults.",
                            config_path.display()
                        );
                        Self::default()
                    }
                };
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Self::default()
    }

    /// Generate default TOML content for `repcheck init`.
    pub fn default_toml() -> String {
        r#"# repcheck - script reproducibility checks

[project]
# One of: "python", "r"
language = "python"
# Globs (relative to the checked directory). Empty uses the language default:
# python = ["**/*.py"], r = ["**/*.[Rr]"]
include = []
exclude = ["**/venv/**", "**/.venv/**", "**/renv/**"]

[check]
# Per-script wall-clock limit; timed out scripts fail with exit code 124
timeout_secs = 60
lint = true
lint_timeout_secs = 30

[advisor]
# Ask a local Ollama server to explain failing scripts (never affects pass/fail)
enabled = true
base_url = "http://localhost:11434"
model = "granite3.3:2b"
temperature = 0.8
probe_timeout_secs = 3
request_timeout_secs = 30
"#
        .to_string()
    }
}
