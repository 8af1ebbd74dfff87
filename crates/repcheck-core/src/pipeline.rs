use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::advisor::OllamaAdvisor;
use crate::analyzer::ScriptLanguage;
use crate::checker::ScriptChecker;
use crate::config::Config;
use crate::discovery::discover_scripts;
use crate::graph::{DependencyGraph, ExecutionOrder};
use crate::types::{Language, Report};

/// Options for one `check` run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Include globs. Empty means the language's defaults.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub lint: bool,
    pub timeout: Duration,
    pub lint_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            lint: true,
            timeout: ScriptChecker::DEFAULT_TIMEOUT,
            lint_timeout: ScriptChecker::DEFAULT_LINT_TIMEOUT,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            include: config.project.include.clone(),
            exclude: config.project.exclude.clone(),
            lint: config.check.lint,
            timeout: config.check.timeout(),
            lint_timeout: config.check.lint_timeout(),
        }
    }
}

/// Discovery, dependency graph and order for a project, before anything runs.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub root: PathBuf,
    pub language: Language,
    /// Discovered scripts, sorted by path.
    pub scripts: Vec<PathBuf>,
    /// Direct dependencies of each script, restricted to `scripts`.
    pub dependencies: BTreeMap<PathBuf, Vec<PathBuf>>,
    pub order: ExecutionOrder,
    pub cycles: Vec<Vec<PathBuf>>,
}

impl ExecutionPlan {
    pub fn has_circular_dependency(&self) -> bool {
        self.order.is_cycle()
    }

    /// Scripts in the order they will be checked: the topological order, or
    /// discovery order when a cycle blocks it. Never contains duplicates.
    pub fn run_order(&self) -> Vec<PathBuf> {
        let chosen = match &self.order {
            ExecutionOrder::Ordered { scripts } => scripts.as_slice(),
            ExecutionOrder::Cycle { .. } => self.scripts.as_slice(),
        };
        let mut seen = HashSet::with_capacity(chosen.len());
        chosen
            .iter()
            .filter(|p| seen.insert(p.as_path()))
            .cloned()
            .collect()
    }
}

/// Drives discovery, ordering and checking for one language.
pub struct Orchestrator {
    language: Box<dyn ScriptLanguage>,
    advisor: Option<OllamaAdvisor>,
}

impl Orchestrator {
    pub fn new(language: Box<dyn ScriptLanguage>) -> Self {
        Self {
            language,
            advisor: None,
        }
    }

    /// Attach a failure advisor, owned for the lifetime of the orchestrator.
    pub fn with_advisor(mut self, advisor: OllamaAdvisor) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn language(&self) -> Language {
        self.language.language()
    }

    fn include_patterns(&self, include: &[String]) -> Vec<String> {
        if include.is_empty() {
            self.language
                .default_patterns()
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            include.to_vec()
        }
    }

    /// Discover scripts under `root` and work out a safe order for them.
    pub fn plan(&self, root: &Path, include: &[String], exclude: &[String]) -> Result<ExecutionPlan> {
        let include = self.include_patterns(include);
        let scripts = discover_scripts(root, &include, exclude)?;

        let graph = DependencyGraph::build(&scripts, self.language.as_ref());
        let order = graph.sort();
        let cycles = graph.find_cycles();

        if order.is_cycle() {
            tracing::warn!(
                groups = cycles.len(),
                "circular dependency detected, falling back to discovery order"
            );
        }

        Ok(ExecutionPlan {
            root: root.to_path_buf(),
            language: self.language(),
            scripts,
            dependencies: graph.dependency_map(),
            order,
            cycles,
        })
    }

    /// Check every script under `root` and summarize the results.
    ///
    /// Only discovery problems (missing root, invalid globs) are errors; any
    /// failure of an individual script is recorded in the report.
    pub async fn run(&self, root: &Path, options: &RunOptions) -> Result<Report> {
        let started_at = Utc::now();
        let plan = self.plan(root, &options.include, &options.exclude)?;
        let order = plan.run_order();
        tracing::info!(
            root = %root.display(),
            scripts = order.len(),
            language = %self.language(),
            "checking scripts"
        );

        let checker = ScriptChecker::new(self.language.as_ref(), options.timeout)
            .with_lint_timeout(options.lint_timeout);
        let mut results = checker.check_all(&order, options.lint).await;

        if let Some(advisor) = &self.advisor {
            let failing: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, r)| !r.execution_passed)
                .map(|(i, _)| i)
                .collect();
            if !failing.is_empty() && advisor.is_available().await {
                for i in failing {
                    let result = &results[i];
                    let error = if result.execution.stderr.trim().is_empty() {
                        &result.execution.stdout
                    } else {
                        &result.execution.stderr
                    };
                    let explanation = advisor.explain(&result.path, error, self.language()).await;
                    results[i].explanation = explanation;
                }
            }
        }

        let report = Report::new(
            root.to_path_buf(),
            self.language(),
            started_at,
            results,
            plan.has_circular_dependency(),
            plan.cycles,
        );
        tracing::info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            "check finished"
        );
        Ok(report)
    }
}
