use std::collections::HashSet;
use std::path::{Path, PathBuf};

use colored::Colorize;

use repcheck_core::pipeline::ExecutionPlan;
use repcheck_core::types::{CheckResult, Report};

use crate::display_path;

/// Failure output longer than this is cut in the details section.
const DETAIL_LIMIT: usize = 200;

/// Format a full check report for terminal output.
pub fn format_report(report: &Report) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "repcheck - Reproducibility Check".bold()));
    out.push_str(&format!("{}\n", "=".repeat(40)));
    out.push_str(&format!(
        "{}: {} ({})\n",
        "Project".bold(),
        report.root.display(),
        report.language,
    ));

    if report.results.is_empty() {
        out.push_str(&format!("\n{}\n\n", "No scripts found.".yellow()));
        return out;
    }

    // Order
    if report.has_circular_dependency {
        out.push_str(&format_cycle_warning(&report.root, &report.cycles));
        out.push_str("  Scripts were run in discovery order.\n");
    } else {
        out.push_str(&format!("\n{}\n{}\n", "Execution Order".bold(), "-".repeat(40)));
        for r in &report.results {
            out.push_str(&format!(
                "  {}. {}\n",
                r.order,
                display_path(&report.root, &r.path)
            ));
        }
    }

    // Results table
    let width = script_column_width(&report.root, report.results.iter().map(|r| r.path.as_path()));
    out.push_str(&format!("\n{}\n{}\n", "Results".bold(), "-".repeat(40)));
    out.push_str(&format!(
        "  {:>3}  {:<width$}  {:<6}  {:<7}  {:>9}  {}\n",
        "#", "Script", "Lint", "Execute", "Duration", "Status"
    ));
    for r in &report.results {
        let lint = match &r.lint {
            None => format!("{:<6}", "SKIP").dimmed(),
            Some(l) => pass_fail(l.passed, 6),
        };
        let execute = if r.execution.timed_out {
            format!("{:<7}", "TIMEOUT").red()
        } else {
            pass_fail(r.execution_passed, 7)
        };
        out.push_str(&format!(
            "  {:>3}  {:<width$}  {}  {}  {:>8.2}s  {}\n",
            r.order,
            display_path(&report.root, &r.path),
            lint,
            execute,
            r.execution.duration.as_secs_f64(),
            pass_fail(r.overall_passed, 4),
        ));
    }

    // Failure details
    let failed: Vec<&CheckResult> = report.results.iter().filter(|r| !r.overall_passed).collect();
    if !failed.is_empty() {
        out.push_str(&format!(
            "\n{} ({})\n{}\n",
            "Failed Scripts".red().bold(),
            failed.len(),
            "-".repeat(40),
        ));
        for r in failed {
            out.push_str(&format_failure(&report.root, r));
        }
    }

    // Summary
    out.push_str(&format!(
        "\n{}: {}/{} scripts passed ({:.1}%)\n",
        "Summary".bold(),
        report.passed,
        report.total,
        report.success_rate(),
    ));
    if report.all_passed() {
        out.push_str(&format!("{}\n", "CHECK PASSED".green().bold()));
    } else {
        out.push_str(&format!(
            "{}: {} script(s) failed\n",
            "CHECK FAILED".red().bold(),
            report.failed
        ));
    }

    out.push('\n');
    out
}

fn format_failure(root: &Path, r: &CheckResult) -> String {
    let mut out = format!("\n  {}\n", display_path(root, &r.path).bold());

    if let Some(lint) = r.lint.as_ref().filter(|l| !l.passed) {
        out.push_str(&format!(
            "    {}: {}\n",
            "Lint".yellow(),
            truncate(lint.output.trim(), DETAIL_LIMIT)
        ));
    }

    if !r.execution_passed {
        out.push_str(&format!(
            "    {}: {} (exit code {})\n",
            "Command".dimmed(),
            r.execution.command,
            r.execution.exit_code
        ));
        let error = if r.execution.stderr.trim().is_empty() {
            r.execution.stdout.trim()
        } else {
            r.execution.stderr.trim()
        };
        if !error.is_empty() {
            out.push_str(&format!(
                "    {}: {}\n",
                "Error".red(),
                truncate(error, DETAIL_LIMIT)
            ));
        }
    }

    if let Some(ref explanation) = r.explanation {
        out.push_str(&format!("    {}: {}\n", "Suggestion".cyan(), explanation.trim()));
    }

    out
}

/// Format an execution plan as the `order` table.
pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} ({}, {} scripts)\n",
        "Execution Order".bold(),
        plan.language,
        plan.scripts.len()
    ));
    out.push_str(&format!("{}\n", "=".repeat(40)));

    if plan.scripts.is_empty() {
        out.push_str(&format!("{}\n\n", "No scripts found.".yellow()));
        return out;
    }

    let in_cycle: HashSet<&PathBuf> = plan.cycles.iter().flatten().collect();
    if plan.has_circular_dependency() {
        out.push_str(&format_cycle_warning(&plan.root, &plan.cycles));
        out.push_str("  Falling back to discovery order.\n\n");
    }

    let order = plan.run_order();
    let width = script_column_width(&plan.root, order.iter().map(PathBuf::as_path));
    out.push_str(&format!(
        "  {:>5}  {:<width$}  {}\n",
        "Order", "Script", "Dependencies"
    ));
    for (i, path) in order.iter().enumerate() {
        let deps = plan
            .dependencies
            .get(path)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.iter()
                    .map(|p| display_path(&plan.root, p))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "None".to_string());
        let marker = if in_cycle.contains(path) {
            format!(" {}", "[circular]".red())
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  {:>5}  {:<width$}  {}{}\n",
            i + 1,
            display_path(&plan.root, path),
            deps,
            marker
        ));
    }

    out.push('\n');
    out
}

fn format_cycle_warning(root: &Path, cycles: &[Vec<PathBuf>]) -> String {
    let mut out = format!(
        "\n{}\n",
        "WARNING: Circular dependency detected".yellow().bold()
    );
    for group in cycles {
        let names: Vec<String> = group.iter().map(|p| display_path(root, p)).collect();
        out.push_str(&format!("  cycle: {}\n", names.join(" <-> ")));
    }
    out
}

fn pass_fail(passed: bool, width: usize) -> colored::ColoredString {
    if passed {
        format!("{:<width$}", "PASS").green()
    } else {
        format!("{:<width$}", "FAIL").red()
    }
}

fn script_column_width<'a>(root: &Path, paths: impl Iterator<Item = &'a Path>) -> usize {
    paths
        .map(|p| display_path(root, p).chars().count())
        .max()
        .unwrap_or(0)
        .max("Script".len())
}

/// Cut `s` to at most `limit` characters, marking the cut with `...`.
fn truncate(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
