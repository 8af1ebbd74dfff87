use std::path::PathBuf;

use serde::Serialize;

use repcheck_core::pipeline::ExecutionPlan;
use repcheck_core::types::Report;

/// Wrapper for check output that adds pass/fail metadata.
#[derive(Debug, Serialize)]
pub struct CheckOutput<'a> {
    #[serde(flatten)]
    pub report: &'a Report,
    pub check: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub passed: bool,
    pub success_rate: f64,
}

/// Format a check report as JSON, report fields at the top level.
pub fn format_report(report: &Report, compact: bool) -> serde_json::Result<String> {
    let output = CheckOutput {
        report,
        check: CheckStatus {
            passed: report.all_passed(),
            success_rate: (report.success_rate() * 10.0).round() / 10.0,
        },
    };
    to_json(&output, compact)
}

/// Plan plus the order scripts will actually run in.
#[derive(Debug, Serialize)]
pub struct PlanOutput<'a> {
    #[serde(flatten)]
    pub plan: &'a ExecutionPlan,
    pub has_circular_dependency: bool,
    pub run_order: Vec<PathBuf>,
}

/// Format an execution plan as JSON.
pub fn format_plan(plan: &ExecutionPlan, compact: bool) -> serde_json::Result<String> {
    let output = PlanOutput {
        plan,
        has_circular_dependency: plan.has_circular_dependency(),
        run_order: plan.run_order(),
    };
    to_json(&output, compact)
}

fn to_json<T: Serialize>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}
