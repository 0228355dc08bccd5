//! Diagnostics rendering and the JSON run receipt.

use crate::Clock;
use divergate_domain::classify_result;
use divergate_types::{
    HostInfo, RunMeta, RunReceipt, TestReport, TestResult, ToolInfo, Variant, VariantOutcome,
    VariantReport, RUN_SCHEMA_V1,
};

/// Full per-variant diagnostic block for an unexpectedly failed test.
pub fn render_failure(result: &TestResult) -> String {
    let mut out = format!("Test \"{}\" failed:", result.name);
    push_outcomes(&mut out, result);
    out
}

/// The same block without the failure framing, for verbose runs.
pub fn render_result(result: &TestResult) -> String {
    let mut out = format!("Test \"{}\" ({}):", result.name, classify_result(result));
    push_outcomes(&mut out, result);
    out
}

fn push_outcomes(out: &mut String, result: &TestResult) {
    for (variant, outcome) in &result.outcomes {
        out.push_str(&format!("\n\t{variant} result: {}", render_outcome(outcome)));
    }
}

fn render_outcome(outcome: &VariantOutcome) -> String {
    match outcome {
        VariantOutcome::Completed(r) => format!(
            "exit code {}, stdout: {:?}, stderr: {:?}",
            r.exit_code(),
            r.stdout_lossy(),
            r.stderr_lossy()
        ),
        VariantOutcome::SpawnFailed(reason) => format!("failed to launch: {reason}"),
        VariantOutcome::TimedOut => "timed out".to_string(),
    }
}

/// Assemble the versioned receipt for one finished run.
pub fn build_receipt<C: Clock>(
    clock: &C,
    tool: ToolInfo,
    started_at: String,
    results: &[TestResult],
) -> RunReceipt {
    let summary = divergate_domain::summarize(results);
    RunReceipt {
        schema: RUN_SCHEMA_V1.to_string(),
        tool,
        run: RunMeta {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
            ended_at: clock.now_rfc3339(),
            host: HostInfo {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            },
        },
        summary: summary.counts(),
        tests: results.iter().map(test_report).collect(),
    }
}

fn test_report(result: &TestResult) -> TestReport {
    TestReport {
        name: result.name.clone(),
        bucket: classify_result(result),
        failure_expected: result.failure_expected,
        variants: result
            .outcomes
            .iter()
            .map(|(variant, outcome)| variant_report(*variant, outcome))
            .collect(),
    }
}

fn variant_report(variant: Variant, outcome: &VariantOutcome) -> VariantReport {
    match outcome {
        VariantOutcome::Completed(r) => VariantReport {
            variant,
            status: "completed".to_string(),
            exit_code: Some(r.exit_code()),
            stdout: Some(r.stdout_lossy()),
            stderr: Some(r.stderr_lossy()),
            error: None,
        },
        VariantOutcome::SpawnFailed(reason) => VariantReport {
            variant,
            status: "spawn_failed".to_string(),
            exit_code: None,
            stdout: None,
            stderr: None,
            error: Some(reason.clone()),
        },
        VariantOutcome::TimedOut => VariantReport {
            variant,
            status: "timed_out".to_string(),
            exit_code: None,
            stdout: None,
            stderr: None,
            error: None,
        },
    }
}
