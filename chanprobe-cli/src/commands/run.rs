//! `chanprobe run` command handler

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use tracing::{info, warn};

use chanprobe_core::config::ChanprobeConfig;
use chanprobe_harness::{
    MatrixReport, ScenarioOutcome, ScenarioResult, TestMatrixRunner, TestMatrixRunnerBuilder,
};
use chanprobe_memory_cluster::{MemoryCluster, MemoryClusterConfig};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

type MemoryRunner = TestMatrixRunner<MemoryCluster, MemoryCluster, MemoryCluster>;

/// Execute the `run` command.
///
/// Runs the selected matrix against the in-memory reference cluster and
/// renders the report. Ctrl-C cancels pending waits; teardown still runs.
///
/// # Errors
///
/// Returns `CliError::ScenarioFailures` when at least one cell failed.
pub async fn execute(
    args: RunArgs,
    config: &ChanprobeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mut selection = super::select(config, &args.selection)?;
    if let Some(max_parallel) = args.max_parallel {
        selection.options.max_parallel = max_parallel;
        selection.options.validate()?;
    }

    let cluster = Arc::new(MemoryCluster::new(MemoryClusterConfig::from_core(
        &config.memory,
    )?));
    let runner: MemoryRunner = TestMatrixRunnerBuilder::new().backend(cluster).build()?;

    let cancel = runner.cancel_token();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling matrix run");
            cancel.cancel();
        }
    });

    info!(
        channels = selection.channels.len(),
        versions = selection.versions.len(),
        max_parallel = selection.options.max_parallel,
        "starting matrix run"
    );
    let report = runner
        .run(&selection.channels, &selection.versions, &selection.options)
        .await;
    signal.abort();

    info!(
        passed = report.passed,
        failed = report.failed,
        skipped = report.skipped,
        "matrix run finished"
    );
    let (failed, total) = (report.failed, report.results.len());
    writer.render(&RunReport(report))?;

    if failed > 0 {
        return Err(CliError::ScenarioFailures { failed, total });
    }
    Ok(())
}

/// Rendered form of a [`MatrixReport`].
#[derive(serde::Serialize)]
#[serde(transparent)]
pub struct RunReport(pub MatrixReport);

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let report = &self.0;
        writeln!(w, "Matrix Run: {} cells", report.results.len())?;
        writeln!(w)?;

        for result in &report.results {
            render_result(w, result)?;
        }

        writeln!(w)?;
        let summary = format!(
            "{} passed, {} failed, {} skipped",
            report.passed, report.failed, report.skipped
        );
        if report.is_success() {
            writeln!(w, "Result: {} ({})", "PASSED".green().bold(), summary)?;
        } else {
            writeln!(w, "Result: {} ({})", "FAILED".red().bold(), summary)?;
        }
        Ok(())
    }
}

fn render_result(w: &mut dyn Write, result: &ScenarioResult) -> std::io::Result<()> {
    let status = match &result.outcome {
        ScenarioOutcome::Passed { .. } => "PASSED ".green().bold(),
        ScenarioOutcome::Failed { .. } => "FAILED ".red().bold(),
        ScenarioOutcome::Skipped { .. } => "SKIPPED".yellow().bold(),
    };
    writeln!(
        w,
        "  #{:<3} {} {} [{:.2}s]",
        result.index,
        status,
        result.cell,
        result.elapsed.as_secs_f64()
    )?;

    match &result.outcome {
        ScenarioOutcome::Passed { verification } => {
            writeln!(
                w,
                "        delivered after {:.2}s ({} attempt(s), {} copy(ies))",
                verification.observed_after.as_secs_f64(),
                verification.attempts,
                verification.occurrences
            )?;
        }
        ScenarioOutcome::Failed { step, error } => {
            let side = if error.is_infrastructure() {
                "infrastructure"
            } else {
                "channel"
            };
            writeln!(w, "        step: {step} ({side})")?;
            writeln!(w, "        error: {}", error.to_string().red())?;
        }
        ScenarioOutcome::Skipped { reason } => {
            writeln!(w, "        reason: {reason}")?;
        }
    }

    if let Some(payload) = &result.payload {
        writeln!(w, "        payload: {payload}")?;
    }
    writeln!(w, "        resources: {}", result.names)?;
    for failure in &result.teardown_failures {
        writeln!(
            w,
            "        teardown: {} {}",
            failure.resource,
            failure.reason.yellow()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chanprobe_core::error::{ScenarioError, ScenarioStep};
    use chanprobe_core::types::{ChannelDescriptor, SubscriptionVersion};
    use chanprobe_harness::{RunOptions, SkipReason, plan_matrix};

    fn report() -> MatrixReport {
        let plan = plan_matrix(
            &[ChannelDescriptor::new(
                "InMemoryChannel",
                "messaging.knative.dev/v1beta1",
            )],
            &[SubscriptionVersion::V1Alpha1, SubscriptionVersion::V1Beta1],
            &RunOptions::default(),
        );
        let mut results: Vec<_> = plan
            .into_iter()
            .map(|e| ScenarioResult::skipped(e.scenario, SkipReason::Duplicate { first_index: 0 }))
            .collect();
        results[0].payload = Some("3f2a".to_owned());
        results[0].outcome = ScenarioOutcome::Failed {
            step: ScenarioStep::Verify,
            error: ScenarioError::DeliveryNotObserved {
                payload: "3f2a".to_owned(),
                attempts: 5,
                elapsed: Duration::from_secs(10),
                snippet: None,
            },
        };
        MatrixReport::from_results(results)
    }

    #[test]
    fn text_report_lists_every_cell_and_summary() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        RunReport(report())
            .render_text(&mut buffer)
            .expect("text rendering should succeed");

        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("Matrix Run: 2 cells"));
        assert!(output.contains("#0   FAILED"));
        assert!(output.contains("step: verify (channel)"));
        assert!(output.contains("payload: 3f2a"));
        assert!(output.contains("#1   SKIPPED"));
        assert!(output.contains("reason: duplicate of matrix cell #0"));
        assert!(output.contains("Result: FAILED (0 passed, 1 failed, 1 skipped)"));
    }

    #[test]
    fn json_report_is_the_matrix_report() {
        let json = serde_json::to_value(RunReport(report())).expect("should serialize");
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["outcome"]["status"], "failed");
        assert_eq!(json["results"][1]["outcome"]["reason"]["kind"], "duplicate");
    }
}
