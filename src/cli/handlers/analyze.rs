use crate::analysis::{Pipeline, ProgressSender};
use crate::cli::commands::KindArg;
use crate::cli::utils::build_reader;
use crate::config::AppConfig;
use crate::model::{AnalysisSession, AnalysisStep, StepStatus};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

#[allow(clippy::too_many_arguments)]
pub async fn handle_analyze_command(
    workspace: String,
    resource_group: String,
    subscription: Option<String>,
    kind: KindArg,
    offline: Option<PathBuf>,
    output: Option<PathBuf>,
    html: bool,
    archive: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(dir) = output {
        config.reports_dir = dir;
    }

    let reader = build_reader(subscription.as_deref(), offline.as_deref())?;
    let session = AnalysisSession::new(workspace, resource_group, subscription, kind.into());
    info!("run id: {}", session.run_id);

    // Live progress display; the engine only writes events to the channel.
    let (progress, mut events) = ProgressSender::channel();
    let bar = ProgressBar::new(AnalysisStep::ALL.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{pos}/{len}] {msg}")
            .expect("valid progress template"),
    );
    let display = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.status {
                StepStatus::Running => bar.set_message(event.message),
                status if status.is_terminal() => {
                    bar.inc(1);
                    if status == StepStatus::Failed {
                        bar.println(format!("  ✗ {}: {}", event.step_name, event.message));
                    }
                }
                _ => {}
            }
        }
        bar.finish_and_clear();
    });

    // Ctrl-C requests a graceful stop: in-flight reads finish or time out
    // and the run freezes as aborted.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, finishing in-flight calls");
            let _ = cancel_tx.send(true);
        }
    });

    let report_options = crate::report::ReportOptions {
        directory: config.reports_dir.clone(),
        html,
        archive,
    };
    let pipeline = Pipeline::new(reader, config)
        .with_progress(progress)
        .with_cancellation(cancel_rx)
        .with_report_options(report_options.clone());

    let result = pipeline.run(session).await;
    // Dropping the pipeline closes the last progress sender so the
    // display task drains and exits.
    drop(pipeline);
    let _ = display.await;

    // A fatal abort skips the generate-report step; still persist a
    // best-effort report noting the abort point.
    let report_skipped = result
        .outcome(AnalysisStep::GenerateReport)
        .map(|o| o.status == StepStatus::Skipped)
        .unwrap_or(true);
    if report_skipped {
        match crate::report::ReportSet::new(report_options).write(&result) {
            Ok(written) => info!(
                "best-effort report for aborted run saved to {}",
                written.markdown_path.display()
            ),
            Err(err) => warn!("could not write report for aborted run: {}", err),
        }
    }

    crate::report::terminal::TerminalReporter::new().print_result(&result);

    if result.success {
        Ok(())
    } else {
        // The report was still generated; the exit status reports the
        // run's own outcome.
        Err(anyhow::anyhow!(
            "analysis completed with failures; see the issues section of the report"
        ))
    }
}
