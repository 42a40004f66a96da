use crate::analysis::ProgressSender;
use crate::cli::commands::KindArg;
use crate::cli::utils::build_reader;
use crate::compare::ComparisonEngine;
use crate::config::AppConfig;
use crate::model::AnalysisSession;
use crate::report::markdown;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

#[allow(clippy::too_many_arguments)]
pub async fn handle_compare_command(
    workspace_a: String,
    resource_group_a: String,
    workspace_b: String,
    resource_group_b: Option<String>,
    subscription: Option<String>,
    kind: KindArg,
    offline: Option<PathBuf>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let reader = build_reader(subscription.as_deref(), offline.as_deref())?;

    let session_a = AnalysisSession::new(
        workspace_a.clone(),
        resource_group_a.clone(),
        subscription.clone(),
        kind.into(),
    );
    let session_b = AnalysisSession::new(
        workspace_b.clone(),
        resource_group_b.unwrap_or(resource_group_a),
        subscription,
        kind.into(),
    );

    // One line per step transition, prefixed per side; the two runs
    // interleave freely.
    let (progress_a, mut events_a) = ProgressSender::channel();
    let (progress_b, mut events_b) = ProgressSender::channel();
    let printer_a = {
        let name = workspace_a.clone();
        tokio::spawn(async move {
            while let Some(event) = events_a.recv().await {
                println!(
                    "[A:{}] [{}/{}] {}",
                    name, event.step_index, event.total_steps, event.message
                );
            }
        })
    };
    let printer_b = {
        let name = workspace_b.clone();
        tokio::spawn(async move {
            while let Some(event) = events_b.recv().await {
                println!(
                    "[B:{}] [{}/{}] {}",
                    name, event.step_index, event.total_steps, event.message
                );
            }
        })
    };

    let engine = ComparisonEngine::new(reader, config).with_progress(progress_a, progress_b);
    let comparison = engine.compare(session_a, session_b).await;
    // Closes the engine's progress senders so both printers drain and exit.
    drop(engine);
    let _ = printer_a.await;
    let _ = printer_b.await;

    crate::report::terminal::TerminalReporter::new().print_comparison(&comparison);

    if let Some(path) = output {
        let rendered = markdown::render_comparison(&comparison)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, rendered)
            .with_context(|| format!("failed to write comparison report to {}", path.display()))?;
        info!("comparison report saved to {}", path.display());
    }

    if comparison.left.success && comparison.right.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "one or both analyses completed with failures; the comparison covers partial data"
        ))
    }
}
