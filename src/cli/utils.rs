use crate::reader::{CliReader, RecordedReader, ResourceReader, RestReader};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(verbose: bool, log_format: &str) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let fmt_layer = if log_format == "json" {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .expect("Failed to initialize tracing subscriber");
}

pub fn print_info() {
    println!("netpilot v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("License: {}", env!("CARGO_PKG_LICENSE"));
    println!("For more information, visit: {}", env!("CARGO_PKG_REPOSITORY"));
}

/// Pick the control-plane backend: recorded responses when `--offline`
/// was given, the ARM REST reader when an access token is configured,
/// the `az` CLI otherwise.
pub fn build_reader(
    subscription: Option<&str>,
    offline: Option<&Path>,
) -> Result<Arc<dyn ResourceReader>> {
    if let Some(dir) = offline {
        let reader = RecordedReader::from_dir(dir)
            .with_context(|| format!("failed to load recordings from {}", dir.display()))?;
        info!("using recorded responses from {}", dir.display());
        return Ok(Arc::new(reader));
    }

    if let Some(reader) = RestReader::from_env(subscription) {
        info!("using the resource-manager REST API");
        return Ok(Arc::new(reader));
    }

    info!("using the az CLI");
    Ok(Arc::new(CliReader::new(subscription.map(str::to_string))))
}
