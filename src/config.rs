use crate::reader::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Factor weights for the per-resource security score. Each weight is the
/// fraction of the final score contributed by that factor; they are
/// expected to sum to 1.0. The defaults are a starting configuration and
/// can be tuned through the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub private_endpoint: f64,
    pub public_access: f64,
    pub isolation: f64,
    pub secure_defaults: f64,
    pub diagnostics: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            private_endpoint: 0.30,
            public_access: 0.25,
            isolation: 0.20,
            secure_defaults: 0.15,
            diagnostics: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.private_endpoint
            + self.public_access
            + self.isolation
            + self.secure_defaults
            + self.diagnostics
    }

    /// Combined weight of the factors derivable from network state alone,
    /// used to normalize the zero-resource aggregate.
    pub fn network_factor_total(&self) -> f64 {
        self.private_endpoint + self.public_access + self.isolation
    }
}

/// Tool configuration, layered file < environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory reports are written into.
    pub reports_dir: PathBuf,

    /// Worker cap for concurrent per-resource analysis calls.
    pub max_concurrent_reads: usize,

    /// Per remote call timeout in seconds.
    pub call_timeout_secs: u64,

    /// Retry attempts for transient remote failures.
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles each retry).
    pub initial_backoff_ms: u64,

    pub weights: ScoringWeights,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("connectivity-reports"),
            max_concurrent_reads: 4,
            call_timeout_secs: 30,
            max_retries: 3,
            initial_backoff_ms: 500,
            weights: ScoringWeights::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: explicit `--config` path, else the user config
    /// file if present, else defaults. Environment variables override the
    /// file in either case.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)
                    .with_context(|| format!("failed to load config from {}", path.display()))?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<config_dir>/netpilot/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("netpilot").join("config.yaml"))
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("NETPILOT_REPORTS_DIR") {
            if !dir.is_empty() {
                self.reports_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = env::var("NETPILOT_MAX_CONCURRENCY") {
            if let Ok(parsed) = value.parse::<usize>() {
                if parsed > 0 {
                    self.max_concurrent_reads = parsed;
                }
            }
        }
        if let Ok(value) = env::var("NETPILOT_CALL_TIMEOUT_SECS") {
            if let Ok(parsed) = value.parse::<u64>() {
                self.call_timeout_secs = parsed;
            }
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}
