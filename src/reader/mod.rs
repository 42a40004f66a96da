pub mod cli;
pub mod recorded;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub use cli::CliReader;
pub use recorded::RecordedReader;
pub use rest::RestReader;

/// Result type for reader operations
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Errors a control-plane read can produce. The four classes drive the
/// engine's policy: only `Transient` is retried; the rest surface
/// immediately as that call's failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReaderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("unknown: {0}")]
    Unknown(String),
}

impl ReaderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReaderError::Transient(_))
    }

    pub fn class(&self) -> &'static str {
        match self {
            ReaderError::NotFound(_) => "not_found",
            ReaderError::Forbidden(_) => "forbidden",
            ReaderError::Transient(_) => "transient",
            ReaderError::Unknown(_) => "unknown",
        }
    }
}

impl From<std::io::Error> for ReaderError {
    fn from(err: std::io::Error) -> Self {
        ReaderError::Unknown(err.to_string())
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Unknown(format!("malformed response: {}", err))
    }
}

/// The closed set of control-plane reads the engine performs. Every
/// request resolves to a single read-only call; the engine never issues
/// a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// The workspace document itself.
    Workspace {
        name: String,
        resource_group: String,
    },
    /// Managed-network outbound rules of a workspace.
    OutboundRules {
        workspace: String,
        resource_group: String,
    },
    /// Private endpoints in a resource group.
    PrivateEndpoints { resource_group: String },
    /// Compute targets attached to a workspace.
    Computes {
        workspace: String,
        resource_group: String,
    },
    /// Service connections attached to a workspace.
    Connections {
        workspace: String,
        resource_group: String,
    },
    /// An arbitrary resource by its full identifier.
    Resource { id: String },
    /// Diagnostic settings attached to a resource.
    DiagnosticSettings { resource_id: String },
}

impl ReadRequest {
    /// Stable key used by the recorded reader's file layout and by logs.
    pub fn cache_key(&self) -> String {
        fn slug(s: &str) -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect::<String>()
                .trim_matches('-')
                .to_string()
        }
        match self {
            ReadRequest::Workspace { name, .. } => format!("workspace_{}", slug(name)),
            ReadRequest::OutboundRules { workspace, .. } => {
                format!("outbound-rules_{}", slug(workspace))
            }
            ReadRequest::PrivateEndpoints { resource_group } => {
                format!("private-endpoints_{}", slug(resource_group))
            }
            ReadRequest::Computes { workspace, .. } => format!("computes_{}", slug(workspace)),
            ReadRequest::Connections { workspace, .. } => {
                format!("connections_{}", slug(workspace))
            }
            ReadRequest::Resource { id } => format!("resource_{}", slug(id)),
            ReadRequest::DiagnosticSettings { resource_id } => {
                format!("diagnostics_{}", slug(resource_id))
            }
        }
    }
}

/// Uniform read-only accessor over the cloud control plane.
///
/// Implementations are stateless and safe to share across any number of
/// concurrent analyzers (`Arc<dyn ResourceReader>`); they own no
/// session-scoped state.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Perform one read. Returns the raw resource description.
    async fn read(&self, request: &ReadRequest) -> ReaderResult<Value>;

    /// Cheap pre-flight check used by the validate-prerequisites step.
    async fn validate(&self) -> ReaderResult<()> {
        Ok(())
    }

    /// Reader name for logs and error messages.
    fn name(&self) -> &'static str;
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial call.
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry).
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry attempt (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Perform a read, retrying transient failures with exponential backoff.
/// Authorization and not-found errors are never retried.
pub async fn read_with_retry(
    reader: &dyn ResourceReader,
    request: &ReadRequest,
    policy: &RetryPolicy,
) -> ReaderResult<Value> {
    let mut attempt = 0u32;
    loop {
        match reader.read(request).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    "transient failure on {} (attempt {}/{}), retrying in {:?}: {}",
                    request.cache_key(),
                    attempt + 1,
                    policy.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!("read {} failed: {} ({})", request.cache_key(), err, err.class());
                return Err(err);
            }
        }
    }
}
