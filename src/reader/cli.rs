use super::{ReadRequest, ReaderError, ReaderResult, ResourceReader};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

/// Reader backed by the `az` command-line client.
///
/// Every request maps to one read-only `az ... show`/`list` invocation
/// with JSON output. Error classification is derived from the CLI's
/// stderr markers since the process exit code alone does not
/// distinguish failure causes.
pub struct CliReader {
    subscription_id: Option<String>,
}

impl CliReader {
    pub fn new(subscription_id: Option<String>) -> Self {
        Self { subscription_id }
    }

    fn args_for(&self, request: &ReadRequest) -> Vec<String> {
        let mut args: Vec<String> = match request {
            ReadRequest::Workspace {
                name,
                resource_group,
            } => vec![
                "ml".into(),
                "workspace".into(),
                "show".into(),
                "--name".into(),
                name.clone(),
                "--resource-group".into(),
                resource_group.clone(),
            ],
            ReadRequest::OutboundRules {
                workspace,
                resource_group,
            } => vec![
                "ml".into(),
                "workspace".into(),
                "outbound-rule".into(),
                "list".into(),
                "--workspace-name".into(),
                workspace.clone(),
                "--resource-group".into(),
                resource_group.clone(),
            ],
            ReadRequest::PrivateEndpoints { resource_group } => vec![
                "network".into(),
                "private-endpoint".into(),
                "list".into(),
                "--resource-group".into(),
                resource_group.clone(),
            ],
            ReadRequest::Computes {
                workspace,
                resource_group,
            } => vec![
                "ml".into(),
                "compute".into(),
                "list".into(),
                "--workspace-name".into(),
                workspace.clone(),
                "--resource-group".into(),
                resource_group.clone(),
            ],
            ReadRequest::Connections {
                workspace,
                resource_group,
            } => vec![
                "ml".into(),
                "connection".into(),
                "list".into(),
                "--workspace-name".into(),
                workspace.clone(),
                "--resource-group".into(),
                resource_group.clone(),
            ],
            ReadRequest::Resource { id } => vec![
                "resource".into(),
                "show".into(),
                "--ids".into(),
                id.clone(),
            ],
            ReadRequest::DiagnosticSettings { resource_id } => vec![
                "monitor".into(),
                "diagnostic-settings".into(),
                "list".into(),
                "--resource".into(),
                resource_id.clone(),
            ],
        };

        if let Some(subscription) = &self.subscription_id {
            args.push("--subscription".into());
            args.push(subscription.clone());
        }
        args.push("--output".into());
        args.push("json".into());
        args
    }

    /// Classify a non-zero exit from the CLI's stderr text.
    fn classify_stderr(stderr: &str) -> ReaderError {
        let lower = stderr.to_ascii_lowercase();
        if lower.contains("resourcenotfound")
            || lower.contains("resourcegroupnotfound")
            || lower.contains("was not found")
            || lower.contains("could not be found")
        {
            ReaderError::NotFound(first_line(stderr))
        } else if lower.contains("authorizationfailed")
            || lower.contains("authorization failed")
            || lower.contains("forbidden")
            || lower.contains("please run 'az login'")
        {
            ReaderError::Forbidden(first_line(stderr))
        } else if lower.contains("toomanyrequests")
            || lower.contains("429")
            || lower.contains("internalservererror")
            || lower.contains("serviceunavailable")
            || lower.contains("gatewaytimeout")
            || lower.contains("connection aborted")
            || lower.contains("timed out")
        {
            ReaderError::Transient(first_line(stderr))
        } else {
            ReaderError::Unknown(first_line(stderr))
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("command failed")
        .trim()
        .to_string()
}

#[async_trait]
impl ResourceReader for CliReader {
    async fn read(&self, request: &ReadRequest) -> ReaderResult<Value> {
        let args = self.args_for(request);
        debug!("az {}", args.join(" "));

        let output = Command::new("az")
            .args(&args)
            .output()
            .await
            .map_err(|e| ReaderError::Unknown(format!("failed to launch az: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify_stderr(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: Value = serde_json::from_str(stdout.trim())?;
        Ok(value)
    }

    async fn validate(&self) -> ReaderResult<()> {
        let output = Command::new("az")
            .args(["version", "--output", "json"])
            .output()
            .await
            .map_err(|_| {
                ReaderError::Unknown(
                    "az CLI not found on PATH; install it and run 'az login'".to_string(),
                )
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ReaderError::Unknown(
                "az CLI is present but not functional".to_string(),
            ))
        }
    }

    fn name(&self) -> &'static str {
        "az-cli"
    }
}
