use super::{ReadRequest, ReaderError, ReaderResult, ResourceReader};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const ML_API_VERSION: &str = "2024-04-01";
const NETWORK_API_VERSION: &str = "2023-09-01";
const MONITOR_API_VERSION: &str = "2021-05-01-preview";
const GENERIC_API_VERSION: &str = "2022-09-01";

/// Reader that talks to the resource-manager REST API directly.
///
/// Used when `ARM_ACCESS_TOKEN` is present in the environment (a `.env`
/// file is honored), which avoids the per-call cost of spawning the CLI.
/// The token is taken as-is; acquiring and refreshing it is out of scope.
pub struct RestReader {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    subscription_id: String,
}

impl RestReader {
    /// Build a reader from the environment. Returns `None` when no access
    /// token is configured, letting the caller fall back to the CLI reader.
    pub fn from_env(subscription_id: Option<&str>) -> Option<Self> {
        let _ = dotenv::dotenv();
        let token = std::env::var("ARM_ACCESS_TOKEN").ok()?;
        if token.is_empty() {
            return None;
        }
        let subscription = subscription_id
            .map(str::to_string)
            .or_else(|| std::env::var("ARM_SUBSCRIPTION_ID").ok())?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .ok()?;

        Some(Self {
            client,
            endpoint: std::env::var("ARM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
            token,
            subscription_id: subscription,
        })
    }

    fn url_for(&self, request: &ReadRequest) -> String {
        let sub = &self.subscription_id;
        let base = &self.endpoint;
        match request {
            ReadRequest::Workspace {
                name,
                resource_group,
            } => format!(
                "{base}/subscriptions/{sub}/resourceGroups/{resource_group}/providers/Microsoft.MachineLearningServices/workspaces/{name}?api-version={ML_API_VERSION}"
            ),
            ReadRequest::OutboundRules {
                workspace,
                resource_group,
            } => format!(
                "{base}/subscriptions/{sub}/resourceGroups/{resource_group}/providers/Microsoft.MachineLearningServices/workspaces/{workspace}/outboundRules?api-version={ML_API_VERSION}"
            ),
            ReadRequest::PrivateEndpoints { resource_group } => format!(
                "{base}/subscriptions/{sub}/resourceGroups/{resource_group}/providers/Microsoft.Network/privateEndpoints?api-version={NETWORK_API_VERSION}"
            ),
            ReadRequest::Computes {
                workspace,
                resource_group,
            } => format!(
                "{base}/subscriptions/{sub}/resourceGroups/{resource_group}/providers/Microsoft.MachineLearningServices/workspaces/{workspace}/computes?api-version={ML_API_VERSION}"
            ),
            ReadRequest::Connections {
                workspace,
                resource_group,
            } => format!(
                "{base}/subscriptions/{sub}/resourceGroups/{resource_group}/providers/Microsoft.MachineLearningServices/workspaces/{workspace}/connections?api-version={ML_API_VERSION}"
            ),
            ReadRequest::Resource { id } => {
                format!("{base}{id}?api-version={GENERIC_API_VERSION}")
            }
            ReadRequest::DiagnosticSettings { resource_id } => format!(
                "{base}{resource_id}/providers/Microsoft.Insights/diagnosticSettings?api-version={MONITOR_API_VERSION}"
            ),
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ReaderError {
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.chars().take(200).collect::<String>())
        };
        match status.as_u16() {
            404 => ReaderError::NotFound(detail),
            401 | 403 => ReaderError::Forbidden(detail),
            429 => ReaderError::Transient(detail),
            s if s >= 500 => ReaderError::Transient(detail),
            _ => ReaderError::Unknown(detail),
        }
    }

    /// Collection endpoints wrap their payload in `{"value": [...]}`;
    /// unwrap so all readers return the same shape.
    fn unwrap_collection(request: &ReadRequest, value: Value) -> Value {
        let is_collection = matches!(
            request,
            ReadRequest::OutboundRules { .. }
                | ReadRequest::PrivateEndpoints { .. }
                | ReadRequest::Computes { .. }
                | ReadRequest::Connections { .. }
                | ReadRequest::DiagnosticSettings { .. }
        );
        if is_collection {
            if let Some(items) = value.get("value").cloned() {
                return items;
            }
        }
        value
    }
}

#[async_trait]
impl ResourceReader for RestReader {
    async fn read(&self, request: &ReadRequest) -> ReaderResult<Value> {
        let url = self.url_for(request);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ReaderError::Transient(e.to_string())
                } else {
                    ReaderError::Unknown(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ReaderError::Unknown(format!("malformed response: {}", e)))?;
        Ok(Self::unwrap_collection(request, value))
    }

    async fn validate(&self) -> ReaderResult<()> {
        if self.token.is_empty() {
            return Err(ReaderError::Forbidden(
                "ARM_ACCESS_TOKEN is empty".to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "arm-rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn status_classification_matches_error_taxonomy() {
        use reqwest::StatusCode;
        assert_eq!(
            RestReader::classify_status(StatusCode::NOT_FOUND, "").class(),
            "not_found"
        );
        assert_eq!(
            RestReader::classify_status(StatusCode::FORBIDDEN, "").class(),
            "forbidden"
        );
        assert_eq!(
            RestReader::classify_status(StatusCode::TOO_MANY_REQUESTS, "").class(),
            "transient"
        );
        assert_eq!(
            RestReader::classify_status(StatusCode::BAD_GATEWAY, "").class(),
            "transient"
        );
        assert_eq!(
            RestReader::classify_status(StatusCode::BAD_REQUEST, "").class(),
            "unknown"
        );
    }

    #[test]
    fn collection_payloads_are_unwrapped() {
        let request = ReadRequest::Computes {
            workspace: "ws".to_string(),
            resource_group: "rg".to_string(),
        };
        let unwrapped =
            RestReader::unwrap_collection(&request, json!({"value": [{"name": "gpu-1"}]}));
        assert!(unwrapped.is_array());

        let single = ReadRequest::Resource {
            id: "/x".to_string(),
        };
        let passthrough = RestReader::unwrap_collection(&single, json!({"value": "unrelated"}));
        assert!(passthrough.is_object());
    }

    #[test]
    #[serial]
    fn from_env_requires_token_and_subscription() {
        std::env::remove_var("ARM_ACCESS_TOKEN");
        std::env::remove_var("ARM_SUBSCRIPTION_ID");
        assert!(RestReader::from_env(None).is_none());

        std::env::set_var("ARM_ACCESS_TOKEN", "token");
        assert!(RestReader::from_env(None).is_none());
        assert!(RestReader::from_env(Some("sub")).is_some());

        std::env::remove_var("ARM_ACCESS_TOKEN");
    }

    #[test]
    #[serial]
    fn urls_target_the_expected_providers() {
        std::env::set_var("ARM_ACCESS_TOKEN", "token");
        let reader = RestReader::from_env(Some("sub-1")).unwrap();
        std::env::remove_var("ARM_ACCESS_TOKEN");

        let url = reader.url_for(&ReadRequest::Workspace {
            name: "ws".to_string(),
            resource_group: "rg".to_string(),
        });
        assert!(url.contains("/subscriptions/sub-1/resourceGroups/rg/"));
        assert!(url.contains("Microsoft.MachineLearningServices/workspaces/ws"));

        let diag = reader.url_for(&ReadRequest::DiagnosticSettings {
            resource_id: "/subscriptions/sub-1/x".to_string(),
        });
        assert!(diag.contains("Microsoft.Insights/diagnosticSettings"));
    }
}
