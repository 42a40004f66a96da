use super::network::field;
use super::resources::profile;
use super::{AnalyzerError, AnalyzerResult, DiscoveredResource};
use crate::model::{AnalysisSession, ResourceKind};
use crate::reader::{read_with_retry, ReadRequest, ResourceReader, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Enumerates every resource attached to the workspace and dispatches
/// each to its type analyzer under a bounded worker cap.
pub struct ResourceDiscovery {
    reader: Arc<dyn ResourceReader>,
    retry: RetryPolicy,
    call_timeout: Duration,
    max_concurrency: usize,
}

/// Discovery result: analyzed resources plus per-item failures. A single
/// resource's failure never aborts the step; it is recorded here and the
/// resource is omitted.
#[derive(Debug, Default)]
pub struct DiscoveryOutput {
    pub resources: Vec<DiscoveredResource>,
    pub item_errors: Vec<String>,
}

/// A resource reference waiting for its control-plane read.
struct Candidate {
    kind: ResourceKind,
    resource_id: String,
}

impl ResourceDiscovery {
    pub fn new(
        reader: Arc<dyn ResourceReader>,
        retry: RetryPolicy,
        call_timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        Self {
            reader,
            retry,
            call_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn discover(
        &self,
        session: &AnalysisSession,
        workspace: &Value,
    ) -> AnalyzerResult<DiscoveryOutput> {
        if !workspace.is_object() {
            return Err(AnalyzerError::InvalidWorkspace(
                "workspace document is not an object".to_string(),
            ));
        }

        let mut output = DiscoveryOutput::default();
        let mut candidates = default_infrastructure(workspace);

        self.discover_computes(session, &mut output).await;
        self.discover_connections(session, &mut candidates, &mut output)
            .await;

        // Dedup before spending remote calls on repeated references.
        candidates.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        candidates.dedup_by(|a, b| a.resource_id == b.resource_id);

        self.analyze_candidates(candidates, &mut output).await;

        output
            .resources
            .sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        output
            .resources
            .dedup_by(|a, b| a.resource_id == b.resource_id);

        debug!(
            "discovery finished: {} resources, {} item errors",
            output.resources.len(),
            output.item_errors.len()
        );
        Ok(output)
    }

    /// Compute targets are profiled straight from the listing entries.
    async fn discover_computes(&self, session: &AnalysisSession, output: &mut DiscoveryOutput) {
        let request = ReadRequest::Computes {
            workspace: session.workspace_name.clone(),
            resource_group: session.resource_group.clone(),
        };
        let listing = match read_with_retry(self.reader.as_ref(), &request, &self.retry).await {
            Ok(value) => value,
            Err(err) => {
                warn!("compute enumeration failed: {}", err);
                output
                    .item_errors
                    .push(format!("computes: {} ({})", err, err.class()));
                return;
            }
        };

        for item in listing.as_array().into_iter().flatten() {
            let Some(name) = item.get("name").and_then(Value::as_str) else {
                continue;
            };
            let resource_id = item
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "/workspaces/{}/computes/{}",
                        session.workspace_name, name
                    )
                });
            output
                .resources
                .push(profile(ResourceKind::Compute, &resource_id, item, None));
        }
    }

    /// Service connections: AI/cognitive targets become cognitive-service
    /// candidates; unrecognized connection types degrade to placeholder
    /// resources instead of failing.
    async fn discover_connections(
        &self,
        session: &AnalysisSession,
        candidates: &mut Vec<Candidate>,
        output: &mut DiscoveryOutput,
    ) {
        let request = ReadRequest::Connections {
            workspace: session.workspace_name.clone(),
            resource_group: session.resource_group.clone(),
        };
        let listing = match read_with_retry(self.reader.as_ref(), &request, &self.retry).await {
            Ok(value) => value,
            Err(err) => {
                warn!("connection enumeration failed: {}", err);
                output
                    .item_errors
                    .push(format!("connections: {} ({})", err, err.class()));
                return;
            }
        };

        for item in listing.as_array().into_iter().flatten() {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("connection");
            let conn_type = field(item, &["type", "category"])
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_ascii_lowercase();

            match conn_type.as_str() {
                "azure_open_ai" | "azure_openai" | "cognitive_services" | "azure_ai_services" => {
                    let target = field(item, &["target", "endpoint"])
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    match cognitive_id_from_target(target, session.subscription_id.as_deref()) {
                        Some(resource_id) => candidates.push(Candidate {
                            kind: ResourceKind::CognitiveService,
                            resource_id,
                        }),
                        None => output.item_errors.push(format!(
                            "connection {}: target '{}' is not a service endpoint",
                            name, target
                        )),
                    }
                }
                _ => {
                    output.resources.push(DiscoveredResource::unrecognized(
                        format!(
                            "/workspaces/{}/connections/{}",
                            session.workspace_name, name
                        ),
                        name.to_string(),
                    ));
                }
            }
        }
    }

    /// Fan out per-resource analysis under the worker cap, one timeout per
    /// call, collecting failures as item errors.
    async fn analyze_candidates(&self, candidates: Vec<Candidate>, output: &mut DiscoveryOutput) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<Result<DiscoveredResource, String>> = JoinSet::new();

        for candidate in candidates {
            let permit_source = Arc::clone(&semaphore);
            let reader = Arc::clone(&self.reader);
            let retry = self.retry.clone();
            let timeout = self.call_timeout;

            tasks.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .map_err(|_| "worker pool closed".to_string())?;
                let analysis = analyze_one(reader, retry, candidate);
                match tokio::time::timeout(timeout, analysis).await {
                    Ok(result) => result,
                    Err(_) => Err(format!("analysis timed out after {:?}", timeout)),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(resource)) => output.resources.push(resource),
                Ok(Err(message)) => {
                    warn!("resource analysis failed: {}", message);
                    output.item_errors.push(message);
                }
                Err(err) => output.item_errors.push(format!("analysis task failed: {}", err)),
            }
        }
        output.item_errors.sort();
    }
}

async fn analyze_one(
    reader: Arc<dyn ResourceReader>,
    retry: RetryPolicy,
    candidate: Candidate,
) -> Result<DiscoveredResource, String> {
    let request = ReadRequest::Resource {
        id: candidate.resource_id.clone(),
    };
    let document = read_with_retry(reader.as_ref(), &request, &retry)
        .await
        .map_err(|err| format!("{}: {} ({})", candidate.resource_id, err, err.class()))?;

    // Diagnostics are best-effort; a failed read leaves the factor unknown.
    let diagnostics_request = ReadRequest::DiagnosticSettings {
        resource_id: candidate.resource_id.clone(),
    };
    let diagnostics = read_with_retry(reader.as_ref(), &diagnostics_request, &retry)
        .await
        .ok();

    Ok(profile(
        candidate.kind,
        &candidate.resource_id,
        &document,
        diagnostics.as_ref(),
    ))
}

/// Default infrastructure referenced by the workspace document: storage,
/// secret vault, image registry (each only if present).
fn default_infrastructure(workspace: &Value) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mappings = [
        (ResourceKind::Storage, ["storage_account", "storageAccount"]),
        (ResourceKind::KeyVault, ["key_vault", "keyVault"]),
        (
            ResourceKind::ContainerRegistry,
            ["container_registry", "containerRegistry"],
        ),
    ];

    for (kind, keys) in mappings {
        if let Some(id) = field(workspace, &keys).and_then(Value::as_str) {
            if !id.is_empty() {
                candidates.push(Candidate {
                    kind,
                    resource_id: id.to_string(),
                });
            }
        }
    }
    candidates
}

/// Derive a cognitive-service resource identifier from a connection's
/// endpoint URL, e.g. `https://my-openai.openai.azure.com/` →
/// `.../accounts/my-openai`.
fn cognitive_id_from_target(target: &str, subscription_id: Option<&str>) -> Option<String> {
    let rest = target.split("://").nth(1)?;
    let domain = rest.split('/').next()?;
    let service_name = domain.split('.').next()?;
    if service_name.is_empty() {
        return None;
    }
    Some(format!(
        "/subscriptions/{}/resourceGroups/*/providers/Microsoft.CognitiveServices/accounts/{}",
        subscription_id.unwrap_or("unknown"),
        service_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessMethod, WorkspaceKind};
    use crate::reader::{ReaderError, RecordedReader};
    use serde_json::json;

    const STORAGE_ID: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/mlstore";
    const VAULT_ID: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/central-kv";

    fn session() -> AnalysisSession {
        AnalysisSession::new("ws", "rg", Some("s".to_string()), WorkspaceKind::MlWorkspace)
    }

    fn discovery(reader: RecordedReader) -> ResourceDiscovery {
        ResourceDiscovery::new(
            Arc::new(reader),
            RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            Duration::from_secs(5),
            4,
        )
    }

    fn workspace_doc() -> Value {
        json!({
            "name": "ws",
            "storage_account": STORAGE_ID,
            "key_vault": VAULT_ID
        })
    }

    fn base_reader() -> RecordedReader {
        RecordedReader::new()
            .with_response(
                &ReadRequest::Computes {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([]),
            )
            .with_response(
                &ReadRequest::Connections {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([]),
            )
    }

    fn storage_doc() -> Value {
        json!({"publicNetworkAccess": "Disabled", "allowBlobPublicAccess": false,
               "networkAcls": {"defaultAction": "Deny"},
               "privateEndpointConnections": [{"id": "/pe/1"}]})
    }

    #[tokio::test]
    async fn discovers_default_infrastructure() {
        let reader = base_reader()
            .with_response(&ReadRequest::Resource { id: STORAGE_ID.into() }, storage_doc())
            .with_response(
                &ReadRequest::Resource { id: VAULT_ID.into() },
                json!({"properties": {"publicNetworkAccess": "Disabled", "enableSoftDelete": true}}),
            );

        let output = discovery(reader)
            .discover(&session(), &workspace_doc())
            .await
            .unwrap();

        assert_eq!(output.resources.len(), 2);
        assert!(output.item_errors.is_empty());
        // sorted by resource id: KeyVault before Storage
        assert_eq!(output.resources[0].kind, ResourceKind::KeyVault);
        assert_eq!(output.resources[1].kind, ResourceKind::Storage);
        assert_eq!(output.resources[1].access_method, AccessMethod::PrivateEndpoint);
    }

    #[tokio::test]
    async fn single_resource_failure_is_recorded_not_fatal() {
        let reader = base_reader()
            .with_response(&ReadRequest::Resource { id: STORAGE_ID.into() }, storage_doc())
            .with_error(
                &ReadRequest::Resource { id: VAULT_ID.into() },
                ReaderError::Forbidden("AuthorizationFailed".into()),
            );

        let output = discovery(reader)
            .discover(&session(), &workspace_doc())
            .await
            .unwrap();

        assert_eq!(output.resources.len(), 1);
        assert_eq!(output.item_errors.len(), 1);
        assert!(output.item_errors[0].contains(VAULT_ID));
        assert!(output.item_errors[0].contains("forbidden"));
    }

    #[tokio::test]
    async fn compute_targets_come_from_the_listing() {
        let reader = RecordedReader::new()
            .with_response(
                &ReadRequest::Computes {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([
                    {"name": "gpu-cluster", "id": "/computes/gpu-cluster",
                     "properties": {"subnet": {"id": "/vnet/sn"}, "ssh_public_access": "Disabled"}}
                ]),
            )
            .with_response(
                &ReadRequest::Connections {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([]),
            );

        let output = discovery(reader)
            .discover(&session(), &json!({"name": "ws"}))
            .await
            .unwrap();

        assert_eq!(output.resources.len(), 1);
        assert_eq!(output.resources[0].kind, ResourceKind::Compute);
        assert_eq!(output.resources[0].access_method, AccessMethod::VnetIntegrated);
    }

    #[tokio::test]
    async fn openai_connection_maps_to_cognitive_service() {
        let cognitive_id = "/subscriptions/s/resourceGroups/*/providers/Microsoft.CognitiveServices/accounts/my-openai";
        let reader = RecordedReader::new()
            .with_response(
                &ReadRequest::Computes {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([]),
            )
            .with_response(
                &ReadRequest::Connections {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([
                    {"name": "openai", "type": "azure_open_ai",
                     "target": "https://my-openai.openai.azure.com/"},
                    {"name": "webhook", "type": "custom", "target": "https://example.com"}
                ]),
            )
            .with_response(
                &ReadRequest::Resource { id: cognitive_id.into() },
                json!({"properties": {"publicNetworkAccess": "Enabled", "disableLocalAuth": true}}),
            );

        let output = discovery(reader)
            .discover(&session(), &json!({"name": "ws"}))
            .await
            .unwrap();

        assert_eq!(output.resources.len(), 2);
        let cognitive = output
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::CognitiveService)
            .unwrap();
        assert_eq!(cognitive.name, "my-openai");
        let unknown = output
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::Unknown)
            .unwrap();
        assert_eq!(unknown.name, "webhook");
        assert_eq!(unknown.secure_defaults, 0);
    }

    #[tokio::test]
    async fn enumeration_source_failure_is_an_item_error() {
        let reader = RecordedReader::new()
            .with_error(
                &ReadRequest::Computes {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                ReaderError::Transient("503".into()),
            )
            .with_response(
                &ReadRequest::Connections {
                    workspace: "ws".into(),
                    resource_group: "rg".into(),
                },
                json!([]),
            );

        let output = discovery(reader)
            .discover(&session(), &json!({"name": "ws"}))
            .await
            .unwrap();

        assert!(output.resources.is_empty());
        assert_eq!(output.item_errors.len(), 1);
        assert!(output.item_errors[0].starts_with("computes:"));
    }
}
