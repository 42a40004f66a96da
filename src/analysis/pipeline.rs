use super::progress::{ProgressSender, StepTracker};
use crate::analyzers::discovery::ResourceDiscovery;
use crate::analyzers::network::NetworkAnalyzer;
use crate::analyzers::DiscoveredResource;
use crate::config::AppConfig;
use crate::model::{
    AnalysisResult, AnalysisSession, AnalysisStep, ConnectedResource, NetworkConfiguration,
    SecuritySummary, StepStatus,
};
use crate::reader::{read_with_retry, ReadRequest, ResourceReader};
use crate::report::{markdown, ReportOptions, ReportSet};
use crate::scoring::ScoringEngine;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// The step orchestrator: runs the six fixed analysis steps in order and
/// freezes the accumulated state into an [`AnalysisResult`].
///
/// Failure policy per step: validate-prerequisites and connect-workspace
/// are fatal (the run aborts, remaining steps are skipped);
/// analyze-network, discover-resources and analyze-security degrade (the
/// failure is recorded and the run continues on partial data);
/// generate-report runs over whatever state exists.
pub struct Pipeline {
    reader: Arc<dyn ResourceReader>,
    config: AppConfig,
    progress: ProgressSender,
    cancel: Option<watch::Receiver<bool>>,
    report_options: Option<ReportOptions>,
}

impl Pipeline {
    pub fn new(reader: Arc<dyn ResourceReader>, config: AppConfig) -> Self {
        Self {
            reader,
            config,
            progress: ProgressSender::disabled(),
            cancel: None,
            report_options: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Persist reports from inside the generate-report step. Without
    /// options the step only renders in memory and the caller decides
    /// what to do with the frozen result.
    pub fn with_report_options(mut self, options: ReportOptions) -> Self {
        self.report_options = Some(options);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Run the full pipeline for one session. Always returns a frozen
    /// result; `success` is true only when every step succeeded.
    pub async fn run(&self, session: AnalysisSession) -> AnalysisResult {
        let mut tracker = StepTracker::new(self.progress.clone());
        let mut network: Option<NetworkConfiguration> = None;
        let mut discovered: Vec<DiscoveredResource> = Vec::new();

        info!(
            "starting connectivity analysis of '{}' ({})",
            session.workspace_name, session.kind
        );

        // Step 1: validate prerequisites (fatal on failure)
        if self.cancelled() {
            tracker.skip_remaining("cancelled before start");
            return freeze(session, None, Vec::new(), None, tracker);
        }
        tracker.start(AnalysisStep::ValidatePrerequisites);
        if let Err(message) = self.validate(&session).await {
            tracker.fail(AnalysisStep::ValidatePrerequisites, message);
            tracker.skip_remaining("aborted: prerequisites not met");
            return freeze(session, None, Vec::new(), None, tracker);
        }
        tracker.succeed(AnalysisStep::ValidatePrerequisites, "prerequisites validated");

        // Step 2: connect to the workspace (fatal on failure)
        if self.cancelled() {
            tracker.skip_remaining("cancelled");
            return freeze(session, None, Vec::new(), None, tracker);
        }
        tracker.start(AnalysisStep::ConnectWorkspace);
        let workspace_request = ReadRequest::Workspace {
            name: session.workspace_name.clone(),
            resource_group: session.resource_group.clone(),
        };
        let workspace = match read_with_retry(
            self.reader.as_ref(),
            &workspace_request,
            &self.config.retry_policy(),
        )
        .await
        {
            Ok(document) => document,
            Err(err) => {
                tracker.fail(
                    AnalysisStep::ConnectWorkspace,
                    format!("failed to connect to workspace: {} ({})", err, err.class()),
                );
                tracker.skip_remaining("aborted: workspace connection failed");
                return freeze(session, None, Vec::new(), None, tracker);
            }
        };
        let location = workspace
            .get("location")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown location");
        tracker.succeed(
            AnalysisStep::ConnectWorkspace,
            format!("connected to '{}' ({})", session.workspace_name, location),
        );

        // Steps 3 and 4 are independent and run concurrently; both degrade
        // on failure and the run continues with whatever data exists.
        if self.cancelled() {
            tracker.skip_remaining("cancelled");
            return freeze(session, None, Vec::new(), None, tracker);
        }
        tracker.start(AnalysisStep::AnalyzeNetwork);
        tracker.start(AnalysisStep::DiscoverResources);

        let network_analyzer =
            NetworkAnalyzer::new(Arc::clone(&self.reader), self.config.retry_policy());
        let discovery = ResourceDiscovery::new(
            Arc::clone(&self.reader),
            self.config.retry_policy(),
            self.config.call_timeout(),
            self.config.max_concurrent_reads,
        );
        let (network_result, discovery_result) = tokio::join!(
            network_analyzer.analyze(&session, &workspace),
            discovery.discover(&session, &workspace),
        );

        match network_result {
            Ok(configuration) => {
                tracker.succeed(
                    AnalysisStep::AnalyzeNetwork,
                    format!(
                        "{} topology, isolation {}, {} private endpoint(s)",
                        configuration.topology,
                        configuration.isolation_mode,
                        configuration.private_endpoints.len()
                    ),
                );
                network = Some(configuration);
            }
            Err(err) => {
                warn!("network analysis failed, continuing degraded: {}", err);
                tracker.fail(AnalysisStep::AnalyzeNetwork, err.to_string());
            }
        }

        match discovery_result {
            Ok(output) => {
                let message = if output.item_errors.is_empty() {
                    format!("{} resource(s) analyzed", output.resources.len())
                } else {
                    format!(
                        "{} resource(s) analyzed, {} failed",
                        output.resources.len(),
                        output.item_errors.len()
                    )
                };
                tracker.record_item_errors(AnalysisStep::DiscoverResources, output.item_errors);
                tracker.succeed(AnalysisStep::DiscoverResources, message);
                discovered = output.resources;
            }
            Err(err) => {
                warn!("resource discovery failed, continuing degraded: {}", err);
                tracker.fail(AnalysisStep::DiscoverResources, err.to_string());
            }
        }

        // Step 5: scoring is a pure transform over whatever was gathered.
        if self.cancelled() {
            tracker.skip_remaining("cancelled");
            return freeze(session, network, Vec::new(), None, tracker);
        }
        tracker.start(AnalysisStep::AnalyzeSecurity);
        let engine = ScoringEngine::new(self.config.weights.clone());
        let (resources, summary) = engine.score(network.as_ref(), &discovered);
        tracker.succeed(
            AnalysisStep::AnalyzeSecurity,
            format!("average security score {:.1}", summary.average_security_score),
        );

        // Step 6: always attempt a report over the accumulated state. The
        // outcome is recorded optimistically so the persisted document
        // carries terminal statuses for all six steps; a write failure is
        // patched into the returned result afterwards.
        tracker.start(AnalysisStep::GenerateReport);
        tracker.succeed(AnalysisStep::GenerateReport, "report generated");
        let mut result = freeze(session, network, resources, Some(summary), tracker);

        let render_result = match &self.report_options {
            Some(options) => ReportSet::new(options.clone()).write(&result).map(|written| {
                info!("report saved to {}", written.markdown_path.display());
            }),
            None => markdown::render(&result).map(|_| ()),
        };
        if let Err(err) = render_result {
            warn!("report generation failed: {}", err);
            if let Some(outcome) = result
                .step_outcomes
                .iter_mut()
                .find(|o| o.step == AnalysisStep::GenerateReport)
            {
                outcome.status = StepStatus::Failed;
                outcome.error = Some(err.to_string());
            }
            result.success = false;
        }

        result
    }

    /// Identifier sanity plus a reader pre-flight check.
    async fn validate(&self, session: &AnalysisSession) -> Result<(), String> {
        for (label, value) in [
            ("workspace name", &session.workspace_name),
            ("resource group", &session.resource_group),
        ] {
            if value.is_empty() {
                return Err(format!("{} must not be empty", label));
            }
            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
            {
                return Err(format!("{} '{}' contains invalid characters", label, value));
            }
        }

        self.reader
            .validate()
            .await
            .map_err(|err| format!("{} reader unavailable: {}", self.reader.name(), err))
    }
}

fn freeze(
    session: AnalysisSession,
    network: Option<NetworkConfiguration>,
    resources: Vec<ConnectedResource>,
    summary: Option<SecuritySummary>,
    tracker: StepTracker,
) -> AnalysisResult {
    let success = tracker.all_succeeded();
    AnalysisResult {
        session,
        network_configuration: network,
        connected_resources: resources,
        security_summary: summary,
        step_outcomes: tracker.into_outcomes(),
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, WorkspaceKind};
    use crate::reader::{ReaderError, RecordedReader};
    use serde_json::json;

    const STORAGE_ID: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/mlstore";
    const VAULT_ID: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/central-kv";
    const REGISTRY_ID: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ContainerRegistry/registries/mlacr";

    fn session() -> AnalysisSession {
        AnalysisSession::new("ws", "rg", Some("s".to_string()), WorkspaceKind::MlWorkspace)
    }

    fn fast_config() -> AppConfig {
        AppConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            ..AppConfig::default()
        }
    }

    fn workspace_request() -> ReadRequest {
        ReadRequest::Workspace {
            name: "ws".into(),
            resource_group: "rg".into(),
        }
    }

    fn hardened_doc() -> serde_json::Value {
        json!({
            "properties": {
                "publicNetworkAccess": "Disabled",
                "allowBlobPublicAccess": false,
                "networkAcls": {"defaultAction": "Deny"},
                "enableSoftDelete": true,
                "enablePurgeProtection": true,
                "enableRbacAuthorization": true,
                "adminUserEnabled": false,
                "anonymousPullEnabled": false,
                "privateEndpointConnections": [{"id": "/pe/x"}]
            }
        })
    }

    /// Recording of a healthy, locked-down workspace.
    fn full_reader() -> RecordedReader {
        RecordedReader::new()
            .with_response(
                &workspace_request(),
                json!({
                    "name": "ws",
                    "location": "westeurope",
                    "storage_account": STORAGE_ID,
                    "key_vault": VAULT_ID,
                    "container_registry": REGISTRY_ID,
                    "managed_network": {"isolation_mode": "allow_only_approved_outbound"},
                    "public_network_access": "Disabled"
                }),
            )
            .with_response(
                &ReadRequest::PrivateEndpoints { resource_group: "rg".into() },
                json!([
                    {"name": "ws-pe", "id": "/pe/ws-pe",
                     "private_link_service_connections": [
                        {"private_link_service_id": "/providers/Microsoft.MachineLearningServices/workspaces/ws"}
                     ]}
                ]),
            )
            .with_response(
                &ReadRequest::OutboundRules { workspace: "ws".into(), resource_group: "rg".into() },
                json!([{"name": "pypi", "type": "fqdn", "destination": "pypi.org"}]),
            )
            .with_response(
                &ReadRequest::Computes { workspace: "ws".into(), resource_group: "rg".into() },
                json!([]),
            )
            .with_response(
                &ReadRequest::Connections { workspace: "ws".into(), resource_group: "rg".into() },
                json!([]),
            )
            .with_response(&ReadRequest::Resource { id: STORAGE_ID.into() }, hardened_doc())
            .with_response(&ReadRequest::Resource { id: VAULT_ID.into() }, hardened_doc())
            .with_response(&ReadRequest::Resource { id: REGISTRY_ID.into() }, hardened_doc())
            .with_response(
                &ReadRequest::DiagnosticSettings { resource_id: STORAGE_ID.into() },
                json!([{"name": "audit"}]),
            )
            .with_response(
                &ReadRequest::DiagnosticSettings { resource_id: VAULT_ID.into() },
                json!([{"name": "audit"}]),
            )
            .with_response(
                &ReadRequest::DiagnosticSettings { resource_id: REGISTRY_ID.into() },
                json!([{"name": "audit"}]),
            )
    }

    #[tokio::test]
    async fn full_run_succeeds_with_all_steps() {
        let pipeline = Pipeline::new(Arc::new(full_reader()), fast_config());
        let result = pipeline.run(session()).await;

        assert!(result.success);
        assert!(result
            .step_outcomes
            .iter()
            .all(|o| o.status == StepStatus::Succeeded));
        assert_eq!(result.connected_resources.len(), 3);
        let network = result.network_configuration.as_ref().unwrap();
        assert_eq!(network.private_endpoints.len(), 1);
        let summary = result.security_summary.as_ref().unwrap();
        assert!(summary.average_security_score >= 90.0);
    }

    #[tokio::test]
    async fn connect_failure_aborts_with_report_still_renderable() {
        let reader = RecordedReader::new().with_error(
            &workspace_request(),
            ReaderError::Forbidden("AuthorizationFailed".into()),
        );
        let pipeline = Pipeline::new(Arc::new(reader), fast_config());
        let result = pipeline.run(session()).await;

        assert!(!result.success);
        assert!(result.connected_resources.is_empty());
        assert!(result.network_configuration.is_none());
        assert_eq!(
            result.outcome(AnalysisStep::ConnectWorkspace).unwrap().status,
            StepStatus::Failed
        );
        for step in [
            AnalysisStep::AnalyzeNetwork,
            AnalysisStep::DiscoverResources,
            AnalysisStep::AnalyzeSecurity,
            AnalysisStep::GenerateReport,
        ] {
            assert_eq!(result.outcome(step).unwrap().status, StepStatus::Skipped);
        }

        // the caller can still render a report noting the abort point
        let rendered = markdown::render(&result).unwrap();
        assert!(rendered.contains("connect-workspace"));
    }

    #[tokio::test]
    async fn invalid_identifiers_fail_prerequisites() {
        let pipeline = Pipeline::new(Arc::new(full_reader()), fast_config());
        let bad_session = AnalysisSession::new(
            "ws;rm -rf",
            "rg",
            None,
            WorkspaceKind::MlWorkspace,
        );
        let result = pipeline.run(bad_session).await;

        assert!(!result.success);
        assert_eq!(
            result
                .outcome(AnalysisStep::ValidatePrerequisites)
                .unwrap()
                .status,
            StepStatus::Failed
        );
    }

    #[tokio::test]
    async fn single_resource_failure_degrades_not_fails() {
        let reader = full_reader().with_error(
            &ReadRequest::Resource { id: VAULT_ID.into() },
            ReaderError::Transient("503".into()),
        );
        let pipeline = Pipeline::new(Arc::new(reader), fast_config());
        let result = pipeline.run(session()).await;

        // discovery itself succeeded; the one failure is an item error
        let outcome = result.outcome(AnalysisStep::DiscoverResources).unwrap();
        assert_eq!(outcome.status, StepStatus::Succeeded);
        assert_eq!(outcome.item_errors.len(), 1);
        assert!(outcome.item_errors[0].contains(VAULT_ID));
        assert_eq!(result.connected_resources.len(), 2);
        assert!(result.success);
    }

    #[tokio::test]
    async fn runs_against_unchanged_state_are_idempotent() {
        let config = fast_config();
        let first = Pipeline::new(Arc::new(full_reader()), config.clone())
            .run(session())
            .await;
        let second = Pipeline::new(Arc::new(full_reader()), config)
            .run(session())
            .await;

        assert_ne!(first.session.run_id, second.session.run_id);
        assert_eq!(first.content_digest(), second.content_digest());
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_steps() {
        let (tx, rx) = watch::channel(true);
        let pipeline = Pipeline::new(Arc::new(full_reader()), fast_config()).with_cancellation(rx);
        let result = pipeline.run(session()).await;
        drop(tx);

        assert!(!result.success);
        assert!(result
            .step_outcomes
            .iter()
            .all(|o| o.status == StepStatus::Skipped));
    }

    #[tokio::test]
    async fn unknown_connection_type_scores_zero() {
        let reader = full_reader().with_response(
            &ReadRequest::Connections { workspace: "ws".into(), resource_group: "rg".into() },
            json!([{"name": "legacy-feed", "type": "custom", "target": "https://example.com"}]),
        );
        let pipeline = Pipeline::new(Arc::new(reader), fast_config());
        let result = pipeline.run(session()).await;

        let unknown = result
            .connected_resources
            .iter()
            .find(|r| r.kind == ResourceKind::Unknown)
            .unwrap();
        assert_eq!(unknown.security_score, 0);
    }
}
