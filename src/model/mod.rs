use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One analysis run against a single workspace.
///
/// Owned by the pipeline for the run's lifetime; embedded into the frozen
/// [`AnalysisResult`] when the run completes or aborts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub run_id: String,
    pub workspace_name: String,
    pub resource_group: String,
    pub subscription_id: Option<String>,
    pub kind: WorkspaceKind,
    pub started_at: DateTime<Utc>,
}

impl AnalysisSession {
    pub fn new(
        workspace_name: impl Into<String>,
        resource_group: impl Into<String>,
        subscription_id: Option<String>,
        kind: WorkspaceKind,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            workspace_name: workspace_name.into(),
            resource_group: resource_group.into(),
            subscription_id,
            kind,
            started_at: Utc::now(),
        }
    }
}

/// The two managed-workspace flavors the tool understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceKind {
    #[serde(rename = "ai-hub")]
    AiHub,
    #[serde(rename = "ml-workspace")]
    MlWorkspace,
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceKind::AiHub => write!(f, "AI Hub"),
            WorkspaceKind::MlWorkspace => write!(f, "ML Workspace"),
        }
    }
}

/// The fixed, ordered analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStep {
    #[serde(rename = "validate-prerequisites")]
    ValidatePrerequisites,
    #[serde(rename = "connect-workspace")]
    ConnectWorkspace,
    #[serde(rename = "analyze-network")]
    AnalyzeNetwork,
    #[serde(rename = "discover-resources")]
    DiscoverResources,
    #[serde(rename = "analyze-security")]
    AnalyzeSecurity,
    #[serde(rename = "generate-report")]
    GenerateReport,
}

impl AnalysisStep {
    /// Program order. Steps never execute out of this sequence.
    pub const ALL: [AnalysisStep; 6] = [
        AnalysisStep::ValidatePrerequisites,
        AnalysisStep::ConnectWorkspace,
        AnalysisStep::AnalyzeNetwork,
        AnalysisStep::DiscoverResources,
        AnalysisStep::AnalyzeSecurity,
        AnalysisStep::GenerateReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisStep::ValidatePrerequisites => "validate-prerequisites",
            AnalysisStep::ConnectWorkspace => "connect-workspace",
            AnalysisStep::AnalyzeNetwork => "analyze-network",
            AnalysisStep::DiscoverResources => "discover-resources",
            AnalysisStep::AnalyzeSecurity => "analyze-security",
            AnalysisStep::GenerateReport => "generate-report",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AnalysisStep::ValidatePrerequisites => "Validating prerequisites",
            AnalysisStep::ConnectWorkspace => "Connecting to workspace",
            AnalysisStep::AnalyzeNetwork => "Analyzing network configuration",
            AnalysisStep::DiscoverResources => "Discovering connected resources",
            AnalysisStep::AnalyzeSecurity => "Analyzing security settings",
            AnalysisStep::GenerateReport => "Generating report",
        }
    }

    /// 1-based position used in progress events.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "skipped")]
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Outcome record for one pipeline step.
///
/// `item_errors` holds per-item failures recorded under an otherwise
/// successful step (e.g. a single resource whose analysis failed during
/// discovery). Step-level failure goes into `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: AnalysisStep,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub item_errors: Vec<String>,
}

impl StepOutcome {
    pub fn pending(step: AnalysisStep) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error: None,
            item_errors: Vec::new(),
        }
    }
}

/// Network topology class of the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkTopology {
    /// Platform-provisioned and operated virtual network.
    #[serde(rename = "managed")]
    Managed,
    /// Customer-controlled virtual network.
    #[serde(rename = "customer")]
    Customer,
}

impl fmt::Display for NetworkTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTopology::Managed => write!(f, "managed"),
            NetworkTopology::Customer => write!(f, "customer"),
        }
    }
}

/// Default outbound policy of the workspace network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationMode {
    #[serde(rename = "allow-internet-outbound")]
    AllowInternetOutbound,
    #[serde(rename = "allow-only-approved-outbound")]
    AllowOnlyApprovedOutbound,
    /// Network control handled outside the platform (customer-managed).
    #[serde(rename = "disabled")]
    Disabled,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::AllowInternetOutbound => write!(f, "allow-internet-outbound"),
            IsolationMode::AllowOnlyApprovedOutbound => write!(f, "allow-only-approved-outbound"),
            IsolationMode::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEndpoint {
    pub name: String,
    pub target_resource_id: Option<String>,
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundRuleType {
    #[serde(rename = "fqdn")]
    Fqdn,
    #[serde(rename = "service-tag")]
    ServiceTag,
    #[serde(rename = "private-endpoint")]
    PrivateEndpoint,
}

impl fmt::Display for OutboundRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundRuleType::Fqdn => write!(f, "fqdn"),
            OutboundRuleType::ServiceTag => write!(f, "service-tag"),
            OutboundRuleType::PrivateEndpoint => write!(f, "private-endpoint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundRule {
    pub name: String,
    pub rule_type: OutboundRuleType,
    pub destination: String,
}

/// Network findings for one workspace. Immutable once produced by the
/// network analyzer; endpoint and rule lists are sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfiguration {
    pub topology: NetworkTopology,
    pub isolation_mode: IsolationMode,
    pub public_network_access: bool,
    pub private_endpoints: Vec<PrivateEndpoint>,
    pub outbound_rules: Vec<OutboundRule>,
}

/// The closed set of resource kinds the engine knows how to analyze.
/// Unrecognized type tags map to `Unknown` and degrade instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "storage")]
    Storage,
    #[serde(rename = "key-vault")]
    KeyVault,
    #[serde(rename = "container-registry")]
    ContainerRegistry,
    #[serde(rename = "compute")]
    Compute,
    #[serde(rename = "cognitive-service")]
    CognitiveService,
    #[serde(rename = "unknown")]
    Unknown,
}

impl ResourceKind {
    /// Maps a cloud resource type tag to a kind.
    pub fn from_type_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "microsoft.storage/storageaccounts" => ResourceKind::Storage,
            "microsoft.keyvault/vaults" => ResourceKind::KeyVault,
            "microsoft.containerregistry/registries" => ResourceKind::ContainerRegistry,
            "microsoft.machinelearningservices/workspaces/computes" => ResourceKind::Compute,
            "microsoft.cognitiveservices/accounts" => ResourceKind::CognitiveService,
            _ => ResourceKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Storage => "storage",
            ResourceKind::KeyVault => "key-vault",
            ResourceKind::ContainerRegistry => "container-registry",
            ResourceKind::Compute => "compute",
            ResourceKind::CognitiveService => "cognitive-service",
            ResourceKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How a resource is reachable from the workspace network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMethod {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "private-endpoint")]
    PrivateEndpoint,
    #[serde(rename = "vnet-integrated")]
    VnetIntegrated,
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMethod::Public => write!(f, "public"),
            AccessMethod::PrivateEndpoint => write!(f, "private-endpoint"),
            AccessMethod::VnetIntegrated => write!(f, "vnet-integrated"),
            AccessMethod::Unknown => write!(f, "unknown"),
        }
    }
}

/// Machine-readable issue codes attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCode {
    #[serde(rename = "public-access-enabled")]
    PublicAccessEnabled,
    #[serde(rename = "no-private-endpoint")]
    NoPrivateEndpoint,
    #[serde(rename = "blob-public-access")]
    BlobPublicAccess,
    #[serde(rename = "network-acl-open")]
    NetworkAclOpen,
    #[serde(rename = "soft-delete-disabled")]
    SoftDeleteDisabled,
    #[serde(rename = "purge-protection-disabled")]
    PurgeProtectionDisabled,
    #[serde(rename = "rbac-disabled")]
    RbacDisabled,
    #[serde(rename = "admin-account-enabled")]
    AdminAccountEnabled,
    #[serde(rename = "anonymous-pull-enabled")]
    AnonymousPullEnabled,
    #[serde(rename = "local-auth-enabled")]
    LocalAuthEnabled,
    #[serde(rename = "unrestricted-outbound")]
    UnrestrictedOutbound,
    #[serde(rename = "ssh-public-access")]
    SshPublicAccess,
    #[serde(rename = "no-subnet-integration")]
    NoSubnetIntegration,
    #[serde(rename = "diagnostics-missing")]
    DiagnosticsMissing,
    #[serde(rename = "unrecognized-type")]
    UnrecognizedType,
}

/// One resource attached to the workspace, with its scored posture.
/// Produced once per resource per run; re-analysis creates a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedResource {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub access_method: AccessMethod,
    pub security_score: u8,
    pub issues: Vec<IssueCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "high")]
    High,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "low")]
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub text: String,
    pub resource_id: Option<String>,
}

/// Aggregated security posture across the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub total_resources: usize,
    pub resources_by_kind: BTreeMap<String, usize>,
    pub average_security_score: f64,
    pub public_accessible: usize,
    pub private_endpoint_protected: usize,
    pub recommendations: Vec<Recommendation>,
}

/// Aggregate root for one run. Field order matters: the serialized JSON
/// document's top-level keys are exactly these, in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub session: AnalysisSession,
    pub network_configuration: Option<NetworkConfiguration>,
    pub connected_resources: Vec<ConnectedResource>,
    pub security_summary: Option<SecuritySummary>,
    pub step_outcomes: Vec<StepOutcome>,
    pub success: bool,
}

impl AnalysisResult {
    pub fn outcome(&self, step: AnalysisStep) -> Option<&StepOutcome> {
        self.step_outcomes.iter().find(|o| o.step == step)
    }

    /// True when any step failed or was skipped.
    pub fn is_degraded(&self) -> bool {
        self.step_outcomes
            .iter()
            .any(|o| matches!(o.status, StepStatus::Failed | StepStatus::Skipped))
    }

    /// All per-item errors recorded across steps, with step names.
    pub fn item_errors(&self) -> Vec<(AnalysisStep, &str)> {
        self.step_outcomes
            .iter()
            .flat_map(|o| o.item_errors.iter().map(move |e| (o.step, e.as_str())))
            .collect()
    }

    /// Digest of the analysis content with run-specific session metadata
    /// blanked out. Two runs against unchanged infrastructure produce the
    /// same digest, which makes reports diffable at a glance.
    pub fn content_digest(&self) -> String {
        let mut stable = self.clone();
        stable.session.run_id = String::new();
        stable.session.started_at = DateTime::<Utc>::UNIX_EPOCH;
        for outcome in &mut stable.step_outcomes {
            outcome.started_at = None;
            outcome.finished_at = None;
            outcome.duration_ms = None;
        }
        let json = serde_json::to_vec(&stable).unwrap_or_default();
        format!("{:x}", md5::compute(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_order_and_indexing() {
        assert_eq!(AnalysisStep::ALL.len(), 6);
        assert_eq!(AnalysisStep::ValidatePrerequisites.index(), 1);
        assert_eq!(AnalysisStep::GenerateReport.index(), 6);
        assert_eq!(AnalysisStep::AnalyzeNetwork.name(), "analyze-network");
    }

    #[test]
    fn resource_kind_from_type_tag() {
        assert_eq!(
            ResourceKind::from_type_tag("Microsoft.Storage/storageAccounts"),
            ResourceKind::Storage
        );
        assert_eq!(
            ResourceKind::from_type_tag("Microsoft.KeyVault/vaults"),
            ResourceKind::KeyVault
        );
        assert_eq!(
            ResourceKind::from_type_tag("Microsoft.Weird/thing"),
            ResourceKind::Unknown
        );
    }

    #[test]
    fn priority_ordering_is_high_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn content_digest_ignores_run_identity() {
        let make = || AnalysisResult {
            session: AnalysisSession::new("ws", "rg", None, WorkspaceKind::MlWorkspace),
            network_configuration: None,
            connected_resources: Vec::new(),
            security_summary: None,
            step_outcomes: vec![StepOutcome::pending(AnalysisStep::ValidatePrerequisites)],
            success: true,
        };
        let a = make();
        let b = make();
        assert_ne!(a.session.run_id, b.session.run_id);
        assert_eq!(a.content_digest(), b.content_digest());
    }

    #[test]
    fn json_top_level_keys_are_stable() {
        let result = AnalysisResult {
            session: AnalysisSession::new("ws", "rg", None, WorkspaceKind::AiHub),
            network_configuration: None,
            connected_resources: Vec::new(),
            security_summary: None,
            step_outcomes: Vec::new(),
            success: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        let mut last = 0;
        for key in [
            "\"session\"",
            "\"network_configuration\"",
            "\"connected_resources\"",
            "\"security_summary\"",
            "\"step_outcomes\"",
            "\"success\"",
        ] {
            let pos = json.find(key).expect("missing top-level key");
            assert!(pos >= last, "key {} out of order", key);
            last = pos;
        }
    }
}
