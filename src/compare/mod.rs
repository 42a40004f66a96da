use crate::analysis::{Pipeline, ProgressSender};
use crate::config::AppConfig;
use crate::model::{AnalysisResult, AnalysisSession, ConnectedResource};
use crate::reader::ResourceReader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Sentinel rendered for a value that exists on only one side.
pub const NOT_PRESENT: &str = "(not present)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    /// Changes the security posture: scores, isolation, exposure.
    #[serde(rename = "material")]
    Material,
    /// Ordering, counts or text only.
    #[serde(rename = "cosmetic")]
    Cosmetic,
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Significance::Material => write!(f, "material"),
            Significance::Cosmetic => write!(f, "cosmetic"),
        }
    }
}

/// One field-level difference between the two analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub path: String,
    pub value_a: String,
    pub value_b: String,
    pub significance: Significance,
}

/// Result of comparing two full workspace analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub left: AnalysisResult,
    pub right: AnalysisResult,
    pub differences: Vec<FieldDiff>,
}

impl ComparisonResult {
    pub fn material_count(&self) -> usize {
        self.differences
            .iter()
            .filter(|d| d.significance == Significance::Material)
            .count()
    }

    pub fn cosmetic_count(&self) -> usize {
        self.differences.len() - self.material_count()
    }
}

/// Runs the full pipeline for two sessions independently and in parallel,
/// then walks both results field by field.
pub struct ComparisonEngine {
    reader: Arc<dyn ResourceReader>,
    config: AppConfig,
    progress_a: ProgressSender,
    progress_b: ProgressSender,
}

impl ComparisonEngine {
    pub fn new(reader: Arc<dyn ResourceReader>, config: AppConfig) -> Self {
        Self {
            reader,
            config,
            progress_a: ProgressSender::disabled(),
            progress_b: ProgressSender::disabled(),
        }
    }

    pub fn with_progress(mut self, a: ProgressSender, b: ProgressSender) -> Self {
        self.progress_a = a;
        self.progress_b = b;
        self
    }

    pub async fn compare(
        &self,
        session_a: AnalysisSession,
        session_b: AnalysisSession,
    ) -> ComparisonResult {
        info!(
            "comparing '{}' against '{}'",
            session_a.workspace_name, session_b.workspace_name
        );

        let pipeline_a = Pipeline::new(Arc::clone(&self.reader), self.config.clone())
            .with_progress(self.progress_a.clone());
        let pipeline_b = Pipeline::new(Arc::clone(&self.reader), self.config.clone())
            .with_progress(self.progress_b.clone());

        // Fully independent runs; no shared mutable state crosses the
        // session boundary.
        let (left, right) = tokio::join!(pipeline_a.run(session_a), pipeline_b.run(session_b));

        let differences = diff_results(&left, &right);
        info!(
            "comparison finished: {} difference(s)",
            differences.len()
        );
        ComparisonResult {
            left,
            right,
            differences,
        }
    }
}

/// Pure structural diff of two analysis results. Walks sorted unions so
/// swapping the inputs yields the same field set with values swapped.
pub fn diff_results(a: &AnalysisResult, b: &AnalysisResult) -> Vec<FieldDiff> {
    // Identical content (modulo run identity) short-circuits the walk.
    if a.content_digest() == b.content_digest() {
        return Vec::new();
    }

    let mut diffs = Vec::new();
    diff_network(a, b, &mut diffs);
    diff_resources(a, b, &mut diffs);
    diff_aggregate(a, b, &mut diffs);
    diffs
}

fn push_if_differs(
    diffs: &mut Vec<FieldDiff>,
    path: &str,
    value_a: String,
    value_b: String,
    significance: Significance,
) {
    if value_a != value_b {
        diffs.push(FieldDiff {
            path: path.to_string(),
            value_a,
            value_b,
            significance,
        });
    }
}

fn diff_network(a: &AnalysisResult, b: &AnalysisResult, diffs: &mut Vec<FieldDiff>) {
    match (&a.network_configuration, &b.network_configuration) {
        (None, None) => {}
        (na, nb) if na.is_none() || nb.is_none() => {
            let describe = |n: &Option<crate::model::NetworkConfiguration>| {
                n.as_ref()
                    .map(|c| format!("{} topology", c.topology))
                    .unwrap_or_else(|| NOT_PRESENT.to_string())
            };
            diffs.push(FieldDiff {
                path: "network_configuration".to_string(),
                value_a: describe(na),
                value_b: describe(nb),
                significance: Significance::Material,
            });
        }
        (Some(na), Some(nb)) => {
            push_if_differs(
                diffs,
                "network_configuration.topology",
                na.topology.to_string(),
                nb.topology.to_string(),
                Significance::Material,
            );
            push_if_differs(
                diffs,
                "network_configuration.isolation_mode",
                na.isolation_mode.to_string(),
                nb.isolation_mode.to_string(),
                Significance::Material,
            );
            push_if_differs(
                diffs,
                "network_configuration.public_network_access",
                na.public_network_access.to_string(),
                nb.public_network_access.to_string(),
                Significance::Material,
            );
            push_if_differs(
                diffs,
                "network_configuration.private_endpoints.count",
                na.private_endpoints.len().to_string(),
                nb.private_endpoints.len().to_string(),
                Significance::Cosmetic,
            );
            push_if_differs(
                diffs,
                "network_configuration.outbound_rules.count",
                na.outbound_rules.len().to_string(),
                nb.outbound_rules.len().to_string(),
                Significance::Cosmetic,
            );

            let names = |rules: &[crate::model::OutboundRule]| {
                rules
                    .iter()
                    .map(|r| r.name.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            push_if_differs(
                diffs,
                "network_configuration.outbound_rules.names",
                names(&na.outbound_rules),
                names(&nb.outbound_rules),
                Significance::Cosmetic,
            );
        }
        _ => unreachable!(),
    }
}

fn diff_resources(a: &AnalysisResult, b: &AnalysisResult, diffs: &mut Vec<FieldDiff>) {
    let ids: BTreeSet<&str> = a
        .connected_resources
        .iter()
        .chain(&b.connected_resources)
        .map(|r| r.resource_id.as_str())
        .collect();

    let find = |result: &'_ AnalysisResult, id: &str| -> Option<ConnectedResource> {
        result
            .connected_resources
            .iter()
            .find(|r| r.resource_id == id)
            .cloned()
    };

    for id in ids {
        let in_a = find(a, id);
        let in_b = find(b, id);
        let path = format!("connected_resources[{}]", id);

        match (in_a, in_b) {
            // A resource on one side only is a reportable difference with
            // the absent side at the sentinel, never a fatal condition.
            (Some(ra), None) => diffs.push(FieldDiff {
                path,
                value_a: describe_resource(&ra),
                value_b: NOT_PRESENT.to_string(),
                significance: Significance::Material,
            }),
            (None, Some(rb)) => diffs.push(FieldDiff {
                path,
                value_a: NOT_PRESENT.to_string(),
                value_b: describe_resource(&rb),
                significance: Significance::Material,
            }),
            (Some(ra), Some(rb)) => {
                push_if_differs(
                    diffs,
                    &format!("{}.access_method", path),
                    ra.access_method.to_string(),
                    rb.access_method.to_string(),
                    Significance::Material,
                );
                push_if_differs(
                    diffs,
                    &format!("{}.security_score", path),
                    ra.security_score.to_string(),
                    rb.security_score.to_string(),
                    Significance::Material,
                );
                let issue_list = |r: &ConnectedResource| {
                    let mut labels: Vec<String> = r
                        .issues
                        .iter()
                        .map(|i| serde_json::to_string(i).unwrap_or_default())
                        .collect();
                    labels.sort();
                    labels.join(", ")
                };
                push_if_differs(
                    diffs,
                    &format!("{}.issues", path),
                    issue_list(&ra),
                    issue_list(&rb),
                    Significance::Cosmetic,
                );
            }
            (None, None) => unreachable!(),
        }
    }
}

fn diff_aggregate(a: &AnalysisResult, b: &AnalysisResult, diffs: &mut Vec<FieldDiff>) {
    let average = |result: &AnalysisResult| {
        result
            .security_summary
            .as_ref()
            .map(|s| format!("{:.1}", s.average_security_score))
            .unwrap_or_else(|| NOT_PRESENT.to_string())
    };
    push_if_differs(
        diffs,
        "security_summary.average_security_score",
        average(a),
        average(b),
        Significance::Material,
    );
}

fn describe_resource(resource: &ConnectedResource) -> String {
    format!(
        "{} '{}' (score {})",
        resource.kind, resource.name, resource.security_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AccessMethod, AnalysisSession, IsolationMode, NetworkConfiguration, NetworkTopology,
        ResourceKind, SecuritySummary, WorkspaceKind,
    };
    use std::collections::BTreeMap;

    fn resource(id: &str, score: u8) -> ConnectedResource {
        ConnectedResource {
            resource_id: id.to_string(),
            kind: ResourceKind::Storage,
            name: id.rsplit('/').next().unwrap().to_string(),
            access_method: AccessMethod::PrivateEndpoint,
            security_score: score,
            issues: Vec::new(),
        }
    }

    fn result(isolation: IsolationMode, resources: Vec<ConnectedResource>, average: f64) -> AnalysisResult {
        AnalysisResult {
            session: AnalysisSession::new("ws", "rg", None, WorkspaceKind::MlWorkspace),
            network_configuration: Some(NetworkConfiguration {
                topology: NetworkTopology::Managed,
                isolation_mode: isolation,
                public_network_access: false,
                private_endpoints: Vec::new(),
                outbound_rules: Vec::new(),
            }),
            connected_resources: resources,
            security_summary: Some(SecuritySummary {
                total_resources: 0,
                resources_by_kind: BTreeMap::new(),
                average_security_score: average,
                public_accessible: 0,
                private_endpoint_protected: 0,
                recommendations: Vec::new(),
            }),
            step_outcomes: Vec::new(),
            success: true,
        }
    }

    #[test]
    fn identical_results_produce_no_differences() {
        let a = result(IsolationMode::AllowOnlyApprovedOutbound, vec![resource("/r/a", 90)], 90.0);
        let mut b = a.clone();
        b.session = AnalysisSession::new("ws", "rg", None, WorkspaceKind::MlWorkspace);
        assert!(diff_results(&a, &b).is_empty());
    }

    #[test]
    fn isolation_mode_difference_is_material() {
        let a = result(IsolationMode::AllowOnlyApprovedOutbound, Vec::new(), 100.0);
        let b = result(IsolationMode::AllowInternetOutbound, Vec::new(), 100.0);
        let diffs = diff_results(&a, &b);

        let isolation = diffs
            .iter()
            .find(|d| d.path == "network_configuration.isolation_mode")
            .unwrap();
        assert_eq!(isolation.significance, Significance::Material);
        assert_eq!(isolation.value_a, "allow-only-approved-outbound");
        assert_eq!(isolation.value_b, "allow-internet-outbound");
    }

    #[test]
    fn one_sided_resource_uses_sentinel() {
        let a = result(
            IsolationMode::AllowOnlyApprovedOutbound,
            vec![resource("/r/a", 90), resource("/r/only-in-a", 80)],
            85.0,
        );
        let b = result(
            IsolationMode::AllowOnlyApprovedOutbound,
            vec![resource("/r/a", 90)],
            90.0,
        );
        let diffs = diff_results(&a, &b);

        let missing = diffs
            .iter()
            .find(|d| d.path == "connected_resources[/r/only-in-a]")
            .unwrap();
        assert_eq!(missing.value_b, NOT_PRESENT);
        assert_eq!(missing.significance, Significance::Material);
    }

    #[test]
    fn comparison_is_structurally_symmetric() {
        let a = result(
            IsolationMode::AllowOnlyApprovedOutbound,
            vec![resource("/r/shared", 90), resource("/r/only-in-a", 80)],
            85.0,
        );
        let b = result(
            IsolationMode::AllowInternetOutbound,
            vec![resource("/r/shared", 70)],
            70.0,
        );

        let forward = diff_results(&a, &b);
        let backward = diff_results(&b, &a);

        let paths = |diffs: &[FieldDiff]| {
            diffs.iter().map(|d| d.path.clone()).collect::<BTreeSet<_>>()
        };
        assert_eq!(paths(&forward), paths(&backward));

        for diff in &forward {
            let mirrored = backward.iter().find(|d| d.path == diff.path).unwrap();
            assert_eq!(diff.value_a, mirrored.value_b);
            assert_eq!(diff.value_b, mirrored.value_a);
            assert_eq!(diff.significance, mirrored.significance);
        }
    }

    #[test]
    fn score_difference_is_material() {
        let a = result(
            IsolationMode::AllowOnlyApprovedOutbound,
            vec![resource("/r/shared", 90)],
            90.0,
        );
        let b = result(
            IsolationMode::AllowOnlyApprovedOutbound,
            vec![resource("/r/shared", 60)],
            60.0,
        );
        let diffs = diff_results(&a, &b);

        let score = diffs
            .iter()
            .find(|d| d.path == "connected_resources[/r/shared].security_score")
            .unwrap();
        assert_eq!(score.significance, Significance::Material);
        let aggregate = diffs
            .iter()
            .find(|d| d.path == "security_summary.average_security_score")
            .unwrap();
        assert_eq!(aggregate.significance, Significance::Material);
    }
}
