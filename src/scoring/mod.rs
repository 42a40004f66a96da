use crate::analyzers::DiscoveredResource;
use crate::config::ScoringWeights;
use crate::model::{
    ConnectedResource, IsolationMode, NetworkConfiguration, Priority, Recommendation,
    ResourceKind, SecuritySummary,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Turns discovery output and network findings into scored resources and
/// the workspace-level security summary. Pure in-memory transform: no
/// suspension, no remote calls.
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score every resource and aggregate the summary. Builds fresh
    /// [`ConnectedResource`] instances; discovery records are never
    /// mutated.
    pub fn score(
        &self,
        network: Option<&NetworkConfiguration>,
        discovered: &[DiscoveredResource],
    ) -> (Vec<ConnectedResource>, SecuritySummary) {
        let resources: Vec<ConnectedResource> = discovered
            .iter()
            .map(|r| ConnectedResource {
                resource_id: r.resource_id.clone(),
                kind: r.kind,
                name: r.name.clone(),
                access_method: r.access_method,
                security_score: self.score_resource(network, r),
                issues: r.issues.clone(),
            })
            .collect();

        let average = if resources.is_empty() {
            // No resources to average: the aggregate is the network-only
            // score so an empty workspace still reports a posture.
            f64::from(self.network_only_score(network))
        } else {
            let sum: u32 = resources.iter().map(|r| u32::from(r.security_score)).sum();
            sum as f64 / resources.len() as f64
        };

        let mut resources_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for resource in &resources {
            *resources_by_kind
                .entry(resource.kind.label().to_string())
                .or_default() += 1;
        }

        let summary = SecuritySummary {
            total_resources: resources.len(),
            resources_by_kind,
            average_security_score: (average * 10.0).round() / 10.0,
            public_accessible: discovered.iter().filter(|r| r.public_access_enabled).count(),
            private_endpoint_protected: discovered
                .iter()
                .filter(|r| r.private_endpoint_count > 0)
                .count(),
            recommendations: self.recommendations(network, discovered),
        };

        debug!(
            "scored {} resources, average {:.1}",
            summary.total_resources, summary.average_security_score
        );
        (resources, summary)
    }

    /// Weighted per-resource score, rounded and clamped to [0, 100].
    pub fn score_resource(
        &self,
        network: Option<&NetworkConfiguration>,
        resource: &DiscoveredResource,
    ) -> u8 {
        // An unrecognized kind has no analyzable posture at all.
        if resource.kind == ResourceKind::Unknown {
            return 0;
        }

        let w = &self.weights;
        let endpoint_factor = if resource.private_endpoint_count > 0 { 100.0 } else { 0.0 };
        let public_factor = if resource.public_access_enabled { 0.0 } else { 100.0 };
        let isolation_factor = network
            .map(|n| isolation_subscore(n.isolation_mode))
            .unwrap_or(0.0);
        // Not-applicable diagnostics never penalize the kind.
        let diagnostics_factor = match resource.diagnostics_enabled {
            Some(true) | None => 100.0,
            Some(false) => 0.0,
        };

        let weighted = w.private_endpoint * endpoint_factor
            + w.public_access * public_factor
            + w.isolation * isolation_factor
            + w.secure_defaults * f64::from(resource.secure_defaults)
            + w.diagnostics * diagnostics_factor;

        weighted.round().clamp(0.0, 100.0) as u8
    }

    /// Aggregate for a workspace with zero resources: the network-derivable
    /// factors re-normalized over their combined weight.
    pub fn network_only_score(&self, network: Option<&NetworkConfiguration>) -> u8 {
        let Some(network) = network else {
            return 0;
        };
        let w = &self.weights;
        let endpoint_factor = if network.private_endpoints.is_empty() { 0.0 } else { 100.0 };
        let public_factor = if network.public_network_access { 0.0 } else { 100.0 };
        let isolation_factor = isolation_subscore(network.isolation_mode);

        let combined = w.network_factor_total();
        if combined <= f64::EPSILON {
            return 0;
        }
        let weighted = (w.private_endpoint * endpoint_factor
            + w.public_access * public_factor
            + w.isolation * isolation_factor)
            / combined;
        weighted.round().clamp(0.0, 100.0) as u8
    }

    /// Rule-derived recommendations, ordered high → medium → low with ties
    /// broken by resource name ascending.
    fn recommendations(
        &self,
        network: Option<&NetworkConfiguration>,
        discovered: &[DiscoveredResource],
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        for resource in discovered {
            if resource.public_access_enabled && resource.private_endpoint_count == 0 {
                recommendations.push(Recommendation {
                    priority: Priority::High,
                    text: format!(
                        "Disable public network access or add a private endpoint for '{}'",
                        resource.name
                    ),
                    resource_id: Some(resource.resource_id.clone()),
                });
            }
            if resource.diagnostics_enabled == Some(false) {
                recommendations.push(Recommendation {
                    priority: Priority::Low,
                    text: format!("Enable diagnostic settings for '{}'", resource.name),
                    resource_id: Some(resource.resource_id.clone()),
                });
            }
        }

        if let Some(network) = network {
            if network.isolation_mode == IsolationMode::AllowInternetOutbound {
                recommendations.push(Recommendation {
                    priority: Priority::Medium,
                    text: "Switch the managed network to allow-only-approved-outbound isolation"
                        .to_string(),
                    resource_id: None,
                });
            }
        }

        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| sort_key(a).cmp(&sort_key(b)))
        });
        recommendations
    }
}

fn sort_key(recommendation: &Recommendation) -> &str {
    recommendation
        .resource_id
        .as_deref()
        .unwrap_or(&recommendation.text)
}

fn isolation_subscore(mode: IsolationMode) -> f64 {
    match mode {
        IsolationMode::AllowOnlyApprovedOutbound => 100.0,
        IsolationMode::AllowInternetOutbound => 50.0,
        IsolationMode::Disabled => 25.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessMethod, IssueCode, NetworkTopology, PrivateEndpoint, ResourceKind};

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringWeights::default())
    }

    fn network(isolation: IsolationMode, public: bool, endpoints: usize) -> NetworkConfiguration {
        NetworkConfiguration {
            topology: NetworkTopology::Managed,
            isolation_mode: isolation,
            public_network_access: public,
            private_endpoints: (0..endpoints)
                .map(|i| PrivateEndpoint {
                    name: format!("pe-{}", i),
                    target_resource_id: None,
                    provisioning_state: Some("Succeeded".to_string()),
                })
                .collect(),
            outbound_rules: Vec::new(),
        }
    }

    fn hardened(name: &str) -> DiscoveredResource {
        DiscoveredResource {
            resource_id: format!("/r/{}", name),
            kind: ResourceKind::Storage,
            name: name.to_string(),
            access_method: AccessMethod::PrivateEndpoint,
            public_access_enabled: false,
            private_endpoint_count: 1,
            secure_defaults: 100,
            diagnostics_enabled: Some(true),
            issues: Vec::new(),
        }
    }

    fn exposed(name: &str) -> DiscoveredResource {
        DiscoveredResource {
            resource_id: format!("/r/{}", name),
            kind: ResourceKind::Storage,
            name: name.to_string(),
            access_method: AccessMethod::Public,
            public_access_enabled: true,
            private_endpoint_count: 0,
            secure_defaults: 0,
            diagnostics_enabled: Some(false),
            issues: vec![IssueCode::PublicAccessEnabled],
        }
    }

    #[test]
    fn fully_hardened_resource_scores_100() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 1);
        let score = engine().score_resource(Some(&net), &hardened("a"));
        assert_eq!(score, 100);
    }

    #[test]
    fn fully_exposed_resource_scores_10() {
        // Only the isolation factor contributes: 0.20 * 50
        let net = network(IsolationMode::AllowInternetOutbound, true, 0);
        let score = engine().score_resource(Some(&net), &exposed("a"));
        assert_eq!(score, 10);
    }

    #[test]
    fn scores_stay_within_bounds() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 1);
        for resource in [hardened("a"), exposed("b")] {
            let score = engine().score_resource(Some(&net), &resource);
            assert!(score <= 100);
        }
    }

    #[test]
    fn average_is_arithmetic_mean() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 1);
        let discovered = vec![hardened("a"), exposed("b")];
        let (resources, summary) = engine().score(Some(&net), &discovered);

        let expected: f64 = resources
            .iter()
            .map(|r| f64::from(r.security_score))
            .sum::<f64>()
            / resources.len() as f64;
        assert!((summary.average_security_score - expected).abs() < 0.1);
        assert_eq!(summary.total_resources, 2);
        assert_eq!(summary.public_accessible, 1);
        assert_eq!(summary.private_endpoint_protected, 1);
    }

    #[test]
    fn zero_resources_fall_back_to_network_only_score() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 2);
        let (resources, summary) = engine().score(Some(&net), &[]);
        assert!(resources.is_empty());
        // (0.30*100 + 0.25*100 + 0.20*100) / 0.75 = 100
        assert_eq!(summary.average_security_score, 100.0);
        assert!(!summary.average_security_score.is_nan());
    }

    #[test]
    fn hardened_workspace_meets_the_ninety_bar() {
        // approved-outbound-only, public access disabled, 3/3 behind
        // private endpoints
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 3);
        let discovered = vec![hardened("a"), hardened("b"), hardened("c")];
        let (_, summary) = engine().score(Some(&net), &discovered);

        assert!(summary.average_security_score >= 90.0);
        assert!(summary
            .recommendations
            .iter()
            .all(|r| r.priority != Priority::High));
    }

    #[test]
    fn public_resource_without_endpoint_gets_high_priority_named_rec() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 0);
        let discovered = vec![hardened("safe"), exposed("leaky")];
        let (_, summary) = engine().score(Some(&net), &discovered);

        let high: Vec<_> = summary
            .recommendations
            .iter()
            .filter(|r| r.priority == Priority::High)
            .collect();
        assert_eq!(high.len(), 1);
        assert!(high[0].text.contains("leaky"));
        assert_eq!(high[0].resource_id.as_deref(), Some("/r/leaky"));
    }

    #[test]
    fn recommendations_are_ranked_high_medium_low() {
        let net = network(IsolationMode::AllowInternetOutbound, true, 0);
        let discovered = vec![exposed("zeta"), exposed("alpha")];
        let (_, summary) = engine().score(Some(&net), &discovered);

        let priorities: Vec<Priority> =
            summary.recommendations.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);

        // ties broken by resource ascending
        let high: Vec<_> = summary
            .recommendations
            .iter()
            .filter(|r| r.priority == Priority::High)
            .collect();
        assert!(high[0].text.contains("alpha"));
        assert!(high[1].text.contains("zeta"));
    }

    #[test]
    fn unknown_kind_always_scores_zero() {
        let net = network(IsolationMode::AllowOnlyApprovedOutbound, false, 3);
        let unrecognized = crate::analyzers::DiscoveredResource::unrecognized(
            "/x/custom".to_string(),
            "custom".to_string(),
        );
        assert_eq!(engine().score_resource(Some(&net), &unrecognized), 0);
    }

    #[test]
    fn missing_network_removes_isolation_credit() {
        let score_with = engine().score_resource(
            Some(&network(IsolationMode::AllowOnlyApprovedOutbound, false, 1)),
            &hardened("a"),
        );
        let score_without = engine().score_resource(None, &hardened("a"));
        assert_eq!(score_with - score_without, 20);
    }
}
