use super::{name_from_id, AnalyzerError, AnalyzerResult};
use crate::model::{
    AnalysisSession, IsolationMode, NetworkConfiguration, NetworkTopology, OutboundRule,
    OutboundRuleType, PrivateEndpoint,
};
use crate::reader::{read_with_retry, ReadRequest, ResourceReader, RetryPolicy};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Determines the workspace's network topology, isolation mode, private
/// endpoints and outbound rule set.
pub struct NetworkAnalyzer {
    reader: Arc<dyn ResourceReader>,
    retry: RetryPolicy,
}

impl NetworkAnalyzer {
    pub fn new(reader: Arc<dyn ResourceReader>, retry: RetryPolicy) -> Self {
        Self { reader, retry }
    }

    /// Analyze network configuration from the already-fetched workspace
    /// document plus the dedicated endpoint/rule listings.
    pub async fn analyze(
        &self,
        session: &AnalysisSession,
        workspace: &Value,
    ) -> AnalyzerResult<NetworkConfiguration> {
        if !workspace.is_object() {
            return Err(AnalyzerError::InvalidWorkspace(
                "workspace document is not an object".to_string(),
            ));
        }

        let managed_network = field(workspace, &["managed_network", "managedNetwork"]);
        let topology = if managed_network.map(|m| m.is_object()).unwrap_or(false) {
            NetworkTopology::Managed
        } else {
            NetworkTopology::Customer
        };

        let isolation_mode = match topology {
            NetworkTopology::Managed => managed_network
                .and_then(|m| field(m, &["isolation_mode", "isolationMode"]))
                .and_then(Value::as_str)
                .map(parse_isolation_mode)
                .unwrap_or(IsolationMode::AllowInternetOutbound),
            // Customer-controlled networks manage outbound policy outside
            // the platform.
            NetworkTopology::Customer => IsolationMode::Disabled,
        };

        let public_network_access = field(workspace, &["public_network_access", "publicNetworkAccess"])
            .and_then(Value::as_str)
            .map(|v| v.eq_ignore_ascii_case("enabled"))
            .unwrap_or(true);

        let mut private_endpoints = self.endpoints_from_workspace(workspace);
        self.merge_listed_endpoints(session, &mut private_endpoints)
            .await;
        private_endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        private_endpoints.dedup_by(|a, b| a.name == b.name);

        // Disabled isolation means the outbound rule set lives outside the
        // platform: empty by design, not missing data.
        let outbound_rules = if isolation_mode == IsolationMode::Disabled {
            Vec::new()
        } else {
            self.collect_outbound_rules(session, managed_network).await
        };

        Ok(NetworkConfiguration {
            topology,
            isolation_mode,
            public_network_access,
            private_endpoints,
            outbound_rules,
        })
    }

    /// Endpoint connections embedded in the workspace document.
    fn endpoints_from_workspace(&self, workspace: &Value) -> Vec<PrivateEndpoint> {
        let mut endpoints = Vec::new();
        let connections = field(
            workspace,
            &["private_endpoint_connections", "privateEndpointConnections"],
        )
        .and_then(Value::as_array);

        for connection in connections.into_iter().flatten() {
            let endpoint = field(connection, &["private_endpoint", "privateEndpoint"]);
            let Some(id) = endpoint
                .and_then(|e| e.get("id"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            endpoints.push(PrivateEndpoint {
                name: name_from_id(id),
                target_resource_id: Some(id.to_string()),
                provisioning_state: field(connection, &["provisioning_state", "provisioningState"])
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
        endpoints
    }

    /// Merge endpoints from the resource-group listing, filtered to this
    /// workspace. Listing failures degrade to the document-embedded set.
    async fn merge_listed_endpoints(
        &self,
        session: &AnalysisSession,
        endpoints: &mut Vec<PrivateEndpoint>,
    ) {
        let request = ReadRequest::PrivateEndpoints {
            resource_group: session.resource_group.clone(),
        };
        let listed = match read_with_retry(self.reader.as_ref(), &request, &self.retry).await {
            Ok(value) => value,
            Err(err) => {
                warn!("private endpoint listing failed, using workspace data only: {}", err);
                return;
            }
        };

        let workspace_marker = format!("/workspaces/{}", session.workspace_name.to_lowercase());
        for endpoint in listed.as_array().into_iter().flatten() {
            let connections = field(
                endpoint,
                &["private_link_service_connections", "privateLinkServiceConnections"],
            )
            .and_then(Value::as_array);

            let targets_workspace = connections.into_iter().flatten().any(|c| {
                field(c, &["private_link_service_id", "privateLinkServiceId"])
                    .and_then(Value::as_str)
                    .map(|id| id.to_lowercase().contains(&workspace_marker))
                    .unwrap_or(false)
            });
            if !targets_workspace {
                continue;
            }

            let Some(name) = endpoint.get("name").and_then(Value::as_str) else {
                continue;
            };
            if endpoints.iter().any(|e| e.name == name) {
                continue;
            }
            endpoints.push(PrivateEndpoint {
                name: name.to_string(),
                target_resource_id: endpoint.get("id").and_then(Value::as_str).map(str::to_string),
                provisioning_state: field(endpoint, &["provisioning_state", "provisioningState"])
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }

    /// Outbound rules from the workspace document merged with the
    /// dedicated listing, deduplicated by rule name and sorted.
    async fn collect_outbound_rules(
        &self,
        session: &AnalysisSession,
        managed_network: Option<&Value>,
    ) -> Vec<OutboundRule> {
        let mut rules: Vec<OutboundRule> = Vec::new();

        let embedded = managed_network
            .and_then(|m| field(m, &["outbound_rules", "outboundRules"]))
            .cloned();
        match embedded {
            // The workspace document can carry rules as a list or as a
            // name-keyed map depending on the API surface.
            Some(Value::Array(items)) => {
                for item in &items {
                    if let Some(rule) = parse_outbound_rule(item, None) {
                        rules.push(rule);
                    }
                }
            }
            Some(Value::Object(map)) => {
                for (name, item) in &map {
                    if let Some(rule) = parse_outbound_rule(item, Some(name)) {
                        rules.push(rule);
                    }
                }
            }
            _ => {}
        }

        let request = ReadRequest::OutboundRules {
            workspace: session.workspace_name.clone(),
            resource_group: session.resource_group.clone(),
        };
        match read_with_retry(self.reader.as_ref(), &request, &self.retry).await {
            Ok(listed) => {
                for item in listed.as_array().into_iter().flatten() {
                    if let Some(rule) = parse_outbound_rule(item, None) {
                        if !rules.iter().any(|r| r.name == rule.name) {
                            rules.push(rule);
                        }
                    }
                }
            }
            Err(err) => {
                warn!("outbound rule listing failed, using workspace data only: {}", err);
            }
        }

        rules.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("collected {} outbound rules", rules.len());
        rules
    }
}

/// Look a key up on the value itself, then under `properties`.
pub(crate) fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    for key in keys {
        if let Some(found) = value.get(key) {
            if !found.is_null() {
                return Some(found);
            }
        }
    }
    let properties = value.get("properties")?;
    for key in keys {
        if let Some(found) = properties.get(key) {
            if !found.is_null() {
                return Some(found);
            }
        }
    }
    None
}

fn parse_isolation_mode(raw: &str) -> IsolationMode {
    let normalized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "allowonlyapprovedoutbound" => IsolationMode::AllowOnlyApprovedOutbound,
        "allowinternetoutbound" => IsolationMode::AllowInternetOutbound,
        _ => IsolationMode::Disabled,
    }
}

fn parse_rule_type(raw: &str) -> Option<OutboundRuleType> {
    let normalized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "fqdn" => Some(OutboundRuleType::Fqdn),
        "servicetag" => Some(OutboundRuleType::ServiceTag),
        "privateendpoint" => Some(OutboundRuleType::PrivateEndpoint),
        _ => None,
    }
}

fn parse_outbound_rule(item: &Value, name_hint: Option<&str>) -> Option<OutboundRule> {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .or(name_hint)?
        .to_string();
    let rule_type = field(item, &["type", "rule_type"])
        .and_then(Value::as_str)
        .and_then(parse_rule_type)?;
    let destination = field(item, &["destination"])
        .map(|d| flatten_destination(rule_type, d))
        .unwrap_or_default();

    Some(OutboundRule {
        name,
        rule_type,
        destination,
    })
}

/// Flatten the destination payload into a single display string. The
/// shape differs per rule type.
fn flatten_destination(rule_type: OutboundRuleType, destination: &Value) -> String {
    match rule_type {
        OutboundRuleType::Fqdn => destination.as_str().unwrap_or_default().to_string(),
        OutboundRuleType::ServiceTag => {
            if let Some(obj) = destination.as_object() {
                let tag = obj
                    .get("service_tag")
                    .or_else(|| obj.get("serviceTag"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let ports = obj
                    .get("port_ranges")
                    .or_else(|| obj.get("portRanges"))
                    .and_then(Value::as_str)
                    .unwrap_or("Any");
                format!("{} (ports: {})", tag, ports)
            } else {
                destination.as_str().unwrap_or_default().to_string()
            }
        }
        OutboundRuleType::PrivateEndpoint => {
            if let Some(obj) = destination.as_object() {
                obj.get("service_resource_id")
                    .or_else(|| obj.get("serviceResourceId"))
                    .and_then(Value::as_str)
                    .map(name_from_id)
                    .unwrap_or_default()
            } else {
                destination.as_str().unwrap_or_default().to_string()
            }
        }
    }
}
