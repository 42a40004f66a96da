use super::network::field;
use super::{access_method_for, name_from_id, DiscoveredResource};
use crate::model::{AccessMethod, IssueCode, ResourceKind};
use serde_json::Value;

/// Build the security profile for one resource from its control-plane
/// document. Dispatch is an explicit match over the closed kind set;
/// `Unknown` never reaches this function (discovery short-circuits it).
pub fn profile(
    kind: ResourceKind,
    resource_id: &str,
    document: &Value,
    diagnostics: Option<&Value>,
) -> DiscoveredResource {
    let name = name_from_id(resource_id);
    match kind {
        ResourceKind::Storage => profile_storage(resource_id, name, document, diagnostics),
        ResourceKind::KeyVault => profile_key_vault(resource_id, name, document, diagnostics),
        ResourceKind::ContainerRegistry => {
            profile_registry(resource_id, name, document, diagnostics)
        }
        ResourceKind::CognitiveService => {
            profile_cognitive(resource_id, name, document, diagnostics)
        }
        ResourceKind::Compute => profile_compute(resource_id, name, document),
        ResourceKind::Unknown => DiscoveredResource::unrecognized(resource_id.to_string(), name),
    }
}

fn public_access_enabled(document: &Value) -> bool {
    field(document, &["public_network_access", "publicNetworkAccess"])
        .and_then(Value::as_str)
        .map(|v| v.eq_ignore_ascii_case("enabled"))
        // Defaults open when the flag is absent: that is the platform's
        // behavior for resources never configured otherwise.
        .unwrap_or(true)
}

fn private_endpoint_count(document: &Value) -> usize {
    field(
        document,
        &["private_endpoint_connections", "privateEndpointConnections"],
    )
    .and_then(Value::as_array)
    .map(|a| a.len())
    .unwrap_or(0)
}

fn diagnostics_present(diagnostics: Option<&Value>) -> Option<bool> {
    // A failed or missing diagnostics read yields None: the factor is
    // treated as unknown rather than penalized.
    let value = diagnostics?;
    match value {
        Value::Array(items) => Some(!items.is_empty()),
        Value::Object(obj) => obj
            .get("value")
            .and_then(Value::as_array)
            .map(|a| !a.is_empty()),
        _ => None,
    }
}

fn flag(document: &Value, keys: &[&str]) -> Option<bool> {
    field(document, keys).and_then(Value::as_bool)
}

fn base_issues(
    public_access: bool,
    endpoint_count: usize,
    diagnostics: Option<bool>,
    issues: &mut Vec<IssueCode>,
) {
    if public_access {
        issues.push(IssueCode::PublicAccessEnabled);
    }
    if endpoint_count == 0 {
        issues.push(IssueCode::NoPrivateEndpoint);
    }
    if diagnostics == Some(false) {
        issues.push(IssueCode::DiagnosticsMissing);
    }
}

fn profile_storage(
    resource_id: &str,
    name: String,
    document: &Value,
    diagnostics: Option<&Value>,
) -> DiscoveredResource {
    let public_access = public_access_enabled(document);
    let endpoints = private_endpoint_count(document);
    let diagnostics = diagnostics_present(diagnostics);
    let mut issues = Vec::new();

    let blob_public = flag(document, &["allow_blob_public_access", "allowBlobPublicAccess"])
        .unwrap_or(true);
    let acl_denies = field(document, &["network_acls", "networkAcls"])
        .and_then(|acls| field(acls, &["default_action", "defaultAction"]))
        .and_then(Value::as_str)
        .map(|v| v.eq_ignore_ascii_case("deny"))
        .unwrap_or(false);

    let mut secure_defaults = 0u8;
    if !blob_public {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::BlobPublicAccess);
    }
    if acl_denies {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::NetworkAclOpen);
    }
    base_issues(public_access, endpoints, diagnostics, &mut issues);

    DiscoveredResource {
        resource_id: resource_id.to_string(),
        kind: ResourceKind::Storage,
        name,
        access_method: access_method_for(endpoints, public_access),
        public_access_enabled: public_access,
        private_endpoint_count: endpoints,
        secure_defaults,
        diagnostics_enabled: diagnostics,
        issues,
    }
}

fn profile_key_vault(
    resource_id: &str,
    name: String,
    document: &Value,
    diagnostics: Option<&Value>,
) -> DiscoveredResource {
    let public_access = public_access_enabled(document);
    let endpoints = private_endpoint_count(document);
    let diagnostics = diagnostics_present(diagnostics);
    let mut issues = Vec::new();

    let soft_delete = flag(document, &["enable_soft_delete", "enableSoftDelete"]).unwrap_or(false);
    let purge_protection =
        flag(document, &["enable_purge_protection", "enablePurgeProtection"]).unwrap_or(false);
    let rbac = flag(
        document,
        &["enable_rbac_authorization", "enableRbacAuthorization"],
    )
    .unwrap_or(false);

    let mut secure_defaults = 0u8;
    if soft_delete {
        secure_defaults += 34;
    } else {
        issues.push(IssueCode::SoftDeleteDisabled);
    }
    if purge_protection {
        secure_defaults += 33;
    } else {
        issues.push(IssueCode::PurgeProtectionDisabled);
    }
    if rbac {
        secure_defaults += 33;
    } else {
        issues.push(IssueCode::RbacDisabled);
    }
    base_issues(public_access, endpoints, diagnostics, &mut issues);

    DiscoveredResource {
        resource_id: resource_id.to_string(),
        kind: ResourceKind::KeyVault,
        name,
        access_method: access_method_for(endpoints, public_access),
        public_access_enabled: public_access,
        private_endpoint_count: endpoints,
        secure_defaults,
        diagnostics_enabled: diagnostics,
        issues,
    }
}

fn profile_registry(
    resource_id: &str,
    name: String,
    document: &Value,
    diagnostics: Option<&Value>,
) -> DiscoveredResource {
    let public_access = public_access_enabled(document);
    let endpoints = private_endpoint_count(document);
    let diagnostics = diagnostics_present(diagnostics);
    let mut issues = Vec::new();

    let admin_enabled =
        flag(document, &["admin_user_enabled", "adminUserEnabled"]).unwrap_or(false);
    let anonymous_pull =
        flag(document, &["anonymous_pull_enabled", "anonymousPullEnabled"]).unwrap_or(false);

    let mut secure_defaults = 0u8;
    if !admin_enabled {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::AdminAccountEnabled);
    }
    if !anonymous_pull {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::AnonymousPullEnabled);
    }
    base_issues(public_access, endpoints, diagnostics, &mut issues);

    DiscoveredResource {
        resource_id: resource_id.to_string(),
        kind: ResourceKind::ContainerRegistry,
        name,
        access_method: access_method_for(endpoints, public_access),
        public_access_enabled: public_access,
        private_endpoint_count: endpoints,
        secure_defaults,
        diagnostics_enabled: diagnostics,
        issues,
    }
}

fn profile_cognitive(
    resource_id: &str,
    name: String,
    document: &Value,
    diagnostics: Option<&Value>,
) -> DiscoveredResource {
    let public_access = public_access_enabled(document);
    let endpoints = private_endpoint_count(document);
    let diagnostics = diagnostics_present(diagnostics);
    let mut issues = Vec::new();

    let local_auth_disabled =
        flag(document, &["disable_local_auth", "disableLocalAuth"]).unwrap_or(false);
    let restricted_outbound = flag(
        document,
        &["restrict_outbound_network_access", "restrictOutboundNetworkAccess"],
    )
    .unwrap_or(false);

    let mut secure_defaults = 0u8;
    if local_auth_disabled {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::LocalAuthEnabled);
    }
    if restricted_outbound {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::UnrestrictedOutbound);
    }
    base_issues(public_access, endpoints, diagnostics, &mut issues);

    DiscoveredResource {
        resource_id: resource_id.to_string(),
        kind: ResourceKind::CognitiveService,
        name,
        access_method: access_method_for(endpoints, public_access),
        public_access_enabled: public_access,
        private_endpoint_count: endpoints,
        secure_defaults,
        diagnostics_enabled: diagnostics,
        issues,
    }
}

/// Compute targets are profiled from the listing entry; they expose no
/// diagnostic-settings surface, so that factor is marked not applicable.
fn profile_compute(resource_id: &str, name: String, document: &Value) -> DiscoveredResource {
    let mut issues = Vec::new();

    let subnet = field(document, &["subnet"])
        .or_else(|| {
            field(document, &["properties"])
                .and_then(|p| field(p, &["subnet"]))
        })
        .map(|s| !s.is_null())
        .unwrap_or(false);
    let ssh_public = field(document, &["ssh_public_access", "sshPublicAccess"])
        .and_then(Value::as_str)
        .map(|v| v.eq_ignore_ascii_case("enabled"))
        .unwrap_or(false);

    let mut secure_defaults = 0u8;
    if subnet {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::NoSubnetIntegration);
    }
    if !ssh_public {
        secure_defaults += 50;
    } else {
        issues.push(IssueCode::SshPublicAccess);
    }

    // No subnet means the target fronts a platform-assigned public address.
    let public_access = !subnet;
    if public_access {
        issues.push(IssueCode::PublicAccessEnabled);
    }
    let access_method = if subnet {
        AccessMethod::VnetIntegrated
    } else {
        AccessMethod::Public
    };

    DiscoveredResource {
        resource_id: resource_id.to_string(),
        kind: ResourceKind::Compute,
        name,
        access_method,
        public_access_enabled: public_access,
        private_endpoint_count: 0,
        secure_defaults,
        diagnostics_enabled: None,
        issues,
    }
}
