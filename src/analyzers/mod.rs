pub mod discovery;
pub mod network;
pub mod resources;

use crate::model::{AccessMethod, IssueCode, ResourceKind};
use serde::{Deserialize, Serialize};

/// Result type for analyzer operations
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Errors that can occur during analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("workspace document is unusable: {0}")]
    InvalidWorkspace(String),

    #[error("read failed: {0}")]
    Read(#[from] crate::reader::ReaderError),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Pre-scoring record of one attached resource.
///
/// Carries the raw security attributes a type analyzer extracted; the
/// scoring engine turns these into [`crate::model::ConnectedResource`]s
/// once network findings are available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub access_method: AccessMethod,
    pub public_access_enabled: bool,
    pub private_endpoint_count: usize,
    /// Kind-specific secure-default posture, 0-100.
    pub secure_defaults: u8,
    /// None when the kind has no diagnostic-settings surface.
    pub diagnostics_enabled: Option<bool>,
    pub issues: Vec<IssueCode>,
}

impl DiscoveredResource {
    /// Placeholder for a resource whose type tag the engine does not
    /// recognize. Degrades to an unknown access method and a zero
    /// posture instead of failing the run.
    pub fn unrecognized(resource_id: String, name: String) -> Self {
        Self {
            resource_id,
            kind: ResourceKind::Unknown,
            name,
            access_method: AccessMethod::Unknown,
            public_access_enabled: false,
            private_endpoint_count: 0,
            secure_defaults: 0,
            diagnostics_enabled: None,
            issues: vec![IssueCode::UnrecognizedType],
        }
    }
}

/// Derive the access method from the two attributes every kind shares.
pub(crate) fn access_method_for(
    private_endpoint_count: usize,
    public_access_enabled: bool,
) -> AccessMethod {
    if private_endpoint_count > 0 {
        AccessMethod::PrivateEndpoint
    } else if !public_access_enabled {
        AccessMethod::VnetIntegrated
    } else {
        AccessMethod::Public
    }
}

/// Trailing segment of a resource identifier, used as the display name.
pub(crate) fn name_from_id(resource_id: &str) -> String {
    resource_id
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(resource_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_method_prefers_private_endpoint() {
        assert_eq!(access_method_for(2, true), AccessMethod::PrivateEndpoint);
        assert_eq!(access_method_for(0, false), AccessMethod::VnetIntegrated);
        assert_eq!(access_method_for(0, true), AccessMethod::Public);
    }

    #[test]
    fn name_is_last_id_segment() {
        assert_eq!(
            name_from_id("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/mlstore"),
            "mlstore"
        );
        assert_eq!(name_from_id("plainname"), "plainname");
    }

    #[test]
    fn unrecognized_resources_degrade_instead_of_failing() {
        let resource =
            DiscoveredResource::unrecognized("/x/custom".to_string(), "custom".to_string());
        assert_eq!(resource.kind, ResourceKind::Unknown);
        assert_eq!(resource.access_method, AccessMethod::Unknown);
        assert_eq!(resource.secure_defaults, 0);
        assert_eq!(resource.issues, vec![IssueCode::UnrecognizedType]);
    }
}
