use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudPlatform {
    Gcp,
    Azure,
}

impl CloudPlatform {
    /// Platforms a workspace clone replicates contexts for, in creation order.
    pub const ALL: [CloudPlatform; 2] = [CloudPlatform::Gcp, CloudPlatform::Azure];
}

impl fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudPlatform::Gcp => write!(f, "GCP"),
            CloudPlatform::Azure => write!(f, "AZURE"),
        }
    }
}

/// Per-platform provisioned environment attached to a workspace.
///
/// `properties` carries the platform identifiers (GCP project id, Azure
/// tenant/subscription/resource group) that resource provisioning needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudContext {
    pub workspace_id: Uuid,
    pub platform: CloudPlatform,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
