use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The workspace a clone creates and fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationWorkspace {
    pub workspace_id: Uuid,
    pub user_facing_id: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub spend_profile: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneWorkspaceRequest {
    pub source_workspace_id: Uuid,
    pub destination: DestinationWorkspace,
    /// Preferred cloud location for controlled copies; providers fall back to
    /// the source location when unset.
    pub location: Option<String>,
}

/// Policy attributes attached to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub workspace_id: Uuid,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}
