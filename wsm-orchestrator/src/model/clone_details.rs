use crate::error::{OrchestratorError, Result};
use crate::model::resource::{CloningInstructions, ResourceType, StewardshipType, WsmResource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-resource clone state. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloneResult {
    Pending,
    Succeeded,
    Failed,
    Skipped,
}

impl CloneResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CloneResult::Pending)
    }
}

/// Outcome of cloning one source resource, keyed by source resource id in
/// the clone result map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsmResourceCloneDetails {
    pub result: CloneResult,
    pub stewardship_type: StewardshipType,
    pub resource_type: ResourceType,
    pub cloning_instructions: CloningInstructions,
    pub source_resource_id: Uuid,
    pub destination_resource_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub error_message: Option<String>,
}

impl WsmResourceCloneDetails {
    pub fn pending(resource: &WsmResource) -> Self {
        Self {
            result: CloneResult::Pending,
            stewardship_type: resource.stewardship_type,
            resource_type: resource.resource_type,
            cloning_instructions: resource.cloning_instructions,
            source_resource_id: resource.resource_id,
            destination_resource_id: None,
            name: resource.name.clone(),
            description: resource.description.clone(),
            error_message: None,
        }
    }

    pub fn succeeded(resource: &WsmResource, destination_resource_id: Uuid) -> Self {
        Self {
            result: CloneResult::Succeeded,
            destination_resource_id: Some(destination_resource_id),
            ..Self::pending(resource)
        }
    }

    pub fn skipped(resource: &WsmResource) -> Self {
        Self {
            result: CloneResult::Skipped,
            ..Self::pending(resource)
        }
    }

    pub fn failed(resource: &WsmResource, error_message: impl Into<String>) -> Self {
        Self {
            result: CloneResult::Failed,
            error_message: Some(error_message.into()),
            ..Self::pending(resource)
        }
    }

    /// Caller-facing form. A pending entry here means the clone finished
    /// without resolving this resource, which is an invariant violation.
    pub fn to_api(&self) -> Result<ResourceCloneDetail> {
        let result = match self.result {
            CloneResult::Succeeded => ClonedResourceResult::Succeeded,
            CloneResult::Failed => ClonedResourceResult::Failed,
            CloneResult::Skipped => ClonedResourceResult::Skipped,
            CloneResult::Pending => {
                return Err(OrchestratorError::InvalidState(format!(
                    "resource {} has no terminal clone result",
                    self.source_resource_id
                )))
            }
        };

        Ok(ResourceCloneDetail {
            source_resource_id: self.source_resource_id,
            destination_resource_id: self.destination_resource_id,
            name: self.name.clone(),
            description: self.description.clone(),
            stewardship_type: self.stewardship_type,
            resource_type: self.resource_type,
            cloning_instructions: self.cloning_instructions,
            result,
            error_message: self.error_message.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClonedResourceResult {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCloneDetail {
    pub source_resource_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_resource_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub stewardship_type: StewardshipType,
    pub resource_type: ResourceType,
    pub cloning_instructions: CloningInstructions,
    pub result: ClonedResourceResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonedWorkspace {
    pub source_workspace_id: Uuid,
    pub destination_workspace_id: Uuid,
    pub resources: Vec<ResourceCloneDetail>,
}

impl ClonedWorkspace {
    pub fn resource(&self, source_resource_id: Uuid) -> Option<&ResourceCloneDetail> {
        self.resources
            .iter()
            .find(|detail| detail.source_resource_id == source_resource_id)
    }

    /// True when no resource failed. A partially failed clone still completes
    /// normally; callers inspect the per-resource results.
    pub fn fully_succeeded(&self) -> bool {
        self.resources
            .iter()
            .all(|detail| detail.result != ClonedResourceResult::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn dataset() -> WsmResource {
        WsmResource {
            resource_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            name: "cohort".to_string(),
            description: None,
            stewardship_type: StewardshipType::Controlled,
            resource_type: ResourceType::BigQueryDataset,
            cloning_instructions: CloningInstructions::CopyResource,
            properties: BTreeMap::new(),
            resource_lineage: vec![],
            attributes: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!CloneResult::Pending.is_terminal());
        assert!(CloneResult::Succeeded.is_terminal());
        assert!(CloneResult::Failed.is_terminal());
        assert!(CloneResult::Skipped.is_terminal());
    }

    #[test]
    fn test_pending_details_cannot_be_reported() {
        let details = WsmResourceCloneDetails::pending(&dataset());
        assert!(matches!(
            details.to_api(),
            Err(OrchestratorError::InvalidState(_))
        ));
    }

    #[test]
    fn test_api_form_carries_destination_and_error() {
        let resource = dataset();
        let dest = Uuid::new_v4();

        let ok = WsmResourceCloneDetails::succeeded(&resource, dest)
            .to_api()
            .unwrap();
        assert_eq!(ok.result, ClonedResourceResult::Succeeded);
        assert_eq!(ok.destination_resource_id, Some(dest));

        let failed = WsmResourceCloneDetails::failed(&resource, "quota exceeded")
            .to_api()
            .unwrap();
        assert_eq!(failed.result, ClonedResourceResult::Failed);
        assert_eq!(failed.destination_resource_id, None);
        assert_eq!(failed.error_message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_fully_succeeded_ignores_skipped() {
        let resource = dataset();
        let workspace = ClonedWorkspace {
            source_workspace_id: resource.workspace_id,
            destination_workspace_id: Uuid::new_v4(),
            resources: vec![
                WsmResourceCloneDetails::skipped(&resource).to_api().unwrap(),
                WsmResourceCloneDetails::succeeded(&resource, Uuid::new_v4())
                    .to_api()
                    .unwrap(),
            ],
        };
        assert!(workspace.fully_succeeded());
    }
}
