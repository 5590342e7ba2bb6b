use crate::clone::aggregate::CloneResultMap;
use crate::error::StepError;
use crate::model::{
    CloneWorkspaceRequest, ClonedWorkspace, CloudContext, CloudPlatform, Folder, WsmResource,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One enumerated resource and the ids reserved for its clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCloneInputs {
    pub resource: WsmResource,
    pub operation_id: String,
    pub destination_resource_id: Uuid,
    pub destination_folder_id: Option<Uuid>,
}

impl ResourceCloneInputs {
    pub fn source_resource_id(&self) -> Uuid {
        self.resource.resource_id
    }
}

/// Which optional stages a workspace clone includes. Fixed at submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonePlan {
    pub merge_policies: bool,
    /// Platforms with a cloud context in the source workspace.
    pub platforms: Vec<CloudPlatform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneWorkspaceParams {
    pub request: CloneWorkspaceRequest,
    pub plan: ClonePlan,
}

fn missing(field: &str) -> StepError {
    StepError::fatal(format!("clone context is missing {field}"))
}

/// Working state of a whole-workspace clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneWorkspaceContext {
    pub request: CloneWorkspaceRequest,
    pub plan: ClonePlan,
    pub source_folders: Option<Vec<Folder>>,
    /// Source folder id to destination folder id.
    pub folder_id_map: Option<BTreeMap<Uuid, Uuid>>,
    pub work_items: Option<Vec<ResourceCloneInputs>>,
    #[serde(default)]
    pub cloud_context_operation_ids: BTreeMap<CloudPlatform, String>,
    #[serde(default)]
    pub cloud_contexts: BTreeMap<CloudPlatform, CloudContext>,
    pub clone_resources_operation_id: Option<String>,
    pub clone_results: Option<CloneResultMap>,
    pub applications: Option<Vec<String>>,
    pub response: Option<ClonedWorkspace>,
}

impl CloneWorkspaceContext {
    pub fn new(params: CloneWorkspaceParams) -> Self {
        Self {
            request: params.request,
            plan: params.plan,
            source_folders: None,
            folder_id_map: None,
            work_items: None,
            cloud_context_operation_ids: BTreeMap::new(),
            cloud_contexts: BTreeMap::new(),
            clone_resources_operation_id: None,
            clone_results: None,
            applications: None,
            response: None,
        }
    }

    pub fn source_workspace_id(&self) -> Uuid {
        self.request.source_workspace_id
    }

    pub fn destination_workspace_id(&self) -> Uuid {
        self.request.destination.workspace_id
    }

    pub fn require_source_folders(&self) -> Result<&[Folder], StepError> {
        self.source_folders
            .as_deref()
            .ok_or_else(|| missing("source folders"))
    }

    pub fn require_folder_id_map(&self) -> Result<&BTreeMap<Uuid, Uuid>, StepError> {
        self.folder_id_map
            .as_ref()
            .ok_or_else(|| missing("folder id map"))
    }

    pub fn require_work_items(&self) -> Result<&[ResourceCloneInputs], StepError> {
        self.work_items
            .as_deref()
            .ok_or_else(|| missing("resource work items"))
    }

    pub fn require_cloud_context_operation_id(
        &self,
        platform: CloudPlatform,
    ) -> Result<&str, StepError> {
        self.cloud_context_operation_ids
            .get(&platform)
            .map(String::as_str)
            .ok_or_else(|| missing(&format!("{platform} cloud context operation id")))
    }

    pub fn require_clone_resources_operation_id(&self) -> Result<&str, StepError> {
        self.clone_resources_operation_id
            .as_deref()
            .ok_or_else(|| missing("resource clone operation id"))
    }

    pub fn require_clone_results(&self) -> Result<&CloneResultMap, StepError> {
        self.clone_results
            .as_ref()
            .ok_or_else(|| missing("clone results"))
    }

    pub fn require_applications(&self) -> Result<&[String], StepError> {
        self.applications
            .as_deref()
            .ok_or_else(|| missing("enabled applications"))
    }
}

/// Parameters of the resource dispatcher sub-operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneAllResourcesParams {
    pub source_workspace_id: Uuid,
    pub destination_workspace_id: Uuid,
    pub location: Option<String>,
    pub work_items: Vec<ResourceCloneInputs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneAllResourcesContext {
    pub params: CloneAllResourcesParams,
    #[serde(default)]
    pub results: CloneResultMap,
}

impl CloneAllResourcesContext {
    pub fn new(params: CloneAllResourcesParams) -> Self {
        Self {
            params,
            results: CloneResultMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DestinationWorkspace;

    fn context() -> CloneWorkspaceContext {
        CloneWorkspaceContext::new(CloneWorkspaceParams {
            request: CloneWorkspaceRequest {
                source_workspace_id: Uuid::new_v4(),
                destination: DestinationWorkspace {
                    workspace_id: Uuid::new_v4(),
                    user_facing_id: "dest".to_string(),
                    display_name: None,
                    description: None,
                    spend_profile: None,
                    properties: BTreeMap::new(),
                },
                location: None,
            },
            plan: ClonePlan::default(),
        })
    }

    #[test]
    fn test_missing_fields_fail_fatally() {
        let ctx = context();
        assert!(matches!(ctx.require_folder_id_map(), Err(StepError::Fatal(_))));
        assert!(matches!(ctx.require_work_items(), Err(StepError::Fatal(_))));
        assert!(matches!(
            ctx.require_cloud_context_operation_id(CloudPlatform::Gcp),
            Err(StepError::Fatal(_))
        ));
    }

    #[test]
    fn test_context_survives_json_round_trip() {
        let mut ctx = context();
        ctx.folder_id_map = Some(BTreeMap::from([(Uuid::new_v4(), Uuid::new_v4())]));
        ctx.cloud_context_operation_ids
            .insert(CloudPlatform::Azure, "op-azure".to_string());

        let value = serde_json::to_value(&ctx).unwrap();
        let restored: CloneWorkspaceContext = serde_json::from_value(value).unwrap();
        assert_eq!(restored, ctx);
        assert_eq!(
            restored
                .require_cloud_context_operation_id(CloudPlatform::Azure)
                .unwrap(),
            "op-azure"
        );
    }
}
