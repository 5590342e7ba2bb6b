//! Builders for seeding a source workspace in a [`FakeCloud`].

use crate::cloud::FakeCloud;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use wsm_orchestrator::model::{
    CloneWorkspaceRequest, CloningInstructions, CloudContext, CloudPlatform,
    DestinationWorkspace, Folder, Policy, ResourceType, StewardshipType, WsmResource,
    FOLDER_ID_PROPERTY,
};

/// A source workspace under construction.
pub struct SourceWorkspace {
    cloud: Arc<FakeCloud>,
    pub workspace_id: Uuid,
}

impl SourceWorkspace {
    pub fn create(cloud: &Arc<FakeCloud>) -> Self {
        let workspace_id = Uuid::new_v4();
        cloud.add_workspace(workspace_id);
        Self {
            cloud: cloud.clone(),
            workspace_id,
        }
    }

    pub fn folder(&self, name: &str, parent: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.cloud.add_folder(Folder {
            id,
            workspace_id: self.workspace_id,
            display_name: name.to_string(),
            description: Some(format!("{name} folder")),
            parent_folder_id: parent,
            properties: BTreeMap::from([("owner".to_string(), "lab".to_string())]),
        });
        id
    }

    pub fn referenced(
        &self,
        name: &str,
        resource_type: ResourceType,
        cloning_instructions: CloningInstructions,
        folder: Option<Uuid>,
    ) -> WsmResource {
        self.resource(
            name,
            StewardshipType::Referenced,
            resource_type,
            cloning_instructions,
            folder,
        )
    }

    pub fn controlled(
        &self,
        name: &str,
        resource_type: ResourceType,
        cloning_instructions: CloningInstructions,
        folder: Option<Uuid>,
    ) -> WsmResource {
        self.resource(
            name,
            StewardshipType::Controlled,
            resource_type,
            cloning_instructions,
            folder,
        )
    }

    fn resource(
        &self,
        name: &str,
        stewardship_type: StewardshipType,
        resource_type: ResourceType,
        cloning_instructions: CloningInstructions,
        folder: Option<Uuid>,
    ) -> WsmResource {
        let mut properties = BTreeMap::new();
        if let Some(folder) = folder {
            properties.insert(FOLDER_ID_PROPERTY.to_string(), folder.to_string());
        }
        let resource = WsmResource {
            resource_id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            name: name.to_string(),
            description: Some(format!("{name} ({resource_type})")),
            stewardship_type,
            resource_type,
            cloning_instructions,
            properties,
            resource_lineage: vec![],
            attributes: serde_json::json!({ "name": name }),
        };
        self.cloud.add_resource(resource.clone());
        resource
    }

    pub fn cloud_context(&self, platform: CloudPlatform) {
        self.cloud.add_cloud_context(CloudContext {
            workspace_id: self.workspace_id,
            platform,
            properties: BTreeMap::new(),
        });
    }

    pub fn application(&self, application_id: &str) {
        self.cloud.add_application(self.workspace_id, application_id);
    }

    pub fn policy(&self, key: &str, values: &[&str]) {
        self.cloud.set_policy(Policy {
            workspace_id: self.workspace_id,
            attributes: BTreeMap::from([(
                key.to_string(),
                values.iter().map(|value| value.to_string()).collect(),
            )]),
        });
    }

    /// A request cloning this workspace into a fresh destination.
    pub fn clone_request(&self) -> CloneWorkspaceRequest {
        let destination_id = Uuid::new_v4();
        let simple = destination_id.simple().to_string();
        CloneWorkspaceRequest {
            source_workspace_id: self.workspace_id,
            destination: DestinationWorkspace {
                workspace_id: destination_id,
                user_facing_id: format!("copy-{}", &simple[..8]),
                display_name: Some("Copy".to_string()),
                description: None,
                spend_profile: Some("default-billing".to_string()),
                properties: BTreeMap::new(),
            },
            location: Some("us-central1".to_string()),
        }
    }
}
