use crate::model::cloud_context::CloudPlatform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Property key recording which folder a resource lives in.
pub const FOLDER_ID_PROPERTY: &str = "terra-workspace-folder-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StewardshipType {
    Referenced,
    Controlled,
}

impl StewardshipType {
    pub const ALL: [StewardshipType; 2] = [StewardshipType::Referenced, StewardshipType::Controlled];
}

impl fmt::Display for StewardshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StewardshipType::Referenced => write!(f, "REFERENCED"),
            StewardshipType::Controlled => write!(f, "CONTROLLED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    GcsBucket,
    GcsObject,
    BigQueryDataset,
    BigQueryDataTable,
    DataRepoSnapshot,
    GitRepo,
    FlexibleResource,
    AiNotebookInstance,
    AzureStorageContainer,
    AzureManagedIdentity,
    AzureDatabase,
    AzureVm,
}

impl ResourceType {
    pub const ALL: [ResourceType; 12] = [
        ResourceType::GcsBucket,
        ResourceType::GcsObject,
        ResourceType::BigQueryDataset,
        ResourceType::BigQueryDataTable,
        ResourceType::DataRepoSnapshot,
        ResourceType::GitRepo,
        ResourceType::FlexibleResource,
        ResourceType::AiNotebookInstance,
        ResourceType::AzureStorageContainer,
        ResourceType::AzureManagedIdentity,
        ResourceType::AzureDatabase,
        ResourceType::AzureVm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::GcsBucket => "GCS_BUCKET",
            ResourceType::GcsObject => "GCS_OBJECT",
            ResourceType::BigQueryDataset => "BIG_QUERY_DATASET",
            ResourceType::BigQueryDataTable => "BIG_QUERY_DATA_TABLE",
            ResourceType::DataRepoSnapshot => "DATA_REPO_SNAPSHOT",
            ResourceType::GitRepo => "GIT_REPO",
            ResourceType::FlexibleResource => "FLEXIBLE_RESOURCE",
            ResourceType::AiNotebookInstance => "AI_NOTEBOOK_INSTANCE",
            ResourceType::AzureStorageContainer => "AZURE_STORAGE_CONTAINER",
            ResourceType::AzureManagedIdentity => "AZURE_MANAGED_IDENTITY",
            ResourceType::AzureDatabase => "AZURE_DATABASE",
            ResourceType::AzureVm => "AZURE_VM",
        }
    }

    /// Cloud platform whose context must exist before a controlled resource
    /// of this type can be provisioned. `None` for cloud-agnostic types.
    pub fn cloud_platform(&self) -> Option<CloudPlatform> {
        match self {
            ResourceType::GcsBucket
            | ResourceType::GcsObject
            | ResourceType::BigQueryDataset
            | ResourceType::BigQueryDataTable
            | ResourceType::AiNotebookInstance => Some(CloudPlatform::Gcp),
            ResourceType::AzureStorageContainer
            | ResourceType::AzureManagedIdentity
            | ResourceType::AzureDatabase
            | ResourceType::AzureVm => Some(CloudPlatform::Azure),
            ResourceType::DataRepoSnapshot
            | ResourceType::GitRepo
            | ResourceType::FlexibleResource => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloningInstructions {
    CopyNothing,
    CopyReference,
    CopyResource,
    CopyDefinition,
    LinkReference,
}

impl fmt::Display for CloningInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloningInstructions::CopyNothing => "COPY_NOTHING",
            CloningInstructions::CopyReference => "COPY_REFERENCE",
            CloningInstructions::CopyResource => "COPY_RESOURCE",
            CloningInstructions::CopyDefinition => "COPY_DEFINITION",
            CloningInstructions::LinkReference => "LINK_REFERENCE",
        };
        f.write_str(s)
    }
}

/// One provenance hop: the resource this one was cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLineageEntry {
    pub source_workspace_id: Uuid,
    pub source_resource_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsmResource {
    pub resource_id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stewardship_type: StewardshipType,
    pub resource_type: ResourceType,
    pub cloning_instructions: CloningInstructions,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_lineage: Vec<ResourceLineageEntry>,
    /// Type-specific attributes (bucket name, dataset id, repo url, ...).
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl WsmResource {
    /// Folder this resource is filed under, if the marker is present and well formed.
    pub fn folder_id(&self) -> Option<Uuid> {
        self.properties
            .get(FOLDER_ID_PROPERTY)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// Build the destination copy of this resource.
    ///
    /// Identity fields are replaced, the folder marker is rewritten (or dropped
    /// when there is no destination folder) and one lineage entry pointing at
    /// this resource is appended.
    pub fn build_clone(
        &self,
        destination_workspace_id: Uuid,
        destination_resource_id: Uuid,
        destination_folder_id: Option<Uuid>,
    ) -> WsmResource {
        let mut properties = self.properties.clone();
        match destination_folder_id {
            Some(folder_id) => {
                properties.insert(FOLDER_ID_PROPERTY.to_string(), folder_id.to_string());
            }
            None => {
                properties.remove(FOLDER_ID_PROPERTY);
            }
        }

        let mut resource_lineage = self.resource_lineage.clone();
        resource_lineage.push(ResourceLineageEntry {
            source_workspace_id: self.workspace_id,
            source_resource_id: self.resource_id,
        });

        WsmResource {
            resource_id: destination_resource_id,
            workspace_id: destination_workspace_id,
            name: self.name.clone(),
            description: self.description.clone(),
            stewardship_type: self.stewardship_type,
            resource_type: self.resource_type,
            cloning_instructions: self.cloning_instructions,
            properties,
            resource_lineage,
            attributes: self.attributes.clone(),
        }
    }
}
