//! Collaborators the clone orchestrator drives but does not implement.

use crate::error::CollaboratorError;
use crate::model::{
    CloningInstructions, CloudContext, CloudPlatform, DestinationWorkspace, Folder, Policy,
    ResourceType, WsmResource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

#[async_trait]
pub trait WorkspaceService: Send + Sync {
    /// Create the destination workspace. Fails with `AlreadyExists` when a
    /// workspace with this id is already present.
    async fn create_workspace(&self, workspace: &DestinationWorkspace) -> CollaboratorResult<()>;

    async fn delete_workspace(&self, workspace_id: Uuid) -> CollaboratorResult<()>;

    async fn get_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<Option<CloudContext>>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// One page of a workspace's resources, in a stable order.
    async fn enumerate_resources(
        &self,
        workspace_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> CollaboratorResult<Vec<WsmResource>>;

    /// Store a referenced resource. Fails with `AlreadyExists` when the
    /// resource id is taken.
    async fn create_referenced_resource(&self, resource: &WsmResource) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait FolderStore: Send + Sync {
    async fn list_folders(&self, workspace_id: Uuid) -> CollaboratorResult<Vec<Folder>>;

    /// Fails with `AlreadyExists` when the folder id is taken.
    async fn create_folder(&self, folder: &Folder) -> CollaboratorResult<()>;

    async fn set_folder_parent(
        &self,
        workspace_id: Uuid,
        folder_id: Uuid,
        parent_folder_id: Option<Uuid>,
    ) -> CollaboratorResult<()>;

    async fn delete_all_folders(&self, workspace_id: Uuid) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait PolicyService: Send + Sync {
    async fn get_policy(&self, workspace_id: Uuid) -> CollaboratorResult<Option<Policy>>;

    /// Merge the source workspace's policy attributes into the destination.
    async fn clone_policy(&self, source_workspace_id: Uuid, destination_workspace_id: Uuid)
        -> CollaboratorResult<()>;

    async fn delete_policy(&self, workspace_id: Uuid) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait CloudContextProvisioner: Send + Sync {
    /// Provision a context. Fails with `AlreadyExists` if one is present.
    async fn create_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<CloudContext>;

    async fn delete_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait ApplicationService: Send + Sync {
    async fn list_enabled_applications(
        &self,
        workspace_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> CollaboratorResult<Vec<String>>;

    /// Enabling an already enabled application is a no-op.
    async fn enable_application(
        &self,
        workspace_id: Uuid,
        application_id: &str,
    ) -> CollaboratorResult<()>;
}

/// Everything a provisioner needs to copy one controlled resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCloneRequest {
    pub source: WsmResource,
    pub destination_workspace_id: Uuid,
    pub destination_resource_id: Uuid,
    pub destination_folder_id: Option<Uuid>,
    pub cloning_instructions: CloningInstructions,
    pub name_override: Option<String>,
    pub description_override: Option<String>,
    pub location: Option<String>,
    /// Policies were merged once for the whole workspace; the per-resource
    /// clone must not merge them again.
    pub skip_policy_merge: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionerJobState {
    Running,
    /// `None` when nothing was created.
    Succeeded(Option<WsmResource>),
    Failed(String),
}

/// Copies controlled resources of one or more types.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Start copying. Calling again with the same destination resource id
    /// must return the handle of the existing job.
    async fn clone_resource(&self, request: &ResourceCloneRequest) -> CollaboratorResult<String>;

    async fn get_clone_result(&self, job_handle: &str) -> CollaboratorResult<ProvisionerJobState>;

    /// Remove a copy made by `clone_resource`.
    async fn delete_clone(
        &self,
        _workspace_id: Uuid,
        _resource_id: Uuid,
    ) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Controlled-resource provisioners by resource type.
#[derive(Default, Clone)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<ResourceType, Arc<dyn ResourceProvisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        resource_type: ResourceType,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) {
        self.provisioners.insert(resource_type, provisioner);
    }

    pub fn with(
        mut self,
        resource_type: ResourceType,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Self {
        self.register(resource_type, provisioner);
        self
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<Arc<dyn ResourceProvisioner>> {
        self.provisioners.get(&resource_type).cloned()
    }
}

/// The collaborators a workspace clone talks to.
#[derive(Clone)]
pub struct CloneServices {
    pub workspaces: Arc<dyn WorkspaceService>,
    pub resources: Arc<dyn ResourceStore>,
    pub folders: Arc<dyn FolderStore>,
    pub policies: Arc<dyn PolicyService>,
    pub cloud_contexts: Arc<dyn CloudContextProvisioner>,
    pub applications: Arc<dyn ApplicationService>,
}
