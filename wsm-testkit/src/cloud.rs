//! In-memory workspace manager backing every collaborator trait.
//!
//! One [`FakeCloud`] plays the workspace service, resource and folder stores,
//! policy service, cloud context provisioner, application service and the
//! controlled-resource provisioners. Tests seed it, inject failures, run a
//! clone against it and then inspect what ended up where.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use wsm_orchestrator::error::CollaboratorError;
use wsm_orchestrator::model::{
    CloudContext, CloudPlatform, DestinationWorkspace, Folder, Policy, WsmResource,
};
use wsm_orchestrator::services::{
    ApplicationService, CloudContextProvisioner, CollaboratorResult, FolderStore, PolicyService,
    ProvisionerJobState, ResourceCloneRequest, ResourceProvisioner, ResourceStore,
    WorkspaceService,
};

/// Mutating collaborator calls, for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    CreateWorkspace,
    DeleteWorkspace,
    CreateFolder,
    SetFolderParent,
    DeleteAllFolders,
    ClonePolicy,
    DeletePolicy,
    CreateCloudContext,
    DeleteCloudContext,
    CreateReferencedResource,
    CloneResource,
    GetCloneResult,
    DeleteClone,
    EnableApplication,
}

struct CloneJob {
    request: ResourceCloneRequest,
    polls_left: u32,
    outcome: Option<ProvisionerJobState>,
}

#[derive(Default)]
struct CloudState {
    workspaces: BTreeMap<Uuid, DestinationWorkspace>,
    resources: BTreeMap<Uuid, Vec<WsmResource>>,
    folders: BTreeMap<Uuid, Vec<Folder>>,
    policies: BTreeMap<Uuid, Policy>,
    cloud_contexts: BTreeMap<(Uuid, CloudPlatform), CloudContext>,
    applications: BTreeMap<Uuid, Vec<String>>,
    jobs: HashMap<String, CloneJob>,
    calls: HashMap<Call, usize>,
    transient: HashMap<Call, usize>,
    rejections: HashMap<Call, String>,
    failing_clones: HashMap<Uuid, String>,
    job_latency: u32,
}

impl CloudState {
    fn require_workspace(&self, workspace_id: Uuid) -> CollaboratorResult<()> {
        if self.workspaces.contains_key(&workspace_id) {
            Ok(())
        } else {
            Err(CollaboratorError::NotFound(format!("workspace {workspace_id}")))
        }
    }

    fn resource_exists(&self, resource_id: Uuid) -> bool {
        self.resources
            .values()
            .flatten()
            .any(|resource| resource.resource_id == resource_id)
    }

    // Finishes a provisioner job the first time it is observed complete.
    fn finish_job(&mut self, request: &ResourceCloneRequest) -> ProvisionerJobState {
        if let Some(message) = self.failing_clones.get(&request.source.resource_id) {
            return ProvisionerJobState::Failed(message.clone());
        }

        let workspace_id = request.destination_workspace_id;
        if !self.workspaces.contains_key(&workspace_id) {
            return ProvisionerJobState::Failed(format!(
                "destination workspace {workspace_id} does not exist"
            ));
        }
        if let Some(platform) = request.source.resource_type.cloud_platform() {
            if !self.cloud_contexts.contains_key(&(workspace_id, platform)) {
                return ProvisionerJobState::Failed(format!(
                    "workspace {workspace_id} has no {platform} cloud context"
                ));
            }
        }

        let mut copy = request.source.build_clone(
            workspace_id,
            request.destination_resource_id,
            request.destination_folder_id,
        );
        if let Some(name) = &request.name_override {
            copy.name = name.clone();
        }
        if let Some(description) = &request.description_override {
            copy.description = Some(description.clone());
        }

        if !self.resource_exists(copy.resource_id) {
            self.resources
                .entry(workspace_id)
                .or_default()
                .push(copy.clone());
        }
        ProvisionerJobState::Succeeded(Some(copy))
    }
}

pub struct FakeCloud {
    state: Mutex<CloudState>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState {
                job_latency: 1,
                ..CloudState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count `call` and apply any injected failure before the call runs.
    fn enter(&self, call: Call) -> CollaboratorResult<MutexGuard<'_, CloudState>> {
        let mut state = self.state();
        *state.calls.entry(call).or_default() += 1;

        if let Some(remaining) = state.transient.get_mut(&call) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CollaboratorError::Transient(format!("{call:?} unavailable")));
            }
        }
        if let Some(message) = state.rejections.get(&call) {
            return Err(CollaboratorError::Rejected(message.clone()));
        }
        Ok(state)
    }

    // Seeding

    pub fn add_workspace(&self, workspace_id: Uuid) {
        let simple = workspace_id.simple().to_string();
        self.state().workspaces.insert(
            workspace_id,
            DestinationWorkspace {
                workspace_id,
                user_facing_id: format!("ws-{}", &simple[..8]),
                display_name: None,
                description: None,
                spend_profile: None,
                properties: BTreeMap::new(),
            },
        );
    }

    pub fn add_folder(&self, folder: Folder) {
        self.state()
            .folders
            .entry(folder.workspace_id)
            .or_default()
            .push(folder);
    }

    pub fn add_resource(&self, resource: WsmResource) {
        self.state()
            .resources
            .entry(resource.workspace_id)
            .or_default()
            .push(resource);
    }

    pub fn set_policy(&self, policy: Policy) {
        self.state().policies.insert(policy.workspace_id, policy);
    }

    pub fn add_cloud_context(&self, context: CloudContext) {
        self.state()
            .cloud_contexts
            .insert((context.workspace_id, context.platform), context);
    }

    pub fn add_application(&self, workspace_id: Uuid, application_id: &str) {
        let mut state = self.state();
        let enabled = state.applications.entry(workspace_id).or_default();
        if !enabled.iter().any(|id| id == application_id) {
            enabled.push(application_id.to_string());
        }
    }

    // Failure injection

    /// Fail the next `times` invocations of `call` with a transient error.
    pub fn fail_transiently(&self, call: Call, times: usize) {
        self.state().transient.insert(call, times);
    }

    /// Reject every invocation of `call` from now on.
    pub fn reject(&self, call: Call, message: &str) {
        self.state().rejections.insert(call, message.to_string());
    }

    /// Make the provisioner job copying `source_resource_id` fail.
    pub fn fail_resource_clone(&self, source_resource_id: Uuid, message: &str) {
        self.state()
            .failing_clones
            .insert(source_resource_id, message.to_string());
    }

    /// How many polls a provisioner job reports `Running` before it finishes.
    pub fn set_job_latency(&self, polls: u32) {
        self.state().job_latency = polls;
    }

    // Inspection

    pub fn calls(&self, call: Call) -> usize {
        self.state().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn workspace_exists(&self, workspace_id: Uuid) -> bool {
        self.state().workspaces.contains_key(&workspace_id)
    }

    pub fn workspace(&self, workspace_id: Uuid) -> Option<DestinationWorkspace> {
        self.state().workspaces.get(&workspace_id).cloned()
    }

    pub fn folders(&self, workspace_id: Uuid) -> Vec<Folder> {
        self.state()
            .folders
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn resources(&self, workspace_id: Uuid) -> Vec<WsmResource> {
        self.state()
            .resources
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn policy(&self, workspace_id: Uuid) -> Option<Policy> {
        self.state().policies.get(&workspace_id).cloned()
    }

    pub fn cloud_context(&self, workspace_id: Uuid, platform: CloudPlatform) -> Option<CloudContext> {
        self.state()
            .cloud_contexts
            .get(&(workspace_id, platform))
            .cloned()
    }

    pub fn applications(&self, workspace_id: Uuid) -> Vec<String> {
        self.state()
            .applications
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn page<T: Clone>(items: &[T], offset: u32, limit: u32) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl WorkspaceService for FakeCloud {
    async fn create_workspace(&self, workspace: &DestinationWorkspace) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::CreateWorkspace)?;
        if state.workspaces.contains_key(&workspace.workspace_id) {
            return Err(CollaboratorError::AlreadyExists(format!(
                "workspace {}",
                workspace.workspace_id
            )));
        }
        state
            .workspaces
            .insert(workspace.workspace_id, workspace.clone());
        Ok(())
    }

    async fn delete_workspace(&self, workspace_id: Uuid) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::DeleteWorkspace)?;
        if state.workspaces.remove(&workspace_id).is_none() {
            return Err(CollaboratorError::NotFound(format!("workspace {workspace_id}")));
        }
        state.resources.remove(&workspace_id);
        state.folders.remove(&workspace_id);
        state.policies.remove(&workspace_id);
        state.applications.remove(&workspace_id);
        state
            .cloud_contexts
            .retain(|(owner, _), _| *owner != workspace_id);
        Ok(())
    }

    async fn get_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<Option<CloudContext>> {
        Ok(self.cloud_context(workspace_id, platform))
    }
}

#[async_trait]
impl ResourceStore for FakeCloud {
    async fn enumerate_resources(
        &self,
        workspace_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> CollaboratorResult<Vec<WsmResource>> {
        let state = self.state();
        state.require_workspace(workspace_id)?;
        Ok(state
            .resources
            .get(&workspace_id)
            .map(|resources| page(resources, offset, limit))
            .unwrap_or_default())
    }

    async fn create_referenced_resource(&self, resource: &WsmResource) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::CreateReferencedResource)?;
        state.require_workspace(resource.workspace_id)?;
        if state.resource_exists(resource.resource_id) {
            return Err(CollaboratorError::AlreadyExists(format!(
                "resource {}",
                resource.resource_id
            )));
        }
        state
            .resources
            .entry(resource.workspace_id)
            .or_default()
            .push(resource.clone());
        Ok(())
    }
}

#[async_trait]
impl FolderStore for FakeCloud {
    async fn list_folders(&self, workspace_id: Uuid) -> CollaboratorResult<Vec<Folder>> {
        let state = self.state();
        state.require_workspace(workspace_id)?;
        Ok(state.folders.get(&workspace_id).cloned().unwrap_or_default())
    }

    async fn create_folder(&self, folder: &Folder) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::CreateFolder)?;
        state.require_workspace(folder.workspace_id)?;
        let folders = state.folders.entry(folder.workspace_id).or_default();
        if folders.iter().any(|existing| existing.id == folder.id) {
            return Err(CollaboratorError::AlreadyExists(format!("folder {}", folder.id)));
        }
        if let Some(parent) = folder.parent_folder_id {
            if !folders.iter().any(|existing| existing.id == parent) {
                return Err(CollaboratorError::NotFound(format!("parent folder {parent}")));
            }
        }
        folders.push(folder.clone());
        Ok(())
    }

    async fn set_folder_parent(
        &self,
        workspace_id: Uuid,
        folder_id: Uuid,
        parent_folder_id: Option<Uuid>,
    ) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::SetFolderParent)?;
        let folders = state
            .folders
            .get_mut(&workspace_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("folder {folder_id}")))?;
        if let Some(parent) = parent_folder_id {
            if !folders.iter().any(|existing| existing.id == parent) {
                return Err(CollaboratorError::NotFound(format!("parent folder {parent}")));
            }
        }
        let folder = folders
            .iter_mut()
            .find(|existing| existing.id == folder_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("folder {folder_id}")))?;
        folder.parent_folder_id = parent_folder_id;
        Ok(())
    }

    async fn delete_all_folders(&self, workspace_id: Uuid) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::DeleteAllFolders)?;
        state.folders.remove(&workspace_id);
        Ok(())
    }
}

#[async_trait]
impl PolicyService for FakeCloud {
    async fn get_policy(&self, workspace_id: Uuid) -> CollaboratorResult<Option<Policy>> {
        Ok(self.policy(workspace_id))
    }

    async fn clone_policy(
        &self,
        source_workspace_id: Uuid,
        destination_workspace_id: Uuid,
    ) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::ClonePolicy)?;
        state.require_workspace(destination_workspace_id)?;
        let Some(source) = state.policies.get(&source_workspace_id).cloned() else {
            return Ok(());
        };

        let destination = state
            .policies
            .entry(destination_workspace_id)
            .or_insert_with(|| Policy {
                workspace_id: destination_workspace_id,
                attributes: BTreeMap::new(),
            });
        for (key, values) in source.attributes {
            let merged = destination.attributes.entry(key).or_default();
            for value in values {
                if !merged.contains(&value) {
                    merged.push(value);
                }
            }
        }
        Ok(())
    }

    async fn delete_policy(&self, workspace_id: Uuid) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::DeletePolicy)?;
        match state.policies.remove(&workspace_id) {
            Some(_) => Ok(()),
            None => Err(CollaboratorError::NotFound(format!("policy of {workspace_id}"))),
        }
    }
}

#[async_trait]
impl CloudContextProvisioner for FakeCloud {
    async fn create_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<CloudContext> {
        let mut state = self.enter(Call::CreateCloudContext)?;
        state.require_workspace(workspace_id)?;
        if state.cloud_contexts.contains_key(&(workspace_id, platform)) {
            return Err(CollaboratorError::AlreadyExists(format!(
                "{platform} cloud context of {workspace_id}"
            )));
        }

        let simple = workspace_id.simple().to_string();
        let mut properties = BTreeMap::new();
        match platform {
            CloudPlatform::Gcp => {
                properties.insert("gcpProjectId".to_string(), format!("terra-{}", &simple[..8]));
            }
            CloudPlatform::Azure => {
                properties.insert(
                    "azureResourceGroupId".to_string(),
                    format!("mrg-{}", &simple[..8]),
                );
            }
        }
        let context = CloudContext {
            workspace_id,
            platform,
            properties,
        };
        state
            .cloud_contexts
            .insert((workspace_id, platform), context.clone());
        Ok(context)
    }

    async fn delete_cloud_context(
        &self,
        workspace_id: Uuid,
        platform: CloudPlatform,
    ) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::DeleteCloudContext)?;
        match state.cloud_contexts.remove(&(workspace_id, platform)) {
            Some(_) => Ok(()),
            None => Err(CollaboratorError::NotFound(format!(
                "{platform} cloud context of {workspace_id}"
            ))),
        }
    }
}

#[async_trait]
impl ApplicationService for FakeCloud {
    async fn list_enabled_applications(
        &self,
        workspace_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> CollaboratorResult<Vec<String>> {
        let state = self.state();
        Ok(state
            .applications
            .get(&workspace_id)
            .map(|enabled| page(enabled, offset, limit))
            .unwrap_or_default())
    }

    async fn enable_application(
        &self,
        workspace_id: Uuid,
        application_id: &str,
    ) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::EnableApplication)?;
        state.require_workspace(workspace_id)?;
        let enabled = state.applications.entry(workspace_id).or_default();
        if !enabled.iter().any(|id| id == application_id) {
            enabled.push(application_id.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvisioner for FakeCloud {
    async fn clone_resource(&self, request: &ResourceCloneRequest) -> CollaboratorResult<String> {
        let mut state = self.enter(Call::CloneResource)?;
        let handle = format!("clone-{}", request.destination_resource_id);
        if !state.jobs.contains_key(&handle) {
            let polls_left = state.job_latency;
            state.jobs.insert(
                handle.clone(),
                CloneJob {
                    request: request.clone(),
                    polls_left,
                    outcome: None,
                },
            );
        }
        Ok(handle)
    }

    async fn get_clone_result(&self, job_handle: &str) -> CollaboratorResult<ProvisionerJobState> {
        let mut state = self.enter(Call::GetCloneResult)?;
        let job = state
            .jobs
            .get_mut(job_handle)
            .ok_or_else(|| CollaboratorError::NotFound(format!("clone job {job_handle}")))?;
        if let Some(outcome) = &job.outcome {
            return Ok(outcome.clone());
        }
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(ProvisionerJobState::Running);
        }

        let request = job.request.clone();
        let outcome = state.finish_job(&request);
        if let Some(job) = state.jobs.get_mut(job_handle) {
            job.outcome = Some(outcome.clone());
        }
        Ok(outcome)
    }

    async fn delete_clone(&self, workspace_id: Uuid, resource_id: Uuid) -> CollaboratorResult<()> {
        let mut state = self.enter(Call::DeleteClone)?;
        let resources = state
            .resources
            .get_mut(&workspace_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("resource {resource_id}")))?;
        let before = resources.len();
        resources.retain(|resource| resource.resource_id != resource_id);
        if resources.len() == before {
            return Err(CollaboratorError::NotFound(format!("resource {resource_id}")));
        }
        Ok(())
    }
}
