use crate::clone::context::{CloneWorkspaceContext, ResourceCloneInputs};
use crate::error::CollaboratorError;
use crate::flight::{OperationExecutor, Step, StepResult};
use crate::model::{ResourceType, StewardshipType, WsmResource};
use crate::services::ResourceStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Controlled resource types whose definition can be copied. Compute is left
/// out: its live state cannot be duplicated.
pub const CLONEABLE_CONTROLLED_TYPES: [ResourceType; 5] = [
    ResourceType::GcsBucket,
    ResourceType::BigQueryDataset,
    ResourceType::FlexibleResource,
    ResourceType::AzureStorageContainer,
    ResourceType::AzureManagedIdentity,
];

pub fn is_cloneable(stewardship: StewardshipType, resource_type: ResourceType) -> bool {
    match stewardship {
        StewardshipType::Referenced => true,
        StewardshipType::Controlled => CLONEABLE_CONTROLLED_TYPES.contains(&resource_type),
    }
}

/// Page through every resource of a workspace.
pub async fn list_all_resources(
    store: &dyn ResourceStore,
    workspace_id: Uuid,
    page_size: u32,
) -> Result<Vec<WsmResource>, CollaboratorError> {
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = store
            .enumerate_resources(workspace_id, offset, page_size)
            .await?;
        let fetched = page.len() as u32;
        all.extend(page);
        if fetched < page_size {
            return Ok(all);
        }
        offset += fetched;
    }
}

/// Select the resources to clone, referenced first, and reserve a
/// destination id and a sub-operation id for each.
///
/// Paging a workspace that changes underneath can return a resource twice;
/// only its first occurrence is kept.
pub fn plan_work_items(
    resources: Vec<WsmResource>,
    folder_id_map: &BTreeMap<Uuid, Uuid>,
    mut new_operation_id: impl FnMut() -> String,
) -> Vec<ResourceCloneInputs> {
    let mut seen = BTreeSet::new();
    let mut eligible: Vec<WsmResource> = resources
        .into_iter()
        .filter(|r| is_cloneable(r.stewardship_type, r.resource_type))
        .filter(|r| seen.insert(r.resource_id))
        .collect();
    eligible.sort_by_key(|r| r.stewardship_type);

    eligible
        .into_iter()
        .map(|resource| {
            let destination_folder_id = resource
                .folder_id()
                .and_then(|folder| folder_id_map.get(&folder).copied());
            ResourceCloneInputs {
                operation_id: new_operation_id(),
                destination_resource_id: Uuid::new_v4(),
                destination_folder_id,
                resource,
            }
        })
        .collect()
}

pub struct FindResourcesToCloneStep {
    resources: Arc<dyn ResourceStore>,
    executor: Arc<dyn OperationExecutor>,
    page_size: u32,
}

impl FindResourcesToCloneStep {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        executor: Arc<dyn OperationExecutor>,
        page_size: u32,
    ) -> Self {
        Self {
            resources,
            executor,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for FindResourcesToCloneStep {
    fn name(&self) -> &str {
        "find_resources_to_clone"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        // Ids are reserved once; a resumed run keeps the persisted ones.
        if ctx.work_items.is_some() {
            return Ok(());
        }

        let source = ctx.source_workspace_id();
        let resources = list_all_resources(self.resources.as_ref(), source, self.page_size).await?;
        let total = resources.len();
        let folder_id_map = ctx.require_folder_id_map()?;
        let work_items = plan_work_items(resources, folder_id_map, || {
            self.executor.new_operation_id()
        });

        info!(
            workspace_id = %source,
            total,
            cloneable = work_items.len(),
            "enumerated resources to clone"
        );
        ctx.work_items = Some(work_items);
        Ok(())
    }
}
