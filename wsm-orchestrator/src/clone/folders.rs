use crate::clone::context::CloneWorkspaceContext;
use crate::error::{CollaboratorError, StepError};
use crate::flight::{Step, StepResult};
use crate::model::{validate_folder_forest, Folder};
use crate::services::FolderStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Reads the source folder forest and reserves a destination id for every
/// folder. The map is persisted before any folder is created, so a resumed
/// clone reuses the same ids.
pub struct PlanFolderCloneStep {
    folders: Arc<dyn FolderStore>,
}

impl PlanFolderCloneStep {
    pub fn new(folders: Arc<dyn FolderStore>) -> Self {
        Self { folders }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for PlanFolderCloneStep {
    fn name(&self) -> &str {
        "plan_folder_clone"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        if ctx.folder_id_map.is_some() {
            return Ok(());
        }

        let source = ctx.source_workspace_id();
        let folders = self.folders.list_folders(source).await?;
        validate_folder_forest(source, &folders)?;

        let folder_id_map: BTreeMap<Uuid, Uuid> = folders
            .iter()
            .map(|folder| (folder.id, Uuid::new_v4()))
            .collect();

        debug!(workspace_id = %source, folders = folders.len(), "planned folder clone");
        ctx.source_folders = Some(folders);
        ctx.folder_id_map = Some(folder_id_map);
        Ok(())
    }
}

/// Destination copy of `source`, detached from any parent.
fn detached_copy(source: &Folder, destination_workspace_id: Uuid, id: Uuid) -> Folder {
    Folder {
        id,
        workspace_id: destination_workspace_id,
        display_name: source.display_name.clone(),
        description: source.description.clone(),
        parent_folder_id: None,
        properties: source.properties.clone(),
    }
}

fn mapped(map: &BTreeMap<Uuid, Uuid>, source_id: Uuid) -> Result<Uuid, StepError> {
    map.get(&source_id)
        .copied()
        .ok_or_else(|| StepError::fatal(format!("folder {source_id} missing from folder id map")))
}

/// Creates the destination folders in two passes: every folder detached
/// first, then parent links, so creation order never matters.
pub struct CloneAllFoldersStep {
    folders: Arc<dyn FolderStore>,
}

impl CloneAllFoldersStep {
    pub fn new(folders: Arc<dyn FolderStore>) -> Self {
        Self { folders }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for CloneAllFoldersStep {
    fn name(&self) -> &str {
        "clone_all_folders"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let destination = ctx.destination_workspace_id();
        let source_folders = ctx.require_source_folders()?;
        let map = ctx.require_folder_id_map()?;

        for folder in source_folders {
            let copy = detached_copy(folder, destination, mapped(map, folder.id)?);
            match self.folders.create_folder(&copy).await {
                Ok(()) => {}
                // Created by an earlier attempt of this step.
                Err(CollaboratorError::AlreadyExists(_)) => {
                    debug!(folder_id = %copy.id, "folder already cloned");
                }
                Err(err) => return Err(err.into()),
            }
        }

        for folder in source_folders {
            if let Some(parent) = folder.parent_folder_id {
                let folder_id = mapped(map, folder.id)?;
                let parent_id = mapped(map, parent)?;
                self.folders
                    .set_folder_parent(destination, folder_id, Some(parent_id))
                    .await?;
            }
        }

        info!(
            workspace_id = %destination,
            folders = source_folders.len(),
            "cloned folder hierarchy"
        );
        Ok(())
    }

    async fn undo_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        match self
            .folders
            .delete_all_folders(ctx.destination_workspace_id())
            .await
        {
            Ok(()) | Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
