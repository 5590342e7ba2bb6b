use crate::clone::context::CloneWorkspaceContext;
use crate::error::CollaboratorError;
use crate::flight::{Step, StepResult};
use crate::services::WorkspaceService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates the destination workspace. Undoing it discards everything the
/// clone put there.
pub struct CreateDestinationWorkspaceStep {
    workspaces: Arc<dyn WorkspaceService>,
}

impl CreateDestinationWorkspaceStep {
    pub fn new(workspaces: Arc<dyn WorkspaceService>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for CreateDestinationWorkspaceStep {
    fn name(&self) -> &str {
        "create_destination_workspace"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let destination = &ctx.request.destination;
        match self.workspaces.create_workspace(destination).await {
            Ok(()) => {
                info!(workspace_id = %destination.workspace_id, "created destination workspace");
                Ok(())
            }
            Err(CollaboratorError::AlreadyExists(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn undo_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let workspace_id = ctx.destination_workspace_id();
        match self.workspaces.delete_workspace(workspace_id).await {
            Ok(()) => {
                warn!(workspace_id = %workspace_id, "deleted destination workspace");
                Ok(())
            }
            Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
