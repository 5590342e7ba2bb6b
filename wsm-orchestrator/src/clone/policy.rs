use crate::clone::context::CloneWorkspaceContext;
use crate::error::CollaboratorError;
use crate::flight::{Step, StepResult};
use crate::services::PolicyService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Copies the source workspace's policy attributes onto the destination.
pub struct MergePolicyStep {
    policies: Arc<dyn PolicyService>,
}

impl MergePolicyStep {
    pub fn new(policies: Arc<dyn PolicyService>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for MergePolicyStep {
    fn name(&self) -> &str {
        "merge_policy"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let source = ctx.source_workspace_id();
        let destination = ctx.destination_workspace_id();

        if self.policies.get_policy(source).await?.is_none() {
            info!(workspace_id = %source, "source has no policy to merge");
            return Ok(());
        }

        self.policies.clone_policy(source, destination).await?;
        info!(source = %source, destination = %destination, "merged workspace policy");
        Ok(())
    }

    async fn undo_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        match self
            .policies
            .delete_policy(ctx.destination_workspace_id())
            .await
        {
            Ok(()) | Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
