use crate::clone::context::CloneWorkspaceContext;
use crate::flight::{Step, StepResult};
use crate::services::ApplicationService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Records which applications are enabled in the source workspace.
pub struct FindEnabledApplicationsStep {
    applications: Arc<dyn ApplicationService>,
    page_size: u32,
}

impl FindEnabledApplicationsStep {
    pub fn new(applications: Arc<dyn ApplicationService>, page_size: u32) -> Self {
        Self {
            applications,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for FindEnabledApplicationsStep {
    fn name(&self) -> &str {
        "find_enabled_applications"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let source = ctx.source_workspace_id();
        let mut enabled = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .applications
                .list_enabled_applications(source, offset, self.page_size)
                .await?;
            let fetched = page.len() as u32;
            enabled.extend(page);
            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        info!(workspace_id = %source, applications = enabled.len(), "found enabled applications");
        ctx.applications = Some(enabled);
        Ok(())
    }
}

/// Enables every recorded application in the destination.
pub struct EnableApplicationsStep {
    applications: Arc<dyn ApplicationService>,
}

impl EnableApplicationsStep {
    pub fn new(applications: Arc<dyn ApplicationService>) -> Self {
        Self { applications }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for EnableApplicationsStep {
    fn name(&self) -> &str {
        "enable_applications"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let destination = ctx.destination_workspace_id();
        for application_id in ctx.require_applications()? {
            self.applications
                .enable_application(destination, application_id)
                .await?;
        }
        Ok(())
    }
}
