use crate::clone::cloud_context::CreateCloudContextFlight;
use crate::clone::composer::CloneWorkspaceFlight;
use crate::clone::context::{ClonePlan, CloneWorkspaceParams};
use crate::clone::dispatch::{CloneAllResourcesFlight, DispatchTable};
use crate::clone::resource_steps::ProvisionerCloneFlight;
use crate::config::CloneConfig;
use crate::error::{OrchestratorError, Result};
use crate::flight::{
    FlightRegistry, FlightStatus, OperationExecutor, OperationKind, OperationRequest,
    SubmitOutcome,
};
use crate::model::{CloneWorkspaceRequest, ClonedWorkspace, CloudPlatform};
use crate::services::{CloneServices, ProvisionerRegistry};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Register every flight a workspace clone launches.
pub fn register_clone_flights(
    registry: &mut FlightRegistry,
    services: &CloneServices,
    provisioners: ProvisionerRegistry,
    config: &CloneConfig,
) {
    registry.register(Arc::new(CloneWorkspaceFlight::new(
        services.clone(),
        config.clone(),
    )));
    registry.register(Arc::new(CloneAllResourcesFlight::new(
        DispatchTable::standard(),
        services.resources.clone(),
        config.resource_poll,
        config.step_retry,
    )));
    registry.register(Arc::new(CreateCloudContextFlight::new(
        services.workspaces.clone(),
        services.cloud_contexts.clone(),
        config.step_retry,
    )));
    registry.register(Arc::new(ProvisionerCloneFlight::new(
        provisioners,
        config.resource_poll,
        config.step_retry,
    )));
}

/// Entry point for cloning a workspace.
#[derive(Clone)]
pub struct WorkspaceCloneService {
    executor: Arc<dyn OperationExecutor>,
    services: CloneServices,
    config: CloneConfig,
}

impl WorkspaceCloneService {
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        services: CloneServices,
        config: CloneConfig,
    ) -> Self {
        Self {
            executor,
            services,
            config,
        }
    }

    /// Decide which optional stages the clone of `source` needs.
    pub async fn plan(&self, source_workspace_id: Uuid) -> Result<ClonePlan> {
        let mut platforms = Vec::new();
        for platform in CloudPlatform::ALL {
            if self
                .services
                .workspaces
                .get_cloud_context(source_workspace_id, platform)
                .await?
                .is_some()
            {
                platforms.push(platform);
            }
        }
        Ok(ClonePlan {
            merge_policies: self.config.merge_policies,
            platforms,
        })
    }

    /// Start cloning under `job_id` and return it. Submitting the same job id
    /// again does not start a second clone.
    #[instrument(skip(self, request), fields(source = %request.source_workspace_id))]
    pub async fn clone_workspace(
        &self,
        job_id: &str,
        request: CloneWorkspaceRequest,
    ) -> Result<String> {
        if request.source_workspace_id == request.destination.workspace_id {
            return Err(OrchestratorError::InvalidInput(
                "source and destination workspace must differ".to_string(),
            ));
        }

        let plan = self.plan(request.source_workspace_id).await?;
        let params = CloneWorkspaceParams { request, plan };
        let operation = OperationRequest::new(
            OperationKind::CloneWorkspace,
            format!(
                "clone workspace {} to {}",
                params.request.source_workspace_id, params.request.destination.workspace_id
            ),
            &params,
        )?;

        match self.executor.submit(job_id, operation).await? {
            SubmitOutcome::Accepted => info!(job_id, "workspace clone submitted"),
            SubmitOutcome::Duplicate => info!(job_id, "workspace clone already submitted"),
        }
        Ok(job_id.to_string())
    }

    /// Wait for a clone job and return its response.
    pub async fn wait_for_clone(&self, job_id: &str) -> Result<ClonedWorkspace> {
        let state = self
            .executor
            .await_completion(job_id, &self.config.clone_poll)
            .await?;

        match state.status {
            FlightStatus::Success => {
                let payload = state.result.ok_or_else(|| {
                    OrchestratorError::InvalidState(format!("clone {job_id} has no result"))
                })?;
                Ok(serde_json::from_value(payload)?)
            }
            FlightStatus::Error | FlightStatus::Fatal => Err(OrchestratorError::CloneFailed(
                state
                    .error_message
                    .unwrap_or_else(|| format!("clone {job_id} failed")),
            )),
            FlightStatus::Running => Err(OrchestratorError::InvalidState(format!(
                "clone {job_id} is still running"
            ))),
        }
    }
}
