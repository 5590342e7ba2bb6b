use crate::clone::applications::{EnableApplicationsStep, FindEnabledApplicationsStep};
use crate::clone::cloud_context::{AwaitCreateCloudContextStep, LaunchCreateCloudContextStep};
use crate::clone::context::{ClonePlan, CloneWorkspaceContext, CloneWorkspaceParams};
use crate::clone::destination::CreateDestinationWorkspaceStep;
use crate::clone::dispatch::{AwaitCloneAllResourcesStep, LaunchCloneAllResourcesStep};
use crate::clone::enumerate::FindResourcesToCloneStep;
use crate::clone::folders::{CloneAllFoldersStep, PlanFolderCloneStep};
use crate::clone::policy::MergePolicyStep;
use crate::config::CloneConfig;
use crate::error::{OrchestratorError, Result};
use crate::flight::{
    BoxedStep, Flight, FlightEnv, FlightOutcome, FlightRunner, OperationExecutor, OperationKind,
    Step, StepResult,
};
use crate::services::CloneServices;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Reserves the sub-operation ids of the cloud context and resource stages.
/// Ids already present are kept.
pub struct GenerateOperationIdsStep {
    executor: Arc<dyn OperationExecutor>,
}

impl GenerateOperationIdsStep {
    pub fn new(executor: Arc<dyn OperationExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for GenerateOperationIdsStep {
    fn name(&self) -> &str {
        "generate_operation_ids"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        for platform in ctx.plan.platforms.clone() {
            ctx.cloud_context_operation_ids
                .entry(platform)
                .or_insert_with(|| self.executor.new_operation_id());
        }
        if ctx.clone_resources_operation_id.is_none() {
            ctx.clone_resources_operation_id = Some(self.executor.new_operation_id());
        }
        Ok(())
    }
}

/// Assembles the caller-facing response from the dispatcher's results.
pub struct BuildCloneResponseStep;

#[async_trait]
impl Step<CloneWorkspaceContext> for BuildCloneResponseStep {
    fn name(&self) -> &str {
        "build_clone_response"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let response = ctx.require_clone_results()?.to_response(
            ctx.source_workspace_id(),
            ctx.destination_workspace_id(),
            ctx.require_work_items()?,
        )?;
        info!(
            source = %response.source_workspace_id,
            destination = %response.destination_workspace_id,
            resources = response.resources.len(),
            fully_succeeded = response.fully_succeeded(),
            "workspace clone complete"
        );
        ctx.response = Some(response);
        Ok(())
    }
}

/// What the composed steps of a workspace clone need.
#[derive(Clone)]
pub struct CloneStepDeps {
    pub services: CloneServices,
    pub executor: Arc<dyn OperationExecutor>,
    pub config: CloneConfig,
}

/// Order the clone stages for `plan`. Optional stages are included only
/// when the plan calls for them.
pub fn build_clone_workspace_steps(
    plan: &ClonePlan,
    deps: &CloneStepDeps,
) -> Vec<BoxedStep<CloneWorkspaceContext>> {
    let services = &deps.services;
    let config = &deps.config;
    let mut steps: Vec<BoxedStep<CloneWorkspaceContext>> = vec![Box::new(
        CreateDestinationWorkspaceStep::new(services.workspaces.clone()),
    )];

    if plan.merge_policies {
        steps.push(Box::new(MergePolicyStep::new(services.policies.clone())));
    }

    steps.push(Box::new(PlanFolderCloneStep::new(services.folders.clone())));
    steps.push(Box::new(CloneAllFoldersStep::new(services.folders.clone())));
    steps.push(Box::new(FindResourcesToCloneStep::new(
        services.resources.clone(),
        deps.executor.clone(),
        config.resource_page_size,
    )));
    steps.push(Box::new(GenerateOperationIdsStep::new(deps.executor.clone())));

    for platform in &plan.platforms {
        steps.push(Box::new(LaunchCreateCloudContextStep::new(
            *platform,
            deps.executor.clone(),
            services.cloud_contexts.clone(),
            config.context_poll,
        )));
        steps.push(Box::new(AwaitCreateCloudContextStep::new(
            *platform,
            deps.executor.clone(),
            config.context_poll,
        )));
    }

    steps.push(Box::new(LaunchCloneAllResourcesStep::new(deps.executor.clone())));
    steps.push(Box::new(AwaitCloneAllResourcesStep::new(
        deps.executor.clone(),
        config.resource_poll,
    )));
    steps.push(Box::new(FindEnabledApplicationsStep::new(
        services.applications.clone(),
        config.resource_page_size,
    )));
    steps.push(Box::new(EnableApplicationsStep::new(
        services.applications.clone(),
    )));
    steps.push(Box::new(BuildCloneResponseStep));
    steps
}

/// Top-level workspace clone. Its result is the [`ClonedWorkspace`].
///
/// [`ClonedWorkspace`]: crate::model::ClonedWorkspace
pub struct CloneWorkspaceFlight {
    services: CloneServices,
    config: CloneConfig,
}

impl CloneWorkspaceFlight {
    pub fn new(services: CloneServices, config: CloneConfig) -> Self {
        Self { services, config }
    }

    /// Runner and initial context for a clone, without running it.
    pub fn build_runner(
        &self,
        flight_id: &str,
        params: CloneWorkspaceParams,
        env: FlightEnv,
    ) -> (FlightRunner<CloneWorkspaceContext>, CloneWorkspaceContext) {
        let deps = CloneStepDeps {
            services: self.services.clone(),
            executor: env.executor,
            config: self.config.clone(),
        };
        let steps = build_clone_workspace_steps(&params.plan, &deps);
        let runner = FlightRunner::new(flight_id, env.journal, steps, self.config.step_retry);
        (runner, CloneWorkspaceContext::new(params))
    }
}

#[async_trait]
impl Flight for CloneWorkspaceFlight {
    fn kind(&self) -> OperationKind {
        OperationKind::CloneWorkspace
    }

    #[instrument(skip(self, params, env))]
    async fn run(
        &self,
        flight_id: &str,
        params: serde_json::Value,
        env: FlightEnv,
    ) -> Result<FlightOutcome<serde_json::Value>> {
        let params: CloneWorkspaceParams = serde_json::from_value(params)?;
        let (runner, initial) = self.build_runner(flight_id, params, env);
        let outcome = runner.run(initial).await?;
        outcome.try_map(|ctx| {
            let response = ctx.response.ok_or_else(|| {
                OrchestratorError::InvalidState("clone finished without a response".to_string())
            })?;
            Ok(serde_json::to_value(response)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollaboratorError, ExecutorError};
    use crate::flight::{OperationRequest, OperationState, SubmitOutcome};
    use crate::model::{
        CloudContext, CloudPlatform, DestinationWorkspace, Folder, Policy, WsmResource,
    };
    use crate::services::{
        ApplicationService, CloudContextProvisioner, CollaboratorResult, FolderStore,
        PolicyService, ResourceStore, WorkspaceService,
    };
    use uuid::Uuid;

    /// Collaborators that are never reached: only step ordering is checked.
    struct Inert;

    #[async_trait]
    impl WorkspaceService for Inert {
        async fn create_workspace(&self, _: &DestinationWorkspace) -> CollaboratorResult<()> {
            Ok(())
        }

        async fn delete_workspace(&self, _: Uuid) -> CollaboratorResult<()> {
            Ok(())
        }

        async fn get_cloud_context(
            &self,
            _: Uuid,
            _: CloudPlatform,
        ) -> CollaboratorResult<Option<CloudContext>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl ResourceStore for Inert {
        async fn enumerate_resources(
            &self,
            _: Uuid,
            _: u32,
            _: u32,
        ) -> CollaboratorResult<Vec<WsmResource>> {
            Ok(vec![])
        }

        async fn create_referenced_resource(&self, _: &WsmResource) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FolderStore for Inert {
        async fn list_folders(&self, _: Uuid) -> CollaboratorResult<Vec<Folder>> {
            Ok(vec![])
        }

        async fn create_folder(&self, _: &Folder) -> CollaboratorResult<()> {
            Ok(())
        }

        async fn set_folder_parent(
            &self,
            _: Uuid,
            _: Uuid,
            _: Option<Uuid>,
        ) -> CollaboratorResult<()> {
            Ok(())
        }

        async fn delete_all_folders(&self, _: Uuid) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PolicyService for Inert {
        async fn get_policy(&self, _: Uuid) -> CollaboratorResult<Option<Policy>> {
            Ok(None)
        }

        async fn clone_policy(&self, _: Uuid, _: Uuid) -> CollaboratorResult<()> {
            Ok(())
        }

        async fn delete_policy(&self, _: Uuid) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl CloudContextProvisioner for Inert {
        async fn create_cloud_context(
            &self,
            _: Uuid,
            _: CloudPlatform,
        ) -> CollaboratorResult<CloudContext> {
            Err(CollaboratorError::Rejected("inert".into()))
        }

        async fn delete_cloud_context(&self, _: Uuid, _: CloudPlatform) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ApplicationService for Inert {
        async fn list_enabled_applications(
            &self,
            _: Uuid,
            _: u32,
            _: u32,
        ) -> CollaboratorResult<Vec<String>> {
            Ok(vec![])
        }

        async fn enable_application(&self, _: Uuid, _: &str) -> CollaboratorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl OperationExecutor for Inert {
        async fn submit(
            &self,
            _: &str,
            _: OperationRequest,
        ) -> std::result::Result<SubmitOutcome, ExecutorError> {
            Ok(SubmitOutcome::Accepted)
        }

        async fn get_state(
            &self,
            operation_id: &str,
        ) -> std::result::Result<OperationState, ExecutorError> {
            Err(ExecutorError::NotFound(operation_id.to_string()))
        }
    }

    fn stage_names(plan: &ClonePlan) -> Vec<String> {
        let inert = Arc::new(Inert);
        let deps = CloneStepDeps {
            services: CloneServices {
                workspaces: inert.clone(),
                resources: inert.clone(),
                folders: inert.clone(),
                policies: inert.clone(),
                cloud_contexts: inert.clone(),
                applications: inert.clone(),
            },
            executor: inert,
            config: CloneConfig::fast(),
        };
        build_clone_workspace_steps(plan, &deps)
            .iter()
            .map(|step| step.name().to_string())
            .collect()
    }

    #[test]
    fn test_minimal_plan_stage_order() {
        assert_eq!(
            stage_names(&ClonePlan::default()),
            vec![
                "create_destination_workspace",
                "plan_folder_clone",
                "clone_all_folders",
                "find_resources_to_clone",
                "generate_operation_ids",
                "launch_clone_all_resources",
                "await_clone_all_resources",
                "find_enabled_applications",
                "enable_applications",
                "build_clone_response",
            ]
        );
    }

    #[test]
    fn test_optional_stages_follow_plan() {
        let plan = ClonePlan {
            merge_policies: true,
            platforms: vec![CloudPlatform::Gcp, CloudPlatform::Azure],
        };
        let names = stage_names(&plan);

        assert_eq!(names[1], "merge_policy");
        let position = |name: &str| names.iter().position(|n| n == name).unwrap();
        assert!(position("generate_operation_ids") < position("launch_create_gcp_context"));
        assert!(position("launch_create_gcp_context") < position("await_create_gcp_context"));
        assert!(position("await_create_gcp_context") < position("launch_create_azure_context"));
        assert!(position("await_create_azure_context") < position("launch_clone_all_resources"));
    }
}
