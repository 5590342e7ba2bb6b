use crate::clone::aggregate::{details_from_operation, ControlledCloneOutput};
use crate::clone::context::{CloneAllResourcesContext, ResourceCloneInputs};
use crate::error::{CollaboratorError, ExecutorError, OrchestratorError, Result, StepError};
use crate::flight::{
    poll_with_backoff, BackoffPolicy, BoxedStep, Flight, FlightEnv, FlightOutcome, FlightRunner,
    OperationExecutor, OperationKind, OperationRequest, RetryPolicy, Step, StepResult,
};
use crate::model::{CloningInstructions, WsmResource, WsmResourceCloneDetails};
use crate::services::{
    ProvisionerJobState, ProvisionerRegistry, ResourceCloneRequest, ResourceProvisioner,
    ResourceStore,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Clones a referenced resource in place. Referenced resources have no cloud
/// side effects, so no sub-operation is needed.
pub struct CloneReferencedResourceStep {
    inputs: ResourceCloneInputs,
    resources: Arc<dyn ResourceStore>,
}

impl CloneReferencedResourceStep {
    pub fn new(inputs: ResourceCloneInputs, resources: Arc<dyn ResourceStore>) -> Self {
        Self { inputs, resources }
    }
}

#[async_trait]
impl Step<CloneAllResourcesContext> for CloneReferencedResourceStep {
    fn name(&self) -> &str {
        "clone_referenced_resource"
    }

    async fn do_step(&self, ctx: &mut CloneAllResourcesContext) -> StepResult {
        let resource = &self.inputs.resource;
        if ctx.results.is_resolved(resource.resource_id) {
            return Ok(());
        }

        let details = if resource.cloning_instructions == CloningInstructions::CopyNothing {
            WsmResourceCloneDetails::skipped(resource)
        } else {
            let clone = resource.build_clone(
                ctx.params.destination_workspace_id,
                self.inputs.destination_resource_id,
                self.inputs.destination_folder_id,
            );
            match self.resources.create_referenced_resource(&clone).await {
                // An earlier attempt stored it already.
                Ok(()) | Err(CollaboratorError::AlreadyExists(_)) => {
                    WsmResourceCloneDetails::succeeded(resource, clone.resource_id)
                }
                Err(err @ CollaboratorError::Transient(_)) => return Err(err.into()),
                Err(err) => {
                    warn!(resource_id = %resource.resource_id, error = %err, "referenced clone failed");
                    WsmResourceCloneDetails::failed(resource, err.to_string())
                }
            }
        };

        ctx.results.record(details)?;
        Ok(())
    }
}

/// Submits the clone of one controlled resource under its reserved
/// operation id.
pub struct LaunchCloneControlledResourceStep {
    inputs: ResourceCloneInputs,
    executor: Arc<dyn OperationExecutor>,
}

impl LaunchCloneControlledResourceStep {
    pub fn new(inputs: ResourceCloneInputs, executor: Arc<dyn OperationExecutor>) -> Self {
        Self { inputs, executor }
    }

    fn request(&self, ctx: &CloneAllResourcesContext) -> ResourceCloneRequest {
        ResourceCloneRequest {
            source: self.inputs.resource.clone(),
            destination_workspace_id: ctx.params.destination_workspace_id,
            destination_resource_id: self.inputs.destination_resource_id,
            destination_folder_id: self.inputs.destination_folder_id,
            cloning_instructions: self.inputs.resource.cloning_instructions,
            name_override: None,
            description_override: None,
            location: ctx.params.location.clone(),
            skip_policy_merge: true,
        }
    }
}

#[async_trait]
impl Step<CloneAllResourcesContext> for LaunchCloneControlledResourceStep {
    fn name(&self) -> &str {
        "launch_clone_controlled_resource"
    }

    async fn do_step(&self, ctx: &mut CloneAllResourcesContext) -> StepResult {
        if ctx.results.is_resolved(self.inputs.source_resource_id()) {
            return Ok(());
        }

        let request = OperationRequest::new(
            OperationKind::CloneControlledResource,
            format!(
                "clone {} {}",
                self.inputs.resource.resource_type, self.inputs.resource.resource_id
            ),
            &self.request(ctx),
        )?;

        let outcome = self
            .executor
            .submit(&self.inputs.operation_id, request)
            .await
            .map_err(|err| StepError::retry(err.to_string()))?;
        debug!(
            operation_id = %self.inputs.operation_id,
            resource_id = %self.inputs.source_resource_id(),
            ?outcome,
            "launched controlled resource clone"
        );
        Ok(())
    }
}

/// Waits for a controlled clone and records its outcome.
pub struct AwaitCloneControlledResourceStep {
    inputs: ResourceCloneInputs,
    executor: Arc<dyn OperationExecutor>,
    poll: BackoffPolicy,
}

impl AwaitCloneControlledResourceStep {
    pub fn new(
        inputs: ResourceCloneInputs,
        executor: Arc<dyn OperationExecutor>,
        poll: BackoffPolicy,
    ) -> Self {
        Self {
            inputs,
            executor,
            poll,
        }
    }
}

#[async_trait]
impl Step<CloneAllResourcesContext> for AwaitCloneControlledResourceStep {
    fn name(&self) -> &str {
        "await_clone_controlled_resource"
    }

    async fn do_step(&self, ctx: &mut CloneAllResourcesContext) -> StepResult {
        if ctx.results.is_resolved(self.inputs.source_resource_id()) {
            return Ok(());
        }

        let state = self
            .executor
            .await_completion(&self.inputs.operation_id, &self.poll)
            .await?;
        let details = details_from_operation(&self.inputs, &state)?;
        info!(
            resource_id = %self.inputs.source_resource_id(),
            result = ?details.result,
            "controlled resource clone finished"
        );
        ctx.results.record(details)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProvisionerCloneState {
    request: ResourceCloneRequest,
    job_handle: Option<String>,
    destination_resource: Option<WsmResource>,
}

/// Starts the provisioner job and persists its handle.
struct StartProvisionerCloneStep {
    provisioner: Arc<dyn ResourceProvisioner>,
}

#[async_trait]
impl Step<ProvisionerCloneState> for StartProvisionerCloneStep {
    fn name(&self) -> &str {
        "start_provisioner_clone"
    }

    async fn do_step(&self, ctx: &mut ProvisionerCloneState) -> StepResult {
        if ctx.request.cloning_instructions == CloningInstructions::CopyNothing
            || ctx.job_handle.is_some()
        {
            return Ok(());
        }
        let handle = self.provisioner.clone_resource(&ctx.request).await?;
        debug!(
            resource_id = %ctx.request.destination_resource_id,
            job_handle = %handle,
            "provisioner job started"
        );
        ctx.job_handle = Some(handle);
        Ok(())
    }

    async fn undo_step(&self, ctx: &mut ProvisionerCloneState) -> StepResult {
        if ctx.job_handle.is_none() {
            return Ok(());
        }
        match self
            .provisioner
            .delete_clone(
                ctx.request.destination_workspace_id,
                ctx.request.destination_resource_id,
            )
            .await
        {
            Ok(()) | Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Polls the provisioner job until it finishes.
struct AwaitProvisionerCloneStep {
    provisioner: Arc<dyn ResourceProvisioner>,
    poll: BackoffPolicy,
}

#[async_trait]
impl Step<ProvisionerCloneState> for AwaitProvisionerCloneStep {
    fn name(&self) -> &str {
        "await_provisioner_clone"
    }

    async fn do_step(&self, ctx: &mut ProvisionerCloneState) -> StepResult {
        let Some(handle) = ctx.job_handle.as_deref() else {
            return Ok(());
        };

        let provisioner = &self.provisioner;
        let finished = poll_with_backoff(&self.poll, handle, || async move {
            match provisioner.get_clone_result(handle).await {
                Ok(ProvisionerJobState::Running) | Err(CollaboratorError::Transient(_)) => {
                    Ok::<_, ExecutorError>(None)
                }
                Ok(state) => Ok(Some(Ok(state))),
                Err(err) => Ok(Some(Err(err))),
            }
        })
        .await?;

        match finished? {
            ProvisionerJobState::Succeeded(resource) => {
                ctx.destination_resource = resource;
                Ok(())
            }
            ProvisionerJobState::Failed(message) => Err(StepError::Fatal(message)),
            ProvisionerJobState::Running => Err(StepError::fatal("provisioner job still running")),
        }
    }
}

/// Sub-operation that copies one controlled resource through the
/// provisioner registered for its type. Its result is a
/// [`ControlledCloneOutput`].
pub struct ProvisionerCloneFlight {
    provisioners: ProvisionerRegistry,
    poll: BackoffPolicy,
    retry: RetryPolicy,
}

impl ProvisionerCloneFlight {
    pub fn new(provisioners: ProvisionerRegistry, poll: BackoffPolicy, retry: RetryPolicy) -> Self {
        Self {
            provisioners,
            poll,
            retry,
        }
    }
}

#[async_trait]
impl Flight for ProvisionerCloneFlight {
    fn kind(&self) -> OperationKind {
        OperationKind::CloneControlledResource
    }

    #[instrument(skip(self, params, env))]
    async fn run(
        &self,
        flight_id: &str,
        params: serde_json::Value,
        env: FlightEnv,
    ) -> Result<FlightOutcome<serde_json::Value>> {
        let request: ResourceCloneRequest = serde_json::from_value(params)?;
        let resource_type = request.source.resource_type;
        let Some(provisioner) = self.provisioners.get(resource_type) else {
            return Ok(FlightOutcome::Failed(StepError::fatal(format!(
                "no provisioner registered for {resource_type}"
            ))));
        };

        let steps: Vec<BoxedStep<ProvisionerCloneState>> = vec![
            Box::new(StartProvisionerCloneStep {
                provisioner: provisioner.clone(),
            }),
            Box::new(AwaitProvisionerCloneStep {
                provisioner,
                poll: self.poll,
            }),
        ];
        let runner = FlightRunner::new(flight_id, env.journal, steps, self.retry);
        let outcome = runner
            .run(ProvisionerCloneState {
                request,
                job_handle: None,
                destination_resource: None,
            })
            .await?;

        outcome.try_map(|state| {
            let output = ControlledCloneOutput {
                destination_resource: state.destination_resource,
            };
            serde_json::to_value(output).map_err(OrchestratorError::from)
        })
    }
}

