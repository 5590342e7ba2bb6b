use crate::clone::context::CloneWorkspaceContext;
use crate::error::{CollaboratorError, ExecutorError, OrchestratorError, Result, StepError};
use crate::flight::{
    BackoffPolicy, BoxedStep, Flight, FlightEnv, FlightOutcome, FlightRunner, FlightStatus,
    OperationExecutor, OperationKind, OperationRequest, RetryPolicy, Step, StepResult,
};
use crate::model::{CloudContext, CloudPlatform};
use crate::services::{CloudContextProvisioner, WorkspaceService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCloudContextParams {
    pub workspace_id: Uuid,
    pub platform: CloudPlatform,
}

/// Submits creation of the destination's cloud context for one platform.
pub struct LaunchCreateCloudContextStep {
    platform: CloudPlatform,
    executor: Arc<dyn OperationExecutor>,
    provisioner: Arc<dyn CloudContextProvisioner>,
    poll: BackoffPolicy,
}

impl LaunchCreateCloudContextStep {
    pub fn new(
        platform: CloudPlatform,
        executor: Arc<dyn OperationExecutor>,
        provisioner: Arc<dyn CloudContextProvisioner>,
        poll: BackoffPolicy,
    ) -> Self {
        Self {
            platform,
            executor,
            provisioner,
            poll,
        }
    }

    /// Wait out a creation that is still running, so it cannot recreate the
    /// context after the delete.
    async fn settle_creation(&self, ctx: &CloneWorkspaceContext) -> StepResult {
        let Some(operation_id) = ctx.cloud_context_operation_ids.get(&self.platform) else {
            return Ok(());
        };
        match self.executor.get_state(operation_id).await {
            Ok(state) if state.status == FlightStatus::Running => {
                info!(
                    operation_id = %operation_id,
                    platform = %self.platform,
                    "waiting for cloud context creation before undo"
                );
                self.executor
                    .await_completion(operation_id, &self.poll)
                    .await?;
                Ok(())
            }
            Ok(_) | Err(ExecutorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for LaunchCreateCloudContextStep {
    fn name(&self) -> &str {
        match self.platform {
            CloudPlatform::Gcp => "launch_create_gcp_context",
            CloudPlatform::Azure => "launch_create_azure_context",
        }
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let operation_id = ctx.require_cloud_context_operation_id(self.platform)?;
        let params = CreateCloudContextParams {
            workspace_id: ctx.destination_workspace_id(),
            platform: self.platform,
        };
        let request = OperationRequest::new(
            OperationKind::CreateCloudContext,
            format!("create {} cloud context", self.platform),
            &params,
        )?;

        let outcome = self
            .executor
            .submit(operation_id, request)
            .await
            .map_err(|err| StepError::retry(err.to_string()))?;
        info!(operation_id, platform = %self.platform, ?outcome, "launched cloud context creation");
        Ok(())
    }

    async fn undo_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        self.settle_creation(ctx).await?;
        match self
            .provisioner
            .delete_cloud_context(ctx.destination_workspace_id(), self.platform)
            .await
        {
            Ok(()) | Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Waits for the context creation launched above.
pub struct AwaitCreateCloudContextStep {
    platform: CloudPlatform,
    executor: Arc<dyn OperationExecutor>,
    poll: BackoffPolicy,
}

impl AwaitCreateCloudContextStep {
    pub fn new(
        platform: CloudPlatform,
        executor: Arc<dyn OperationExecutor>,
        poll: BackoffPolicy,
    ) -> Self {
        Self {
            platform,
            executor,
            poll,
        }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for AwaitCreateCloudContextStep {
    fn name(&self) -> &str {
        match self.platform {
            CloudPlatform::Gcp => "await_create_gcp_context",
            CloudPlatform::Azure => "await_create_azure_context",
        }
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let operation_id = ctx.require_cloud_context_operation_id(self.platform)?;
        let state = self
            .executor
            .await_completion(operation_id, &self.poll)
            .await?;

        // A creation that already failed will not succeed on retry.
        if state.status != FlightStatus::Success {
            return Err(StepError::fatal(format!(
                "{} cloud context creation failed: {}",
                self.platform,
                state.error_message.as_deref().unwrap_or("no error message")
            )));
        }

        let payload = state.result.ok_or_else(|| {
            StepError::fatal(format!("{} cloud context creation returned no context", self.platform))
        })?;
        let context: CloudContext = serde_json::from_value(payload)
            .map_err(|err| StepError::fatal(format!("malformed cloud context: {err}")))?;
        ctx.cloud_contexts.insert(self.platform, context);
        Ok(())
    }
}

/// Creates a cloud context, adopting one that already exists.
struct CreateCloudContextStep {
    workspaces: Arc<dyn WorkspaceService>,
    provisioner: Arc<dyn CloudContextProvisioner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreateCloudContextState {
    params: CreateCloudContextParams,
    context: Option<CloudContext>,
}

#[async_trait]
impl Step<CreateCloudContextState> for CreateCloudContextStep {
    fn name(&self) -> &str {
        "create_cloud_context"
    }

    async fn do_step(&self, ctx: &mut CreateCloudContextState) -> StepResult {
        let CreateCloudContextParams {
            workspace_id,
            platform,
        } = ctx.params;

        let context = match self
            .provisioner
            .create_cloud_context(workspace_id, platform)
            .await
        {
            Ok(context) => context,
            Err(CollaboratorError::AlreadyExists(_)) => self
                .workspaces
                .get_cloud_context(workspace_id, platform)
                .await?
                .ok_or_else(|| {
                    StepError::fatal(format!(
                        "{platform} context reported as existing in {workspace_id} but not found"
                    ))
                })?,
            Err(err) => return Err(err.into()),
        };
        ctx.context = Some(context);
        Ok(())
    }

    async fn undo_step(&self, ctx: &mut CreateCloudContextState) -> StepResult {
        match self
            .provisioner
            .delete_cloud_context(ctx.params.workspace_id, ctx.params.platform)
            .await
        {
            Ok(()) | Err(CollaboratorError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Sub-operation provisioning one cloud context. Its result is the
/// [`CloudContext`].
pub struct CreateCloudContextFlight {
    workspaces: Arc<dyn WorkspaceService>,
    provisioner: Arc<dyn CloudContextProvisioner>,
    retry: RetryPolicy,
}

impl CreateCloudContextFlight {
    pub fn new(
        workspaces: Arc<dyn WorkspaceService>,
        provisioner: Arc<dyn CloudContextProvisioner>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            workspaces,
            provisioner,
            retry,
        }
    }
}

#[async_trait]
impl Flight for CreateCloudContextFlight {
    fn kind(&self) -> OperationKind {
        OperationKind::CreateCloudContext
    }

    #[instrument(skip(self, params, env))]
    async fn run(
        &self,
        flight_id: &str,
        params: serde_json::Value,
        env: FlightEnv,
    ) -> Result<FlightOutcome<serde_json::Value>> {
        let params: CreateCloudContextParams = serde_json::from_value(params)?;
        let steps: Vec<BoxedStep<CreateCloudContextState>> = vec![Box::new(CreateCloudContextStep {
            workspaces: self.workspaces.clone(),
            provisioner: self.provisioner.clone(),
        })];

        let runner = FlightRunner::new(flight_id, env.journal, steps, self.retry);
        let outcome = runner
            .run(CreateCloudContextState {
                params,
                context: None,
            })
            .await?;

        if !outcome.is_success() {
            warn!(flight_id, platform = %params.platform, "cloud context creation failed");
        }
        outcome.try_map(|state| {
            let context = state.context.ok_or_else(|| {
                OrchestratorError::InvalidState(
                    "cloud context flight finished without a context".to_string(),
                )
            })?;
            Ok(serde_json::to_value(context)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::context::{ClonePlan, CloneWorkspaceParams};
    use crate::flight::{OperationState, SubmitOutcome};
    use crate::model::{CloneWorkspaceRequest, DestinationWorkspace};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// A context creation that reports `Running` for a few polls, then lands.
    struct LateCreation {
        polls_left: AtomicU32,
        known: bool,
        created: AtomicBool,
        deletes: Mutex<Vec<bool>>,
    }

    impl LateCreation {
        fn new(polls: u32, known: bool) -> Arc<Self> {
            Arc::new(Self {
                polls_left: AtomicU32::new(polls),
                known,
                created: AtomicBool::new(false),
                deletes: Mutex::new(Vec::new()),
            })
        }

        fn deletes(&self) -> Vec<bool> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationExecutor for LateCreation {
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
            if !self.known {
                return Err(ExecutorError::NotFound(operation_id.to_string()));
            }
            let running = self
                .polls_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !running {
                self.created.store(true, Ordering::SeqCst);
            }
            Ok(OperationState {
                status: if running {
                    FlightStatus::Running
                } else {
                    FlightStatus::Success
                },
                result: None,
                error_message: None,
            })
        }
    }

    #[async_trait]
    impl CloudContextProvisioner for LateCreation {
        async fn create_cloud_context(
            &self,
            _: Uuid,
            _: CloudPlatform,
        ) -> std::result::Result<CloudContext, CollaboratorError> {
            Err(CollaboratorError::Rejected("not used".into()))
        }

        async fn delete_cloud_context(
            &self,
            _: Uuid,
            _: CloudPlatform,
        ) -> std::result::Result<(), CollaboratorError> {
            let landed = self.created.load(Ordering::SeqCst);
            self.deletes.lock().unwrap().push(landed);
            if landed {
                Ok(())
            } else {
                Err(CollaboratorError::NotFound("no context yet".into()))
            }
        }
    }

    fn context_with_operation() -> CloneWorkspaceContext {
        let mut ctx = CloneWorkspaceContext::new(CloneWorkspaceParams {
            request: CloneWorkspaceRequest {
                source_workspace_id: Uuid::new_v4(),
                destination: DestinationWorkspace {
                    workspace_id: Uuid::new_v4(),
                    user_facing_id: "dest".to_string(),
                    display_name: None,
                    description: None,
                    spend_profile: None,
                    properties: BTreeMap::new(),
                },
                location: None,
            },
            plan: ClonePlan::default(),
        });
        ctx.cloud_context_operation_ids
            .insert(CloudPlatform::Gcp, "op-gcp".to_string());
        ctx
    }

    fn launch_step(fake: &Arc<LateCreation>) -> LaunchCreateCloudContextStep {
        LaunchCreateCloudContextStep::new(
            CloudPlatform::Gcp,
            fake.clone(),
            fake.clone(),
            BackoffPolicy::new(
                Duration::from_millis(1),
                Duration::from_millis(4),
                Duration::from_secs(2),
            ),
        )
    }

    #[tokio::test]
    async fn test_undo_waits_for_running_creation_before_deleting() {
        let fake = LateCreation::new(3, true);
        let step = launch_step(&fake);
        let mut ctx = context_with_operation();

        step.undo_step(&mut ctx).await.unwrap();

        assert_eq!(fake.deletes(), vec![true]);
    }

    #[tokio::test]
    async fn test_undo_without_submitted_creation_still_deletes() {
        let fake = LateCreation::new(0, false);
        let step = launch_step(&fake);
        let mut ctx = context_with_operation();

        step.undo_step(&mut ctx).await.unwrap();

        assert_eq!(fake.deletes(), vec![false]);
    }
}
