use crate::clone::context::{
    CloneAllResourcesContext, CloneAllResourcesParams, CloneWorkspaceContext, ResourceCloneInputs,
};
use crate::clone::aggregate::CloneResultMap;
use crate::clone::enumerate::{is_cloneable, CLONEABLE_CONTROLLED_TYPES};
use crate::clone::resource_steps::{
    AwaitCloneControlledResourceStep, CloneReferencedResourceStep,
    LaunchCloneControlledResourceStep,
};
use crate::error::{OrchestratorError, Result, StepError};
use crate::flight::{
    BackoffPolicy, BoxedStep, Flight, FlightEnv, FlightOutcome, FlightRunner, FlightStatus,
    OperationExecutor, OperationKind, OperationRequest, RetryPolicy, Step, StepResult,
};
use crate::model::{ResourceType, StewardshipType};
use crate::services::ResourceStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// What the steps of one resource clone may use.
#[derive(Clone)]
pub struct DispatchDeps {
    pub executor: Arc<dyn OperationExecutor>,
    pub resources: Arc<dyn ResourceStore>,
    pub poll: BackoffPolicy,
}

/// Builds the steps that clone one resource: a launch step, plus an await
/// step when the launch only starts a sub-operation.
pub trait CloneStepFactory: Send + Sync {
    fn launch_step(
        &self,
        inputs: &ResourceCloneInputs,
        deps: &DispatchDeps,
    ) -> BoxedStep<CloneAllResourcesContext>;

    fn await_step(
        &self,
        _inputs: &ResourceCloneInputs,
        _deps: &DispatchDeps,
    ) -> Option<BoxedStep<CloneAllResourcesContext>> {
        None
    }
}

pub struct ReferencedCloneFactory;

impl CloneStepFactory for ReferencedCloneFactory {
    fn launch_step(
        &self,
        inputs: &ResourceCloneInputs,
        deps: &DispatchDeps,
    ) -> BoxedStep<CloneAllResourcesContext> {
        Box::new(CloneReferencedResourceStep::new(
            inputs.clone(),
            deps.resources.clone(),
        ))
    }
}

pub struct ControlledCloneFactory;

impl CloneStepFactory for ControlledCloneFactory {
    fn launch_step(
        &self,
        inputs: &ResourceCloneInputs,
        deps: &DispatchDeps,
    ) -> BoxedStep<CloneAllResourcesContext> {
        Box::new(LaunchCloneControlledResourceStep::new(
            inputs.clone(),
            deps.executor.clone(),
        ))
    }

    fn await_step(
        &self,
        inputs: &ResourceCloneInputs,
        deps: &DispatchDeps,
    ) -> Option<BoxedStep<CloneAllResourcesContext>> {
        Some(Box::new(AwaitCloneControlledResourceStep::new(
            inputs.clone(),
            deps.executor.clone(),
            deps.poll,
        )))
    }
}

/// Factories keyed by (stewardship, resource type).
#[derive(Clone, Default)]
pub struct DispatchTable {
    entries: HashMap<(StewardshipType, ResourceType), Arc<dyn CloneStepFactory>>,
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One entry for every pair the enumerator accepts.
    pub fn standard() -> Self {
        let referenced: Arc<dyn CloneStepFactory> = Arc::new(ReferencedCloneFactory);
        let controlled: Arc<dyn CloneStepFactory> = Arc::new(ControlledCloneFactory);

        let mut table = Self::empty();
        for resource_type in ResourceType::ALL {
            table.register(StewardshipType::Referenced, resource_type, referenced.clone());
        }
        for resource_type in CLONEABLE_CONTROLLED_TYPES {
            table.register(StewardshipType::Controlled, resource_type, controlled.clone());
        }
        table
    }

    pub fn register(
        &mut self,
        stewardship: StewardshipType,
        resource_type: ResourceType,
        factory: Arc<dyn CloneStepFactory>,
    ) {
        self.entries.insert((stewardship, resource_type), factory);
    }

    pub fn lookup(
        &self,
        stewardship: StewardshipType,
        resource_type: ResourceType,
    ) -> Option<&Arc<dyn CloneStepFactory>> {
        self.entries.get(&(stewardship, resource_type))
    }

    /// Cloneable pairs with no factory. Empty for a consistent table.
    pub fn missing_entries(&self) -> Vec<(StewardshipType, ResourceType)> {
        StewardshipType::ALL
            .iter()
            .flat_map(|s| ResourceType::ALL.iter().map(move |t| (*s, *t)))
            .filter(|(s, t)| is_cloneable(*s, *t) && self.lookup(*s, *t).is_none())
            .collect()
    }
}

/// Build the dispatcher's step list: every launch in work-item order, then
/// every await, so all sub-operations run concurrently.
///
/// An item with no table entry is a fatal logic error.
pub fn build_steps(
    work_items: &[ResourceCloneInputs],
    table: &DispatchTable,
    deps: &DispatchDeps,
) -> std::result::Result<Vec<BoxedStep<CloneAllResourcesContext>>, StepError> {
    let mut launches = Vec::with_capacity(work_items.len());
    let mut awaits = Vec::new();

    for inputs in work_items {
        let resource = &inputs.resource;
        let factory = table
            .lookup(resource.stewardship_type, resource.resource_type)
            .ok_or_else(|| {
                StepError::fatal(format!(
                    "no clone handler for {} {} (resource {})",
                    resource.stewardship_type, resource.resource_type, resource.resource_id
                ))
            })?;
        launches.push(factory.launch_step(inputs, deps));
        awaits.extend(factory.await_step(inputs, deps));
    }

    launches.extend(awaits);
    Ok(launches)
}

/// Sub-operation cloning every enumerated resource. Its result is the
/// [`CloneResultMap`].
pub struct CloneAllResourcesFlight {
    table: DispatchTable,
    resources: Arc<dyn ResourceStore>,
    poll: BackoffPolicy,
    retry: RetryPolicy,
}

impl CloneAllResourcesFlight {
    pub fn new(
        table: DispatchTable,
        resources: Arc<dyn ResourceStore>,
        poll: BackoffPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            table,
            resources,
            poll,
            retry,
        }
    }
}

#[async_trait]
impl Flight for CloneAllResourcesFlight {
    fn kind(&self) -> OperationKind {
        OperationKind::CloneAllResources
    }

    #[instrument(skip(self, params, env))]
    async fn run(
        &self,
        flight_id: &str,
        params: serde_json::Value,
        env: FlightEnv,
    ) -> Result<FlightOutcome<serde_json::Value>> {
        let params: CloneAllResourcesParams = serde_json::from_value(params)?;
        let deps = DispatchDeps {
            executor: env.executor.clone(),
            resources: self.resources.clone(),
            poll: self.poll,
        };
        let steps = match build_steps(&params.work_items, &self.table, &deps) {
            Ok(steps) => steps,
            Err(err) => return Ok(FlightOutcome::Failed(err)),
        };

        info!(
            flight_id,
            resources = params.work_items.len(),
            steps = steps.len(),
            "cloning resources"
        );
        let runner = FlightRunner::new(flight_id, env.journal, steps, self.retry);
        let outcome = runner.run(CloneAllResourcesContext::new(params)).await?;
        outcome.try_map(|ctx| serde_json::to_value(ctx.results).map_err(OrchestratorError::from))
    }
}

/// Submits the resource dispatcher under its reserved operation id.
pub struct LaunchCloneAllResourcesStep {
    executor: Arc<dyn OperationExecutor>,
}

impl LaunchCloneAllResourcesStep {
    pub fn new(executor: Arc<dyn OperationExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for LaunchCloneAllResourcesStep {
    fn name(&self) -> &str {
        "launch_clone_all_resources"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let operation_id = ctx.require_clone_resources_operation_id()?;
        let params = CloneAllResourcesParams {
            source_workspace_id: ctx.source_workspace_id(),
            destination_workspace_id: ctx.destination_workspace_id(),
            location: ctx.request.location.clone(),
            work_items: ctx.require_work_items()?.to_vec(),
        };
        let request = OperationRequest::new(
            OperationKind::CloneAllResources,
            format!("clone resources of {}", params.source_workspace_id),
            &params,
        )?;

        self.executor
            .submit(operation_id, request)
            .await
            .map_err(|err| StepError::retry(err.to_string()))?;
        Ok(())
    }
}

/// Waits for the resource dispatcher and keeps its result map.
pub struct AwaitCloneAllResourcesStep {
    executor: Arc<dyn OperationExecutor>,
    poll: BackoffPolicy,
}

impl AwaitCloneAllResourcesStep {
    pub fn new(executor: Arc<dyn OperationExecutor>, poll: BackoffPolicy) -> Self {
        Self { executor, poll }
    }
}

#[async_trait]
impl Step<CloneWorkspaceContext> for AwaitCloneAllResourcesStep {
    fn name(&self) -> &str {
        "await_clone_all_resources"
    }

    async fn do_step(&self, ctx: &mut CloneWorkspaceContext) -> StepResult {
        let operation_id = ctx.require_clone_resources_operation_id()?;
        let state = self
            .executor
            .await_completion(operation_id, &self.poll)
            .await?;

        if state.status != FlightStatus::Success {
            return Err(StepError::fatal(format!(
                "resource cloning failed: {}",
                state.error_message.as_deref().unwrap_or("no error message")
            )));
        }
        let payload = state
            .result
            .ok_or_else(|| StepError::fatal("resource cloning returned no results"))?;
        let results: CloneResultMap = serde_json::from_value(payload)
            .map_err(|err| StepError::fatal(format!("malformed clone results: {err}")))?;
        ctx.clone_results = Some(results);
        Ok(())
    }
}
