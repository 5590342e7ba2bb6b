use crate::cloud::FakeCloud;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;
use wsm_orchestrator::clone::{
    CloneWorkspaceContext, CloneWorkspaceFlight, CloneWorkspaceParams, CLONEABLE_CONTROLLED_TYPES,
};
use wsm_orchestrator::flight::{
    FlightEnv, FlightJournal, FlightRecord, FlightRunner, OperationExecutor, OperationKind,
    RunState,
};
use wsm_orchestrator::model::{CloneWorkspaceRequest, ClonedWorkspace};
use wsm_orchestrator::services::{CloneServices, ProvisionerRegistry};
use wsm_orchestrator::{
    register_clone_flights, CloneConfig, FlightRegistry, LocalFlightEngine, MemoryJournal,
    WorkspaceCloneService,
};

/// Every collaborator role played by the same fake.
pub fn clone_services(cloud: &Arc<FakeCloud>) -> CloneServices {
    CloneServices {
        workspaces: cloud.clone(),
        resources: cloud.clone(),
        folders: cloud.clone(),
        policies: cloud.clone(),
        cloud_contexts: cloud.clone(),
        applications: cloud.clone(),
    }
}

/// The fake provisioning every cloneable controlled resource type.
pub fn provisioners(cloud: &Arc<FakeCloud>) -> ProvisionerRegistry {
    CLONEABLE_CONTROLLED_TYPES
        .iter()
        .fold(ProvisionerRegistry::new(), |registry, resource_type| {
            registry.with(*resource_type, cloud.clone())
        })
}

/// A flight engine and clone service wired to a [`FakeCloud`].
pub struct CloneHarness {
    pub cloud: Arc<FakeCloud>,
    pub journal: Arc<dyn FlightJournal>,
    pub engine: LocalFlightEngine,
    pub service: WorkspaceCloneService,
    pub config: CloneConfig,
}

impl CloneHarness {
    pub fn new(cloud: Arc<FakeCloud>) -> Self {
        Self::with_journal(cloud, Arc::new(MemoryJournal::new()))
    }

    pub fn with_journal(cloud: Arc<FakeCloud>, journal: Arc<dyn FlightJournal>) -> Self {
        Self::with_config(cloud, journal, CloneConfig::fast())
    }

    pub fn with_config(
        cloud: Arc<FakeCloud>,
        journal: Arc<dyn FlightJournal>,
        config: CloneConfig,
    ) -> Self {
        wsm_logging::init_test_subscriber();

        let services = clone_services(&cloud);
        let mut registry = FlightRegistry::new();
        register_clone_flights(&mut registry, &services, provisioners(&cloud), &config);

        let engine = LocalFlightEngine::new(journal.clone(), registry);
        let service =
            WorkspaceCloneService::new(Arc::new(engine.clone()), services, config.clone());
        Self {
            cloud,
            journal,
            engine,
            service,
            config,
        }
    }

    /// A new engine over the same journal and collaborators, as a process
    /// restart would see them. Nothing is resumed until [`recover`] runs.
    ///
    /// [`recover`]: LocalFlightEngine::recover
    pub fn restart(&self) -> Self {
        Self::with_config(self.cloud.clone(), self.journal.clone(), self.config.clone())
    }

    pub fn executor(&self) -> Arc<dyn OperationExecutor> {
        Arc::new(self.engine.clone())
    }

    /// Submit a clone and wait for its response.
    pub async fn clone_workspace(
        &self,
        job_id: &str,
        request: CloneWorkspaceRequest,
    ) -> wsm_orchestrator::Result<ClonedWorkspace> {
        self.service.clone_workspace(job_id, request).await?;
        self.service.wait_for_clone(job_id).await
    }

    /// Journal a clone job without handing it to the engine, so the test can
    /// drive its top-level steps one at a time.
    pub async fn stepped_clone(
        &self,
        job_id: &str,
        request: CloneWorkspaceRequest,
    ) -> Result<SteppedClone> {
        let plan = self.service.plan(request.source_workspace_id).await?;
        let params = CloneWorkspaceParams { request, plan };
        self.journal
            .create_flight(&FlightRecord::new(
                job_id,
                OperationKind::CloneWorkspace,
                serde_json::to_value(&params)?,
            ))
            .await?;

        let flight = CloneWorkspaceFlight::new(clone_services(&self.cloud), self.config.clone());
        let env = FlightEnv {
            journal: self.journal.clone(),
            executor: self.executor(),
        };
        let (runner, initial) = flight.build_runner(job_id, params, env);
        let state = runner
            .load_state(initial)
            .await
            .context("loading clone progress")?;
        Ok(SteppedClone { runner, state })
    }
}

/// A top-level clone advanced by hand.
pub struct SteppedClone {
    runner: FlightRunner<CloneWorkspaceContext>,
    state: RunState<CloneWorkspaceContext>,
}

impl SteppedClone {
    pub fn step_count(&self) -> usize {
        self.runner.step_names().len()
    }

    pub fn steps_done(&self) -> usize {
        self.state.next_step
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished(self.step_count())
    }

    pub fn context(&self) -> &CloneWorkspaceContext {
        &self.state.context
    }

    /// Run the next step and journal the result.
    pub async fn advance(&mut self) -> Result<()> {
        if let Some(name) = self.runner.step_names().get(self.state.next_step) {
            debug!(step = %name, "advancing stepped clone");
        }
        self.runner.advance(&mut self.state).await?;
        Ok(())
    }

    pub async fn advance_by(&mut self, steps: usize) -> Result<()> {
        for _ in 0..steps {
            if self.is_finished() {
                break;
            }
            self.advance().await?;
        }
        Ok(())
    }
}
