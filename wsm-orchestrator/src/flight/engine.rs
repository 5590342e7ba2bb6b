use crate::error::{ExecutorError, Result};
use crate::flight::executor::{
    OperationExecutor, OperationKind, OperationRequest, OperationState, SubmitOutcome,
};
use crate::flight::journal::{FlightJournal, FlightRecord, FlightStatus};
use crate::flight::runner::FlightOutcome;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// What a running flight can reach: its journal, and the executor for
/// launching sub-operations.
#[derive(Clone)]
pub struct FlightEnv {
    pub journal: Arc<dyn FlightJournal>,
    pub executor: Arc<dyn OperationExecutor>,
}

/// A kind of durable operation the engine knows how to run.
#[async_trait]
pub trait Flight: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Run or resume the flight with the given id. Must be safe to call again
    /// with the same id after an interruption.
    async fn run(
        &self,
        flight_id: &str,
        params: serde_json::Value,
        env: FlightEnv,
    ) -> Result<FlightOutcome<serde_json::Value>>;
}

#[derive(Default, Clone)]
pub struct FlightRegistry {
    flights: HashMap<OperationKind, Arc<dyn Flight>>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flight: Arc<dyn Flight>) {
        self.flights.insert(flight.kind(), flight);
    }

    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn Flight>> {
        self.flights.get(&kind).cloned()
    }
}

struct EngineInner {
    journal: Arc<dyn FlightJournal>,
    registry: FlightRegistry,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// In-process executor that runs each submitted flight on its own tokio task
/// and records every transition in a [`FlightJournal`].
#[derive(Clone)]
pub struct LocalFlightEngine {
    inner: Arc<EngineInner>,
}

impl LocalFlightEngine {
    pub fn new(journal: Arc<dyn FlightJournal>, registry: FlightRegistry) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                journal,
                registry,
                running: Mutex::new(HashMap::new()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn journal(&self) -> Arc<dyn FlightJournal> {
        self.inner.journal.clone()
    }

    /// Restart every flight the journal still lists as running.
    ///
    /// Returns how many flights were resumed.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let mut resumed = 0;
        for record in self.inner.journal.list_unfinished().await? {
            if self.is_running(&record.id).await {
                continue;
            }
            let Some(flight) = self.inner.registry.get(record.kind) else {
                warn!(operation_id = %record.id, kind = %record.kind, "no flight registered, failing operation");
                self.inner
                    .journal
                    .complete_flight(
                        &record.id,
                        FlightStatus::Fatal,
                        None,
                        Some(format!("no flight registered for {}", record.kind)),
                    )
                    .await?;
                continue;
            };
            info!(operation_id = %record.id, kind = %record.kind, "resuming operation");
            self.spawn(record, flight).await;
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Abort every flight task without touching the journal, as a process
    /// crash would. Operations submitted afterwards are journaled but not
    /// started.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.inner.running.lock().await.drain().collect();
        for (_, handle) in &handles {
            handle.abort();
        }
        for (id, handle) in handles {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!(operation_id = %id, error = %err, "flight task panicked");
                }
            }
        }
    }

    async fn is_running(&self, id: &str) -> bool {
        self.inner
            .running
            .lock()
            .await
            .get(id)
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn spawn(&self, record: FlightRecord, flight: Arc<dyn Flight>) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            warn!(operation_id = %record.id, "engine stopped, leaving operation for recovery");
            return;
        }
        let mut running = self.inner.running.lock().await;
        running.retain(|_, handle| !handle.is_finished());

        let id = record.id.clone();
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.drive(record, flight).await });
        running.insert(id, handle);
    }

    async fn drive(self, record: FlightRecord, flight: Arc<dyn Flight>) {
        let env = FlightEnv {
            journal: self.inner.journal.clone(),
            executor: Arc::new(self.clone()),
        };

        let (status, result, error) = match flight.run(&record.id, record.params, env).await {
            Ok(FlightOutcome::Success(value)) => (FlightStatus::Success, Some(value), None),
            Ok(FlightOutcome::Failed(cause)) => {
                (FlightStatus::Error, None, Some(cause.message().to_string()))
            }
            Ok(FlightOutcome::Dismal { cause, undo_error }) => (
                FlightStatus::Fatal,
                None,
                Some(format!(
                    "{}; compensation failed: {}",
                    cause.message(),
                    undo_error.message()
                )),
            ),
            Err(err) => {
                error!(operation_id = %record.id, error = %err, "flight aborted");
                (FlightStatus::Fatal, None, Some(err.to_string()))
            }
        };

        info!(operation_id = %record.id, kind = %record.kind, ?status, "operation finished");
        if let Err(err) = self
            .inner
            .journal
            .complete_flight(&record.id, status, result, error)
            .await
        {
            error!(operation_id = %record.id, error = %err, "failed to record completion");
        }
    }
}

#[async_trait]
impl OperationExecutor for LocalFlightEngine {
    async fn submit(
        &self,
        operation_id: &str,
        request: OperationRequest,
    ) -> std::result::Result<SubmitOutcome, ExecutorError> {
        let flight = self
            .inner
            .registry
            .get(request.kind)
            .ok_or_else(|| ExecutorError::UnknownKind(request.kind.to_string()))?;

        let record = FlightRecord::new(operation_id, request.kind, request.params);
        if !self.inner.journal.create_flight(&record).await? {
            info!(operation_id, kind = %request.kind, "operation already submitted");
            return Ok(SubmitOutcome::Duplicate);
        }

        info!(
            operation_id,
            kind = %request.kind,
            description = %request.description,
            "operation submitted"
        );
        self.spawn(record, flight).await;
        Ok(SubmitOutcome::Accepted)
    }

    async fn get_state(
        &self,
        operation_id: &str,
    ) -> std::result::Result<OperationState, ExecutorError> {
        let record = self
            .inner
            .journal
            .get_flight(operation_id)
            .await?
            .ok_or_else(|| ExecutorError::NotFound(operation_id.to_string()))?;

        Ok(OperationState {
            status: record.status,
            result: record.result,
            error_message: record.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::flight::backoff::BackoffPolicy;
    use crate::flight::journal::MemoryJournal;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Echoes its params back, or fails when asked to.
    #[derive(Default)]
    struct EchoFlight {
        runs: AtomicU32,
    }

    #[async_trait]
    impl Flight for EchoFlight {
        fn kind(&self) -> OperationKind {
            OperationKind::CreateCloudContext
        }

        async fn run(
            &self,
            _flight_id: &str,
            params: serde_json::Value,
            _env: FlightEnv,
        ) -> Result<FlightOutcome<serde_json::Value>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if params["fail"] == json!(true) {
                return Ok(FlightOutcome::Failed(StepError::fatal("quota exceeded")));
            }
            Ok(FlightOutcome::Success(params))
        }
    }

    fn poll() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(5),
            Duration::from_millis(20),
            Duration::from_secs(5),
        )
    }

    fn engine(flight: Arc<EchoFlight>) -> LocalFlightEngine {
        let mut registry = FlightRegistry::new();
        registry.register(flight);
        LocalFlightEngine::new(Arc::new(MemoryJournal::new()), registry)
    }

    #[tokio::test]
    async fn test_submit_and_await_success() {
        let flight = Arc::new(EchoFlight::default());
        let engine = engine(flight.clone());
        let request =
            OperationRequest::new(OperationKind::CreateCloudContext, "echo", &json!({"n": 1}))
                .unwrap();

        assert_eq!(
            engine.submit("op-1", request.clone()).await.unwrap(),
            SubmitOutcome::Accepted
        );
        let state = engine.await_completion("op-1", &poll()).await.unwrap();
        assert_eq!(state.status, FlightStatus::Success);
        assert_eq!(state.result, Some(json!({"n": 1})));

        assert_eq!(
            engine.submit("op-1", request).await.unwrap(),
            SubmitOutcome::Duplicate
        );
        assert_eq!(flight.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_flight_reports_error_message() {
        let engine = engine(Arc::new(EchoFlight::default()));
        let request =
            OperationRequest::new(OperationKind::CreateCloudContext, "echo", &json!({"fail": true}))
                .unwrap();
        engine.submit("op-2", request).await.unwrap();

        let state = engine.await_completion("op-2", &poll()).await.unwrap();
        assert_eq!(state.status, FlightStatus::Error);
        assert_eq!(state.error_message.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_unknown_kind_and_missing_operation() {
        let engine = engine(Arc::new(EchoFlight::default()));
        let request =
            OperationRequest::new(OperationKind::CloneWorkspace, "clone", &json!({})).unwrap();

        assert!(matches!(
            engine.submit("op-3", request).await,
            Err(ExecutorError::UnknownKind(_))
        ));
        assert!(matches!(
            engine.get_state("op-3").await,
            Err(ExecutorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_resumes_unfinished_flights() {
        let journal = Arc::new(MemoryJournal::new());
        journal
            .create_flight(&FlightRecord::new(
                "op-4",
                OperationKind::CreateCloudContext,
                json!({"n": 4}),
            ))
            .await
            .unwrap();

        let flight = Arc::new(EchoFlight::default());
        let mut registry = FlightRegistry::new();
        registry.register(flight.clone());
        let engine = LocalFlightEngine::new(journal, registry);

        assert_eq!(engine.recover().await.unwrap(), 1);
        let state = engine.await_completion("op-4", &poll()).await.unwrap();
        assert_eq!(state.status, FlightStatus::Success);
        assert_eq!(engine.recover().await.unwrap(), 0);
    }
}
