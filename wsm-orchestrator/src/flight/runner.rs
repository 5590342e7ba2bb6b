use crate::error::{OrchestratorError, Result, StepError};
use crate::flight::backoff::RetryPolicy;
use crate::flight::journal::{Direction, FlightJournal, FlightProgress};
use crate::flight::step::{BoxedStep, FlightContext, Step, StepResult};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Terminal outcome of a flight run.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightOutcome<C> {
    Success(C),
    /// A step failed and every completed step was compensated.
    Failed(StepError),
    /// A step failed and compensation failed too.
    Dismal {
        cause: StepError,
        undo_error: StepError,
    },
}

impl<C> FlightOutcome<C> {
    /// Convert the success payload, keeping failures as they are.
    pub fn try_map<D, F>(self, f: F) -> Result<FlightOutcome<D>>
    where
        F: FnOnce(C) -> Result<D>,
    {
        Ok(match self {
            FlightOutcome::Success(ctx) => FlightOutcome::Success(f(ctx)?),
            FlightOutcome::Failed(cause) => FlightOutcome::Failed(cause),
            FlightOutcome::Dismal { cause, undo_error } => {
                FlightOutcome::Dismal { cause, undo_error }
            }
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FlightOutcome::Success(_))
    }
}

/// In-memory mirror of the persisted progress of one flight.
#[derive(Debug, Clone)]
pub struct RunState<C> {
    pub next_step: usize,
    pub direction: Direction,
    pub context: C,
    pub failure: Option<StepError>,
    pub undo_failure: Option<StepError>,
}

impl<C> RunState<C> {
    pub fn is_finished(&self, step_count: usize) -> bool {
        match self.direction {
            Direction::Do => self.next_step >= step_count,
            Direction::Undo => self.next_step == 0 || self.undo_failure.is_some(),
        }
    }

    pub fn into_outcome(self) -> FlightOutcome<C> {
        match (self.direction, self.failure, self.undo_failure) {
            (Direction::Do, _, _) => FlightOutcome::Success(self.context),
            (Direction::Undo, cause, Some(undo_error)) => FlightOutcome::Dismal {
                cause: cause.unwrap_or_else(|| StepError::fatal("unknown failure")),
                undo_error,
            },
            (Direction::Undo, cause, None) => FlightOutcome::Failed(
                cause.unwrap_or_else(|| StepError::fatal("unknown failure")),
            ),
        }
    }
}

/// Executes a fixed list of steps in registration order, persisting progress
/// after each one so a new runner over the same journal picks up where the
/// last one stopped.
pub struct FlightRunner<C: FlightContext> {
    flight_id: String,
    journal: Arc<dyn FlightJournal>,
    steps: Vec<BoxedStep<C>>,
    retry: RetryPolicy,
}

impl<C: FlightContext> FlightRunner<C> {
    pub fn new(
        flight_id: impl Into<String>,
        journal: Arc<dyn FlightJournal>,
        steps: Vec<BoxedStep<C>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            flight_id: flight_id.into(),
            journal,
            steps,
            retry,
        }
    }

    pub fn flight_id(&self) -> &str {
        &self.flight_id
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run (or resume) the flight until it reaches a terminal outcome.
    #[instrument(skip(self, initial), fields(flight_id = %self.flight_id))]
    pub async fn run(&self, initial: C) -> Result<FlightOutcome<C>> {
        let mut state = self.load_state(initial).await?;
        while !state.is_finished(self.steps.len()) {
            self.advance(&mut state).await?;
        }

        match state.direction {
            Direction::Do => info!("flight succeeded"),
            Direction::Undo => warn!(
                failure = ?state.failure,
                undo_failure = ?state.undo_failure,
                "flight failed"
            ),
        }
        Ok(state.into_outcome())
    }

    /// Load persisted progress, or start fresh from `initial`.
    pub async fn load_state(&self, initial: C) -> Result<RunState<C>> {
        if let Some(progress) = self.journal.load_progress(&self.flight_id).await? {
            debug!(
                flight_id = %self.flight_id,
                next_step = progress.next_step,
                direction = ?progress.direction,
                "resuming flight from journal"
            );
            return Ok(RunState {
                next_step: progress.next_step,
                direction: progress.direction,
                context: serde_json::from_value(progress.context)?,
                failure: progress.failure,
                undo_failure: progress.undo_failure,
            });
        }

        let state = RunState {
            next_step: 0,
            direction: Direction::Do,
            context: initial,
            failure: None,
            undo_failure: None,
        };
        self.persist(&state).await?;
        Ok(state)
    }

    /// Execute exactly one step (forward or compensating) and persist.
    pub async fn advance(&self, state: &mut RunState<C>) -> Result<()> {
        if state.is_finished(self.steps.len()) {
            return Ok(());
        }

        match state.direction {
            Direction::Do => {
                let step = self.step_at(state.next_step)?;
                match self.invoke(step, &mut state.context, Direction::Do).await {
                    Ok(()) => {
                        debug!(flight_id = %self.flight_id, step = step.name(), "step done");
                        state.next_step += 1;
                    }
                    Err(err) => {
                        warn!(
                            flight_id = %self.flight_id,
                            step = step.name(),
                            error = %err,
                            "step failed, compensating"
                        );
                        // The failed step is compensated too; it may have
                        // partially applied before failing.
                        state.direction = Direction::Undo;
                        state.next_step += 1;
                        state.failure = Some(err);
                    }
                }
            }
            Direction::Undo => {
                let index = state.next_step - 1;
                let step = self.step_at(index)?;
                match self.invoke(step, &mut state.context, Direction::Undo).await {
                    Ok(()) => {
                        debug!(flight_id = %self.flight_id, step = step.name(), "step undone");
                        state.next_step = index;
                    }
                    Err(err) => {
                        error!(
                            flight_id = %self.flight_id,
                            step = step.name(),
                            error = %err,
                            "undo failed"
                        );
                        state.undo_failure = Some(err);
                    }
                }
            }
        }

        self.persist(state).await
    }

    fn step_at(&self, index: usize) -> Result<&dyn Step<C>> {
        self.steps
            .get(index)
            .map(|step| step.as_ref())
            .ok_or_else(|| {
                OrchestratorError::InvalidState(format!(
                    "flight {} has no step {} (of {})",
                    self.flight_id,
                    index,
                    self.steps.len()
                ))
            })
    }

    async fn invoke(&self, step: &dyn Step<C>, ctx: &mut C, direction: Direction) -> StepResult {
        let snapshot = ctx.clone();
        let mut attempt = 1;
        loop {
            let result = match direction {
                Direction::Do => step.do_step(ctx).await,
                Direction::Undo => step.undo_step(ctx).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(StepError::Retry(message)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        flight_id = %self.flight_id,
                        step = step.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retryable failure: {}",
                        message
                    );
                    *ctx = snapshot.clone();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(StepError::Retry(message)) => {
                    return Err(StepError::Fatal(format!(
                        "{} gave up after {} attempts: {}",
                        step.name(),
                        attempt,
                        message
                    )))
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    async fn persist(&self, state: &RunState<C>) -> Result<()> {
        let progress = FlightProgress {
            flight_id: self.flight_id.clone(),
            next_step: state.next_step,
            direction: state.direction,
            context: serde_json::to_value(&state.context)?,
            failure: state.failure.clone(),
            undo_failure: state.undo_failure.clone(),
        };
        self.journal.save_progress(&progress).await
    }
}
