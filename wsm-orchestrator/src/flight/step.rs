use crate::error::StepError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

pub type StepResult = std::result::Result<(), StepError>;

/// Working state shared by the steps of one flight.
///
/// The runner persists it after every completed step, so everything a later
/// step (or a resumed run) depends on must live here.
pub trait FlightContext: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> FlightContext for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// One unit of durable work with a compensating action.
///
/// `do_step` may be re-invoked with the context persisted before its last
/// attempt (after a crash or a retryable failure) and must converge to the
/// same end state.
#[async_trait]
pub trait Step<C: Send>: Send + Sync {
    fn name(&self) -> &str;

    async fn do_step(&self, ctx: &mut C) -> StepResult;

    async fn undo_step(&self, _ctx: &mut C) -> StepResult {
        Ok(())
    }
}

pub type BoxedStep<C> = Box<dyn Step<C>>;
