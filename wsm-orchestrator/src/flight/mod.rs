//! Durable multi-step operations ("flights").
//!
//! A flight is an ordered list of [`Step`]s sharing a serializable context.
//! The [`FlightRunner`] journals progress after every step; on a fatal
//! failure it compensates completed steps in reverse. The
//! [`LocalFlightEngine`] runs flights as background tasks and resumes the
//! unfinished ones after a restart.

pub mod backoff;
pub mod engine;
pub mod executor;
pub mod journal;
pub mod runner;
pub mod step;

pub use backoff::{poll_with_backoff, BackoffPolicy, RetryPolicy};
pub use engine::{Flight, FlightEnv, FlightRegistry, LocalFlightEngine};
pub use executor::{
    OperationExecutor, OperationKind, OperationRequest, OperationState, SubmitOutcome,
};
pub use journal::{
    Direction, FlightJournal, FlightProgress, FlightRecord, FlightStatus, MemoryJournal,
};
pub use runner::{FlightOutcome, FlightRunner, RunState};
pub use step::{BoxedStep, FlightContext, Step, StepResult};
