use crate::error::{OrchestratorError, Result, StepError};
use crate::flight::executor::OperationKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FlightStatus {
    Running,
    Success,
    /// Failed and fully compensated.
    Error,
    /// Failed and compensation itself failed.
    Fatal,
}

impl FlightStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlightStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Direction {
    Do,
    Undo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub id: String,
    pub kind: OperationKind,
    pub params: serde_json::Value,
    pub status: FlightStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlightRecord {
    pub fn new(id: impl Into<String>, kind: OperationKind, params: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            params,
            status: FlightStatus::Running,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Where a flight's runner stands. In the `Undo` direction `next_step`
/// counts the steps still to compensate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightProgress {
    pub flight_id: String,
    pub next_step: usize,
    pub direction: Direction,
    pub context: serde_json::Value,
    pub failure: Option<StepError>,
    pub undo_failure: Option<StepError>,
}

/// Persistent store for flight records and step progress.
#[async_trait]
pub trait FlightJournal: Send + Sync {
    /// Insert a new flight record. Returns `false` when the id is taken.
    async fn create_flight(&self, record: &FlightRecord) -> Result<bool>;

    async fn get_flight(&self, id: &str) -> Result<Option<FlightRecord>>;

    async fn complete_flight(
        &self,
        id: &str,
        status: FlightStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()>;

    async fn save_progress(&self, progress: &FlightProgress) -> Result<()>;

    async fn load_progress(&self, flight_id: &str) -> Result<Option<FlightProgress>>;

    async fn list_unfinished(&self) -> Result<Vec<FlightRecord>>;
}

/// Journal kept in process memory. Survives a simulated restart as long as
/// the same instance is handed to the new engine.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    flights: Mutex<HashMap<String, FlightRecord>>,
    progress: Mutex<HashMap<String, FlightProgress>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlightJournal for MemoryJournal {
    async fn create_flight(&self, record: &FlightRecord) -> Result<bool> {
        let mut flights = self.flights.lock().await;
        if flights.contains_key(&record.id) {
            return Ok(false);
        }
        flights.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn get_flight(&self, id: &str) -> Result<Option<FlightRecord>> {
        Ok(self.flights.lock().await.get(id).cloned())
    }

    async fn complete_flight(
        &self,
        id: &str,
        status: FlightStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        let mut flights = self.flights.lock().await;
        let record = flights
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        record.status = status;
        record.result = result;
        record.error = error;
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn save_progress(&self, progress: &FlightProgress) -> Result<()> {
        self.progress
            .lock()
            .await
            .insert(progress.flight_id.clone(), progress.clone());
        Ok(())
    }

    async fn load_progress(&self, flight_id: &str) -> Result<Option<FlightProgress>> {
        Ok(self.progress.lock().await.get(flight_id).cloned())
    }

    async fn list_unfinished(&self) -> Result<Vec<FlightRecord>> {
        let mut unfinished: Vec<FlightRecord> = self
            .flights
            .lock()
            .await
            .values()
            .filter(|record| !record.status.is_terminal())
            .cloned()
            .collect();
        unfinished.sort_by_key(|record| record.submitted_at);
        Ok(unfinished)
    }
}
