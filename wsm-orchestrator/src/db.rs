use crate::error::{OrchestratorError, Result, StepError};
use crate::flight::executor::OperationKind;
use crate::flight::journal::{Direction, FlightJournal, FlightProgress, FlightRecord, FlightStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::Path;
use tracing::{debug, instrument};

/// Initialize database connection pool
#[instrument(fields(db_path = %db_path.display()))]
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    Ok(pool)
}

/// Run database migrations
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Flight journal persisted in SQLite. Survives process restarts.
#[derive(Clone)]
pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the journal database at `db_path` and bring
    /// its schema up to date.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = create_pool(db_path).await?;
        run_migrations(&pool).await?;
        debug!(db_path = %db_path.display(), "opened flight journal");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl FlightJournal for SqliteJournal {
    async fn create_flight(&self, record: &FlightRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO flights (id, kind, params, status, result, error, submitted_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(record.kind)
        .bind(serde_json::to_string(&record.params)?)
        .bind(record.status)
        .bind(record.result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&record.error)
        .bind(record.submitted_at.timestamp_millis())
        .bind(record.completed_at.map(|dt| dt.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_flight(&self, id: &str) -> Result<Option<FlightRecord>> {
        let row = sqlx::query_as::<_, FlightRow>("SELECT * FROM flights WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(FlightRecord::try_from).transpose()
    }

    async fn complete_flight(
        &self,
        id: &str,
        status: FlightStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE flights SET status = ?, result = ?, error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(result.as_ref().map(serde_json::to_string).transpose()?)
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound(id.to_string()));
        }
        debug!(flight_id = id, ?status, "flight completed");
        Ok(())
    }

    async fn save_progress(&self, progress: &FlightProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flight_progress (flight_id, next_step, direction, context, failure, undo_failure, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(flight_id) DO UPDATE SET
                next_step = excluded.next_step,
                direction = excluded.direction,
                context = excluded.context,
                failure = excluded.failure,
                undo_failure = excluded.undo_failure,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&progress.flight_id)
        .bind(progress.next_step as i64)
        .bind(progress.direction)
        .bind(serde_json::to_string(&progress.context)?)
        .bind(progress.failure.as_ref().map(serde_json::to_string).transpose()?)
        .bind(
            progress
                .undo_failure
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_progress(&self, flight_id: &str) -> Result<Option<FlightProgress>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT flight_id, next_step, direction, context, failure, undo_failure FROM flight_progress WHERE flight_id = ?",
        )
        .bind(flight_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FlightProgress::try_from).transpose()
    }

    async fn list_unfinished(&self) -> Result<Vec<FlightRecord>> {
        let rows = sqlx::query_as::<_, FlightRow>(
            "SELECT * FROM flights WHERE status = ? ORDER BY submitted_at ASC",
        )
        .bind(FlightStatus::Running)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FlightRecord::try_from).collect()
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
struct FlightRow {
    id: String,
    kind: OperationKind,
    params: String,
    status: FlightStatus,
    result: Option<String>,
    error: Option<String>,
    submitted_at: i64,
    completed_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    flight_id: String,
    next_step: i64,
    direction: Direction,
    context: String,
    failure: Option<String>,
    undo_failure: Option<String>,
}

fn from_millis(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts)
        .ok_or_else(|| OrchestratorError::InvalidState(format!("bad timestamp {ts}")))
}

fn parse_step_error(raw: Option<String>) -> Result<Option<StepError>> {
    Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
}

impl TryFrom<FlightRow> for FlightRecord {
    type Error = OrchestratorError;

    fn try_from(row: FlightRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind,
            params: serde_json::from_str(&row.params)?,
            status: row.status,
            result: row.result.map(|s| serde_json::from_str(&s)).transpose()?,
            error: row.error,
            submitted_at: from_millis(row.submitted_at)?,
            completed_at: row.completed_at.map(from_millis).transpose()?,
        })
    }
}

impl TryFrom<ProgressRow> for FlightProgress {
    type Error = OrchestratorError;

    fn try_from(row: ProgressRow) -> Result<Self> {
        let next_step = usize::try_from(row.next_step).map_err(|_| {
            OrchestratorError::InvalidState(format!(
                "flight {} has negative step index {}",
                row.flight_id, row.next_step
            ))
        })?;
        Ok(Self {
            flight_id: row.flight_id,
            next_step,
            direction: row.direction,
            context: serde_json::from_str(&row.context)?,
            failure: parse_step_error(row.failure)?,
            undo_failure: parse_step_error(row.undo_failure)?,
        })
    }
}
