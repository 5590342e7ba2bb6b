use crate::error::{ExecutorError, Result};
use crate::flight::backoff::{poll_with_backoff, BackoffPolicy};
use crate::flight::journal::FlightStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OperationKind {
    CloneWorkspace,
    CloneAllResources,
    CreateCloudContext,
    CloneControlledResource,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::CloneWorkspace => "clone_workspace",
            OperationKind::CloneAllResources => "clone_all_resources",
            OperationKind::CreateCloudContext => "create_cloud_context",
            OperationKind::CloneControlledResource => "clone_controlled_resource",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub description: String,
    pub params: serde_json::Value,
}

impl OperationRequest {
    pub fn new<P: Serialize>(
        kind: OperationKind,
        description: impl Into<String>,
        params: &P,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            description: description.into(),
            params: serde_json::to_value(params)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// An operation with this id was already submitted.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationState {
    pub status: FlightStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Durable step executor: launches operations under caller-chosen ids and
/// reports their state.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    fn new_operation_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    async fn submit(
        &self,
        operation_id: &str,
        request: OperationRequest,
    ) -> std::result::Result<SubmitOutcome, ExecutorError>;

    async fn get_state(
        &self,
        operation_id: &str,
    ) -> std::result::Result<OperationState, ExecutorError>;

    /// Wait for the operation to reach a terminal state.
    async fn await_completion(
        &self,
        operation_id: &str,
        poll: &BackoffPolicy,
    ) -> std::result::Result<OperationState, ExecutorError> {
        poll_with_backoff(poll, operation_id, || async move {
            let state = self.get_state(operation_id).await?;
            Ok(state.status.is_terminal().then_some(state))
        })
        .await
    }
}
