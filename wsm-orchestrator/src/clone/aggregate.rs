use crate::clone::context::ResourceCloneInputs;
use crate::error::StepError;
use crate::flight::{FlightStatus, OperationState};
use crate::model::{CloningInstructions, ClonedWorkspace, WsmResource, WsmResourceCloneDetails};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result payload of a controlled-resource clone sub-operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlledCloneOutput {
    /// `None` when the clone deliberately created nothing.
    pub destination_resource: Option<WsmResource>,
}

/// Per-resource clone outcomes keyed by source resource id.
///
/// Entries are only ever added in a terminal state and are never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloneResultMap {
    entries: BTreeMap<Uuid, WsmResourceCloneDetails>,
}

impl CloneResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_resource_id: Uuid) -> Option<&WsmResourceCloneDetails> {
        self.entries.get(&source_resource_id)
    }

    pub fn is_resolved(&self, source_resource_id: Uuid) -> bool {
        self.entries.contains_key(&source_resource_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WsmResourceCloneDetails> {
        self.entries.values()
    }

    /// Record a terminal outcome. Returns `false` if the resource already had
    /// one, in which case the existing entry is kept.
    pub fn record(&mut self, details: WsmResourceCloneDetails) -> Result<bool, StepError> {
        if !details.result.is_terminal() {
            return Err(StepError::fatal(format!(
                "refusing to record non-terminal result for resource {}",
                details.source_resource_id
            )));
        }
        if let Some(existing) = self.entries.get(&details.source_resource_id) {
            if existing.result != details.result {
                warn!(
                    resource_id = %details.source_resource_id,
                    kept = ?existing.result,
                    ignored = ?details.result,
                    "resource already has a clone result"
                );
            }
            return Ok(false);
        }
        debug!(
            resource_id = %details.source_resource_id,
            result = ?details.result,
            "recorded clone result"
        );
        self.entries.insert(details.source_resource_id, details);
        Ok(true)
    }

    /// Build the caller-facing response, listing resources in enumeration
    /// order. Every work item must have a terminal entry.
    pub fn to_response(
        &self,
        source_workspace_id: Uuid,
        destination_workspace_id: Uuid,
        work_items: &[ResourceCloneInputs],
    ) -> Result<ClonedWorkspace, StepError> {
        let resources = work_items
            .iter()
            .map(|item| {
                let details = self.get(item.source_resource_id()).ok_or_else(|| {
                    StepError::fatal(format!(
                        "resource {} finished without a clone result",
                        item.source_resource_id()
                    ))
                })?;
                details
                    .to_api()
                    .map_err(|err| StepError::fatal(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ClonedWorkspace {
            source_workspace_id,
            destination_workspace_id,
            resources,
        })
    }
}

/// Turn the terminal state of a controlled clone sub-operation into the
/// resource's clone outcome.
///
/// COPY_NOTHING always resolves to SKIPPED, even when the sub-operation
/// failed; the failure message is kept for diagnosis.
pub fn details_from_operation(
    inputs: &ResourceCloneInputs,
    state: &OperationState,
) -> Result<WsmResourceCloneDetails, StepError> {
    let resource = &inputs.resource;
    let copy_nothing = resource.cloning_instructions == CloningInstructions::CopyNothing;

    match state.status {
        FlightStatus::Running => Err(StepError::fatal(format!(
            "clone of resource {} observed in non-terminal state",
            resource.resource_id
        ))),
        FlightStatus::Success if copy_nothing => Ok(WsmResourceCloneDetails::skipped(resource)),
        FlightStatus::Success => {
            let payload = state.result.clone().ok_or_else(|| {
                StepError::fatal(format!(
                    "clone of resource {} succeeded without a result",
                    resource.resource_id
                ))
            })?;
            let output: ControlledCloneOutput = serde_json::from_value(payload).map_err(|err| {
                StepError::fatal(format!(
                    "malformed clone result for resource {}: {err}",
                    resource.resource_id
                ))
            })?;
            let destination = output.destination_resource.ok_or_else(|| {
                StepError::fatal(format!(
                    "clone of resource {} reported no destination resource",
                    resource.resource_id
                ))
            })?;
            Ok(WsmResourceCloneDetails::succeeded(
                resource,
                destination.resource_id,
            ))
        }
        FlightStatus::Error | FlightStatus::Fatal => {
            let message = state
                .error_message
                .clone()
                .unwrap_or_else(|| "clone failed without an error message".to_string());
            if copy_nothing {
                Ok(WsmResourceCloneDetails {
                    error_message: Some(message),
                    ..WsmResourceCloneDetails::skipped(resource)
                })
            } else {
                Ok(WsmResourceCloneDetails::failed(resource, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CloneResult, ResourceType, StewardshipType};
    use serde_json::json;

    fn inputs(instructions: CloningInstructions) -> ResourceCloneInputs {
        ResourceCloneInputs {
            resource: WsmResource {
                resource_id: Uuid::new_v4(),
                workspace_id: Uuid::new_v4(),
                name: "bucket".to_string(),
                description: Some("raw reads".to_string()),
                stewardship_type: StewardshipType::Controlled,
                resource_type: ResourceType::GcsBucket,
                cloning_instructions: instructions,
                properties: BTreeMap::new(),
                resource_lineage: vec![],
                attributes: json!({"bucketName": "reads"}),
            },
            operation_id: "op-1".to_string(),
            destination_resource_id: Uuid::new_v4(),
            destination_folder_id: None,
        }
    }

    fn state(status: FlightStatus, result: Option<serde_json::Value>, error: Option<&str>) -> OperationState {
        OperationState {
            status,
            result,
            error_message: error.map(str::to_string),
        }
    }

    #[test]
    fn test_success_maps_to_succeeded_with_destination() {
        let item = inputs(CloningInstructions::CopyResource);
        let clone = item
            .resource
            .build_clone(Uuid::new_v4(), item.destination_resource_id, None);
        let payload = serde_json::to_value(ControlledCloneOutput {
            destination_resource: Some(clone),
        })
        .unwrap();

        let details =
            details_from_operation(&item, &state(FlightStatus::Success, Some(payload), None))
                .unwrap();
        assert_eq!(details.result, CloneResult::Succeeded);
        assert_eq!(details.destination_resource_id, Some(item.destination_resource_id));
    }

    #[test]
    fn test_copy_nothing_is_always_skipped() {
        let item = inputs(CloningInstructions::CopyNothing);
        for status in [FlightStatus::Success, FlightStatus::Error, FlightStatus::Fatal] {
            let details =
                details_from_operation(&item, &state(status, None, Some("boom"))).unwrap();
            assert_eq!(details.result, CloneResult::Skipped);
            assert_eq!(details.destination_resource_id, None);
        }
    }

    #[test]
    fn test_error_maps_to_failed_with_message() {
        let item = inputs(CloningInstructions::CopyDefinition);
        let details = details_from_operation(
            &item,
            &state(FlightStatus::Error, None, Some("permission denied")),
        )
        .unwrap();
        assert_eq!(details.result, CloneResult::Failed);
        assert_eq!(details.error_message.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_running_and_malformed_results_are_fatal() {
        let item = inputs(CloningInstructions::CopyResource);
        assert!(matches!(
            details_from_operation(&item, &state(FlightStatus::Running, None, None)),
            Err(StepError::Fatal(_))
        ));
        assert!(matches!(
            details_from_operation(&item, &state(FlightStatus::Success, None, None)),
            Err(StepError::Fatal(_))
        ));
        assert!(matches!(
            details_from_operation(
                &item,
                &state(FlightStatus::Success, Some(json!({"destination_resource": null})), None)
            ),
            Err(StepError::Fatal(_))
        ));
    }

    #[test]
    fn test_results_are_sticky() {
        let item = inputs(CloningInstructions::CopyResource);
        let mut map = CloneResultMap::new();

        assert!(map
            .record(WsmResourceCloneDetails::failed(&item.resource, "quota"))
            .unwrap());
        assert!(!map
            .record(WsmResourceCloneDetails::succeeded(
                &item.resource,
                item.destination_resource_id
            ))
            .unwrap());
        assert_eq!(
            map.get(item.source_resource_id()).unwrap().result,
            CloneResult::Failed
        );

        assert!(matches!(
            map.record(WsmResourceCloneDetails::pending(&item.resource)),
            Err(StepError::Fatal(_))
        ));
    }

    #[test]
    fn test_response_requires_every_item() {
        let first = inputs(CloningInstructions::CopyResource);
        let second = inputs(CloningInstructions::CopyNothing);
        let mut map = CloneResultMap::new();
        map.record(WsmResourceCloneDetails::skipped(&second.resource))
            .unwrap();

        let items = vec![first.clone(), second.clone()];
        assert!(map
            .to_response(Uuid::new_v4(), Uuid::new_v4(), &items)
            .is_err());

        map.record(WsmResourceCloneDetails::succeeded(
            &first.resource,
            first.destination_resource_id,
        ))
        .unwrap();
        let response = map
            .to_response(Uuid::new_v4(), Uuid::new_v4(), &items)
            .unwrap();
        assert_eq!(response.resources.len(), 2);
        assert_eq!(response.resources[0].source_resource_id, first.source_resource_id());
    }
}
