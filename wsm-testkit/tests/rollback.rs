//! A fatal failure after the destination exists undoes everything and
//! reports the clone as failed.

use std::sync::Arc;
use wsm_orchestrator::model::CloudPlatform;
use wsm_orchestrator::OrchestratorError;
use wsm_testkit::{Call, CloneHarness, FakeCloud};

mod helpers;
use helpers::seed_mixed_source;

#[tokio::test]
async fn test_failure_after_resources_rolls_back_destination() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    cloud.reject(Call::EnableApplication, "application service unavailable");

    let harness = CloneHarness::new(cloud.clone());
    let request = seeded.source.clone_request();
    let destination_id = request.destination.workspace_id;
    let err = harness
        .clone_workspace("rollback-late", request)
        .await
        .unwrap_err();

    match err {
        OrchestratorError::CloneFailed(message) => {
            assert!(message.contains("application service unavailable"), "{message}")
        }
        other => panic!("expected CloneFailed, got {other:?}"),
    }

    assert!(!cloud.workspace_exists(destination_id));
    assert!(cloud.folders(destination_id).is_empty());
    assert!(cloud.resources(destination_id).is_empty());
    assert!(cloud.cloud_context(destination_id, CloudPlatform::Gcp).is_none());
    assert!(cloud.cloud_context(destination_id, CloudPlatform::Azure).is_none());
    assert_eq!(cloud.calls(Call::DeleteWorkspace), 1);
    assert_eq!(cloud.calls(Call::DeleteAllFolders), 1);

    // The source is untouched.
    assert!(cloud.workspace_exists(seeded.source.workspace_id));
    assert_eq!(cloud.folders(seeded.source.workspace_id).len(), 3);
}

#[tokio::test]
async fn test_cloud_context_failure_rolls_back_destination() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    cloud.reject(Call::CreateCloudContext, "billing account closed");

    let harness = CloneHarness::new(cloud.clone());
    let request = seeded.source.clone_request();
    let destination_id = request.destination.workspace_id;
    let err = harness
        .clone_workspace("rollback-context", request)
        .await
        .unwrap_err();

    assert!(
        matches!(err, OrchestratorError::CloneFailed(ref m) if m.contains("billing account closed")),
        "{err:?}"
    );
    assert!(!cloud.workspace_exists(destination_id));
    assert_eq!(cloud.calls(Call::CloneResource), 0);
}

#[tokio::test]
async fn test_failed_compensation_is_reported() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    cloud.reject(Call::EnableApplication, "application service unavailable");
    cloud.reject(Call::DeleteWorkspace, "workspace locked");

    let harness = CloneHarness::new(cloud.clone());
    let request = seeded.source.clone_request();
    let destination_id = request.destination.workspace_id;
    let err = harness
        .clone_workspace("rollback-dismal", request)
        .await
        .unwrap_err();

    let OrchestratorError::CloneFailed(message) = err else {
        panic!("expected CloneFailed");
    };
    assert!(message.contains("compensation failed"), "{message}");
    assert!(message.contains("workspace locked"), "{message}");
    assert!(cloud.workspace_exists(destination_id));
}

#[tokio::test]
async fn test_existing_destination_is_adopted() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    let request = seeded.source.clone_request();
    cloud.add_workspace(request.destination.workspace_id);

    let harness = CloneHarness::new(cloud.clone());
    let response = harness
        .clone_workspace("existing-destination", request)
        .await
        .unwrap();

    assert!(response.fully_succeeded());
    assert_eq!(cloud.resources(response.destination_workspace_id).len(), 3);
}
