//! End-to-end workspace clones against the in-memory collaborators.

use std::sync::Arc;
use wsm_orchestrator::model::{
    CloningInstructions, ClonedResourceResult, CloudPlatform, ResourceType, FOLDER_ID_PROPERTY,
};
use wsm_orchestrator::{CloneConfig, MemoryJournal, OrchestratorError};
use wsm_testkit::{Call, CloneHarness, FakeCloud, SourceWorkspace};

mod helpers;
use helpers::{assert_destination_matches, folder_paths, seed_mixed_source};

/// Folders A and B (child of A), a bucket reference in B, a controlled
/// dataset outside any folder and a GCP context.
#[tokio::test]
async fn test_clone_two_folders_reference_and_dataset() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    let folder_a = source.folder("A", None);
    let folder_b = source.folder("B", Some(folder_a));
    let bucket = source.referenced(
        "bucket-ref",
        ResourceType::GcsBucket,
        CloningInstructions::CopyReference,
        Some(folder_b),
    );
    let dataset = source.controlled(
        "dataset",
        ResourceType::BigQueryDataset,
        CloningInstructions::CopyResource,
        None,
    );
    source.cloud_context(CloudPlatform::Gcp);

    let harness = CloneHarness::new(cloud.clone());
    let request = source.clone_request();
    let destination_id = request.destination.workspace_id;
    let response = harness.clone_workspace("clone-example", request).await.unwrap();

    assert_eq!(response.source_workspace_id, source.workspace_id);
    assert_eq!(response.destination_workspace_id, destination_id);
    assert_eq!(response.resources.len(), 2);
    assert!(response.fully_succeeded());

    let folders = cloud.folders(destination_id);
    assert_eq!(folders.len(), 2);
    let a_copy = folders.iter().find(|f| f.display_name == "A").unwrap();
    let b_copy = folders.iter().find(|f| f.display_name == "B").unwrap();
    assert_ne!(a_copy.id, folder_a);
    assert_ne!(b_copy.id, folder_b);
    assert_eq!(a_copy.parent_folder_id, None);
    assert_eq!(b_copy.parent_folder_id, Some(a_copy.id));

    let bucket_detail = response.resource(bucket.resource_id).unwrap();
    assert_eq!(bucket_detail.result, ClonedResourceResult::Succeeded);
    let bucket_copy_id = bucket_detail.destination_resource_id.unwrap();
    assert_ne!(bucket_copy_id, bucket.resource_id);

    let dataset_detail = response.resource(dataset.resource_id).unwrap();
    assert_eq!(dataset_detail.result, ClonedResourceResult::Succeeded);
    assert_ne!(
        dataset_detail.destination_resource_id.unwrap(),
        dataset.resource_id
    );

    let stored = cloud.resources(destination_id);
    let bucket_copy = stored
        .iter()
        .find(|r| r.resource_id == bucket_copy_id)
        .unwrap();
    assert_eq!(
        bucket_copy.properties.get(FOLDER_ID_PROPERTY),
        Some(&b_copy.id.to_string())
    );
    let lineage = bucket_copy.resource_lineage.last().unwrap();
    assert_eq!(lineage.source_workspace_id, source.workspace_id);
    assert_eq!(lineage.source_resource_id, bucket.resource_id);

    assert!(cloud.cloud_context(destination_id, CloudPlatform::Gcp).is_some());
    assert!(cloud.cloud_context(destination_id, CloudPlatform::Azure).is_none());
    assert_destination_matches(&cloud, &response);
}

#[tokio::test]
async fn test_clone_mixed_workspace() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    let harness = CloneHarness::new(cloud.clone());

    let request = seeded.source.clone_request();
    let destination_id = request.destination.workspace_id;
    let response = harness.clone_workspace("clone-mixed", request).await.unwrap();

    // The notebook is not cloneable and is left out entirely.
    assert_eq!(response.resources.len(), 4);
    assert!(response.resource(seeded.notebook.resource_id).is_none());
    assert_eq!(
        response.resource(seeded.repo_reference.resource_id).unwrap().result,
        ClonedResourceResult::Skipped
    );
    // Referenced resources come first.
    assert_eq!(response.resources[0].name, "reads-ref");
    assert_eq!(response.resources[1].name, "pipelines");

    assert_eq!(
        folder_paths(&cloud.folders(destination_id)),
        folder_paths(&cloud.folders(seeded.source.workspace_id))
    );
    assert!(cloud.cloud_context(destination_id, CloudPlatform::Gcp).is_some());
    assert!(cloud.cloud_context(destination_id, CloudPlatform::Azure).is_some());
    assert_eq!(cloud.applications(destination_id), vec!["cromwell"]);
    assert_eq!(cloud.resources(destination_id).len(), 3);
    assert_destination_matches(&cloud, &response);
}

#[tokio::test]
async fn test_clone_empty_workspace() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    let harness = CloneHarness::new(cloud.clone());

    let request = source.clone_request();
    let destination_id = request.destination.workspace_id;
    let response = harness.clone_workspace("clone-empty", request).await.unwrap();

    assert!(response.resources.is_empty());
    assert!(cloud.workspace_exists(destination_id));
    assert!(cloud.folders(destination_id).is_empty());
    assert_eq!(cloud.calls(Call::CreateCloudContext), 0);
}

#[tokio::test]
async fn test_resubmitting_a_job_does_not_clone_twice() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    let harness = CloneHarness::new(cloud.clone());
    let request = seeded.source.clone_request();

    let first = harness
        .clone_workspace("clone-once", request.clone())
        .await
        .unwrap();
    let second = harness.clone_workspace("clone-once", request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(cloud.calls(Call::CreateWorkspace), 1);
    assert_eq!(cloud.resources(first.destination_workspace_id).len(), 3);
}

#[tokio::test]
async fn test_clone_into_itself_is_rejected() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    let harness = CloneHarness::new(cloud.clone());

    let mut request = source.clone_request();
    request.destination.workspace_id = source.workspace_id;
    let err = harness
        .service
        .clone_workspace("clone-self", request)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidInput(_)));
    assert_eq!(cloud.calls(Call::CreateWorkspace), 0);
}

#[tokio::test]
async fn test_transient_collaborator_failures_are_retried() {
    let cloud = Arc::new(FakeCloud::new());
    let seeded = seed_mixed_source(&cloud);
    cloud.fail_transiently(Call::CreateFolder, 2);
    cloud.fail_transiently(Call::CreateReferencedResource, 1);
    cloud.fail_transiently(Call::GetCloneResult, 3);
    let harness = CloneHarness::new(cloud.clone());

    let request = seeded.source.clone_request();
    let destination_id = request.destination.workspace_id;
    let response = harness
        .clone_workspace("clone-flaky", request)
        .await
        .unwrap();

    assert!(response.fully_succeeded());
    assert_eq!(cloud.folders(destination_id).len(), 3);
    assert_eq!(cloud.resources(destination_id).len(), 3);
}

#[tokio::test]
async fn test_policies_are_merged_when_enabled() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    source.policy("region-constraint", &["us-central1"]);

    let config = CloneConfig {
        merge_policies: true,
        ..CloneConfig::fast()
    };
    let harness = CloneHarness::with_config(cloud.clone(), Arc::new(MemoryJournal::new()), config);
    let request = source.clone_request();
    let destination_id = request.destination.workspace_id;
    harness
        .clone_workspace("clone-policy", request)
        .await
        .unwrap();

    let policy = cloud.policy(destination_id).unwrap();
    assert_eq!(policy.attributes["region-constraint"], vec!["us-central1"]);
    assert_eq!(cloud.calls(Call::ClonePolicy), 1);
}

#[tokio::test]
async fn test_policies_are_left_alone_when_disabled() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    source.policy("region-constraint", &["us-central1"]);

    let harness = CloneHarness::new(cloud.clone());
    let request = source.clone_request();
    let destination_id = request.destination.workspace_id;
    harness
        .clone_workspace("clone-no-policy", request)
        .await
        .unwrap();

    assert!(cloud.policy(destination_id).is_none());
    assert_eq!(cloud.calls(Call::ClonePolicy), 0);
}

#[tokio::test]
async fn test_small_pages_still_find_everything() {
    let cloud = Arc::new(FakeCloud::new());
    let source = SourceWorkspace::create(&cloud);
    for i in 0..7 {
        source.referenced(
            &format!("ref-{i}"),
            ResourceType::GitRepo,
            CloningInstructions::CopyReference,
            None,
        );
        source.application(&format!("app-{i}"));
    }

    let config = CloneConfig {
        resource_page_size: 3,
        ..CloneConfig::fast()
    };
    let harness = CloneHarness::with_config(cloud.clone(), Arc::new(MemoryJournal::new()), config);
    let request = source.clone_request();
    let destination_id = request.destination.workspace_id;
    let response = harness
        .clone_workspace("clone-paged", request)
        .await
        .unwrap();

    assert_eq!(response.resources.len(), 7);
    assert_eq!(cloud.applications(destination_id).len(), 7);
}
