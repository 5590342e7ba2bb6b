//! Shared fixtures for the clone integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! look unused from any single test file.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use wsm_orchestrator::model::{
    CloningInstructions, CloudPlatform, ClonedResourceResult, ClonedWorkspace, Folder,
    ResourceType, WsmResource,
};
use wsm_testkit::{FakeCloud, SourceWorkspace};

/// A source with a three level folder chain, both cloud contexts, an
/// enabled application and a mix of cloneable and skipped resources.
pub struct MixedSource {
    pub source: SourceWorkspace,
    pub folders: Vec<Uuid>,
    pub bucket_reference: WsmResource,
    pub repo_reference: WsmResource,
    pub dataset: WsmResource,
    pub container: WsmResource,
    pub notebook: WsmResource,
}

pub fn seed_mixed_source(cloud: &Arc<FakeCloud>) -> MixedSource {
    let source = SourceWorkspace::create(cloud);
    let root = source.folder("analysis", None);
    let child = source.folder("inputs", Some(root));
    let grandchild = source.folder("raw", Some(child));

    let bucket_reference = source.referenced(
        "reads-ref",
        ResourceType::GcsBucket,
        CloningInstructions::CopyReference,
        Some(child),
    );
    let repo_reference = source.referenced(
        "pipelines",
        ResourceType::GitRepo,
        CloningInstructions::CopyNothing,
        None,
    );
    let dataset = source.controlled(
        "variants",
        ResourceType::BigQueryDataset,
        CloningInstructions::CopyResource,
        None,
    );
    let container = source.controlled(
        "scratch",
        ResourceType::AzureStorageContainer,
        CloningInstructions::CopyDefinition,
        Some(grandchild),
    );
    let notebook = source.controlled(
        "notebook",
        ResourceType::AiNotebookInstance,
        CloningInstructions::CopyResource,
        Some(root),
    );

    source.cloud_context(CloudPlatform::Gcp);
    source.cloud_context(CloudPlatform::Azure);
    source.application("cromwell");

    MixedSource {
        source,
        folders: vec![root, child, grandchild],
        bucket_reference,
        repo_reference,
        dataset,
        container,
        notebook,
    }
}

/// Per-resource outcome with the run-specific ids stripped, keyed by name.
pub fn result_summary(
    response: &ClonedWorkspace,
) -> BTreeMap<String, (ClonedResourceResult, bool, Option<String>)> {
    response
        .resources
        .iter()
        .map(|detail| {
            (
                detail.name.clone(),
                (
                    detail.result,
                    detail.destination_resource_id.is_some(),
                    detail.error_message.clone(),
                ),
            )
        })
        .collect()
}

/// Folder paths from root to leaf by display name, e.g. `analysis/inputs`.
pub fn folder_paths(folders: &[Folder]) -> Vec<String> {
    let by_id: BTreeMap<Uuid, &Folder> = folders.iter().map(|folder| (folder.id, folder)).collect();
    let mut paths: Vec<String> = folders
        .iter()
        .map(|folder| {
            let mut names = vec![folder.display_name.clone()];
            let mut parent = folder.parent_folder_id;
            while let Some(id) = parent {
                let ancestor = by_id[&id];
                names.push(ancestor.display_name.clone());
                parent = ancestor.parent_folder_id;
            }
            names.reverse();
            names.join("/")
        })
        .collect();
    paths.sort();
    paths
}

/// Every succeeded detail points at a resource that exists in the destination.
pub fn assert_destination_matches(cloud: &FakeCloud, response: &ClonedWorkspace) {
    let stored = cloud.resources(response.destination_workspace_id);
    for detail in &response.resources {
        match detail.result {
            ClonedResourceResult::Succeeded => {
                let id = detail
                    .destination_resource_id
                    .expect("succeeded clone has a destination id");
                assert!(
                    stored.iter().any(|resource| resource.resource_id == id),
                    "{} missing from destination",
                    detail.name
                );
            }
            ClonedResourceResult::Failed | ClonedResourceResult::Skipped => {
                assert!(detail.destination_resource_id.is_none(), "{}", detail.name);
            }
        }
    }
}
