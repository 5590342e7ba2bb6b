pub mod clone_details;
pub mod cloud_context;
pub mod folder;
pub mod resource;
pub mod workspace;

pub use clone_details::{
    CloneResult, ClonedResourceResult, ClonedWorkspace, ResourceCloneDetail,
    WsmResourceCloneDetails,
};
pub use cloud_context::{CloudContext, CloudPlatform};
pub use folder::{validate_folder_forest, Folder};
pub use resource::{
    CloningInstructions, ResourceLineageEntry, ResourceType, StewardshipType, WsmResource,
    FOLDER_ID_PROPERTY,
};
pub use workspace::{CloneWorkspaceRequest, DestinationWorkspace, Policy};
