//! Workspace clone: folders, cloud contexts, policies and resources of a
//! source workspace copied into a new destination workspace.
//!
//! [`WorkspaceCloneService`] submits a [`CloneWorkspaceFlight`]; the flight's
//! steps are assembled by [`build_clone_workspace_steps`] and fan resource
//! clones out through a [`CloneAllResourcesFlight`].

pub mod aggregate;
pub mod applications;
pub mod cloud_context;
pub mod composer;
pub mod context;
pub mod destination;
pub mod dispatch;
pub mod enumerate;
pub mod folders;
pub mod policy;
pub mod resource_steps;
pub mod service;

pub use aggregate::{details_from_operation, CloneResultMap, ControlledCloneOutput};
pub use cloud_context::{CreateCloudContextFlight, CreateCloudContextParams};
pub use composer::{build_clone_workspace_steps, CloneStepDeps, CloneWorkspaceFlight};
pub use context::{
    CloneAllResourcesContext, CloneAllResourcesParams, ClonePlan, CloneWorkspaceContext,
    CloneWorkspaceParams, ResourceCloneInputs,
};
pub use dispatch::{
    build_steps, CloneAllResourcesFlight, CloneStepFactory, DispatchDeps, DispatchTable,
};
pub use enumerate::{is_cloneable, CLONEABLE_CONTROLLED_TYPES};
pub use resource_steps::ProvisionerCloneFlight;
pub use service::{register_clone_flights, WorkspaceCloneService};
