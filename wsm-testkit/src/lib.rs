//! Test support for the workspace clone orchestrator.
//!
//! - [`FakeCloud`]: in-memory collaborators with call counting and failure
//!   injection
//! - [`SourceWorkspace`]: seeds folders, resources, contexts and policies
//! - [`CloneHarness`]: flight engine plus clone service over a fake, with
//!   restart support for crash tests

pub mod cloud;
pub mod fixtures;
pub mod harness;

pub use cloud::{Call, FakeCloud};
pub use fixtures::SourceWorkspace;
pub use harness::{clone_services, provisioners, CloneHarness, SteppedClone};
pub use wsm_orchestrator::test_utils::{create_test_db, create_test_journal};
