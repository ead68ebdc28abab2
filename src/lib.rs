//! Core library for the `vastlaunch` GPU instance launcher.
//!
//! The crate drives the `vastai` marketplace CLI through a launch lifecycle
//! (search → pick → create → wait for SSH details → attach key → wait for
//! networking) and destroys the instance whenever a step after creation
//! fails. A separate connector attaches Mosh sessions to running instances.

pub mod cleanup;
pub mod config;
pub mod connection;
pub mod display;
pub mod logging;
pub mod manifest;
pub mod marketplace;
pub mod mosh;
pub mod picker;
pub mod provision;
pub mod retry;
pub mod runner;
pub mod test_support;
pub mod workflow;

pub use cleanup::{CleanupOutcome, cleanup_instance};
pub use config::{ConfigError, ConnectConfig, LaunchConfig, LaunchOverrides};
pub use connection::{ConnectionError, DirectEndpoint, SshEndpoint};
pub use marketplace::{
    CreateRequest, InstanceDetails, InstanceId, Marketplace, MarketplaceError, Offer, OfferQuery,
};
pub use mosh::{ConnectError, MoshClientInvocation, MoshConnector};
pub use picker::{Decision, OfferPicker, PickerState};
pub use provision::{
    KeyAttachment, LaunchError, LaunchPlan, LaunchReport, Provisioner, StepFailure,
};
pub use retry::{RetryExhausted, RetryPolicy};
pub use runner::{CommandOutput, CommandRunner, ExitPolicy, ProcessCommandRunner, RunnerError};
pub use workflow::{LaunchOutcome, LaunchWorkflow, WorkflowError};
