// crates/topgun-harness/src/lib.rs
// ============================================================================
// Module: TOPGUN Harness Library
// Description: Deployment orchestration and convergence polling for scenarios.
// Purpose: Drive external deploy tooling and assert on eventually-consistent state.
// Dependencies: reqwest, sqlx, tokio, tracing, url
// ============================================================================

//! ## Overview
//! The harness deploys a distributed CI system through an external deploy
//! tool, discovers the resulting instances, authenticates against the
//! deployed API, and waits for cluster state to converge.
//!
//! - [`SessionManager`] runs external processes with observable output.
//! - [`InstanceRegistry`] maps job and group names to instance addresses.
//! - [`DeploymentController`] sequences a full bring-up per lane.
//! - [`ConvergencePoller`] retries predicates until success or deadline.
//! - [`ScenarioContext`] owns one scenario's resources through teardown.
//!
//! Invariants:
//! - Every failure is a [`HarnessError`] with a stable [`ErrorKind`].
//! - Concurrently running scenarios never share a deployment name.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod config;
pub mod datastore;
pub mod deploy;
pub mod error;
pub mod fly;
pub mod garden;
pub mod lane;
pub mod logging;
pub mod poll;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod teardown;
pub mod workers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthClient;
pub use auth::AuthenticatedClient;
pub use auth::Container;
pub use auth::Token;
pub use auth::Worker;
pub use config::CloudCredentials;
pub use config::HarnessConfig;
pub use config::HarnessEnv;
pub use config::ReleaseVersions;
pub use datastore::DataStore;
pub use deploy::DeployArg;
pub use deploy::DeployTool;
pub use deploy::DeploymentController;
pub use error::ErrorKind;
pub use error::HarnessError;
pub use error::HarnessResult;
pub use fly::FlyCli;
pub use fly::TableRow;
pub use garden::GardenClient;
pub use lane::Lane;
pub use lane::LaneAllocator;
pub use logging::init_logging;
pub use poll::ConvergencePoller;
pub use poll::PollOutcome;
pub use poll::PollPolicy;
pub use registry::Instance;
pub use registry::InstanceRegistry;
pub use scenario::ScenarioContext;
pub use session::ExitOutcome;
pub use session::OutputBuffer;
pub use session::OutputCursor;
pub use session::Session;
pub use session::SessionManager;
pub use session::SessionSignal;
pub use teardown::StepStatus;
pub use teardown::TeardownCoordinator;
pub use teardown::TeardownReport;
