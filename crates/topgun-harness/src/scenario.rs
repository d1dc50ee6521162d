// crates/topgun-harness/src/scenario.rs
// ============================================================================
// Module: Scenario Context
// Description: Per-scenario state owned from setup through teardown.
// Purpose: Give each scenario a clean lane, scratch space, and teardown.
// Dependencies: tempfile, tracing
// ============================================================================

//! ## Overview
//! [`ScenarioContext::begin`] deletes whatever the lane's deployment name
//! still holds from earlier runs, then hands back a fresh controller and
//! scratch directory. [`ScenarioContext::finish`] runs the
//! [`TeardownCoordinator`] over everything the scenario acquired.
//!
//! Invariants:
//! - No state survives between scenarios; each owns a new controller.

use std::path::Path;

use tempfile::TempDir;

use crate::config::HarnessConfig;
use crate::deploy::DeploymentController;
use crate::error::HarnessError;
use crate::error::HarnessResult;
use crate::fly::FlyCli;
use crate::lane::Lane;
use crate::poll::ConvergencePoller;
use crate::session::Session;
use crate::session::SessionManager;
use crate::teardown::TeardownCoordinator;
use crate::teardown::TeardownReport;

/// Everything one scenario owns.
#[derive(Debug)]
pub struct ScenarioContext {
    controller: DeploymentController,
    fly: FlyCli,
    poller: ConvergencePoller,
    scratch: Option<TempDir>,
    tracked: Vec<Session>,
}

impl ScenarioContext {
    /// Prepares a scenario on `lane`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when the stale deployment
    /// cannot be deleted or the scratch directory cannot be created.
    pub async fn begin(lane: Lane, config: HarnessConfig) -> HarnessResult<Self> {
        Self::begin_with(lane, config, |controller| controller).await
    }

    /// Like [`ScenarioContext::begin`], letting the caller adjust the
    /// controller before the stale deployment is removed.
    ///
    /// # Errors
    ///
    /// See [`ScenarioContext::begin`].
    pub async fn begin_with<F>(lane: Lane, config: HarnessConfig, adjust: F) -> HarnessResult<Self>
    where
        F: FnOnce(DeploymentController) -> DeploymentController,
    {
        let sessions = SessionManager::new();
        let fly = FlyCli::new(&config.fly_binary, lane.fly_target(), sessions.clone());
        let poller = ConvergencePoller::from_config(&config);
        let controller = DeploymentController::new(lane, config, sessions)
            .map_err(|err| err.into_setup("scenario"))?
            .with_fly(fly.clone());
        let mut controller = adjust(controller);

        tracing::info!(deployment = controller.tool().deployment(), "clearing stale deployment");
        controller.delete_deployment().await.map_err(|err| err.into_setup("scenario"))?;
        let scratch = tempfile::Builder::new()
            .prefix("topgun-")
            .tempdir()
            .map_err(|err| HarnessError::from(err).into_setup("scenario"))?;

        Ok(Self {
            controller,
            fly,
            poller,
            scratch: Some(scratch),
            tracked: Vec::new(),
        })
    }

    /// Returns the deployment controller.
    #[must_use]
    pub const fn controller(&self) -> &DeploymentController {
        &self.controller
    }

    /// Returns the deployment controller mutably.
    pub const fn controller_mut(&mut self) -> &mut DeploymentController {
        &mut self.controller
    }

    /// Returns the CLI wrapper targeting this lane.
    #[must_use]
    pub const fn fly(&self) -> &FlyCli {
        &self.fly
    }

    /// Returns the poller configured for this run.
    #[must_use]
    pub const fn poller(&self) -> &ConvergencePoller {
        &self.poller
    }

    /// Returns the scratch directory.
    #[must_use]
    pub fn scratch(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    /// Registers a session to be interrupted and reaped on teardown.
    pub fn track(&mut self, session: Session) -> Session {
        self.tracked.push(session.clone());
        session
    }

    /// Tears the scenario down. Never fails; inspect the report.
    pub async fn finish(mut self) -> TeardownReport {
        let scratch = self.scratch.take();
        let report =
            TeardownCoordinator::new().run(&mut self.controller, &self.tracked, scratch).await;
        if report.is_clean() {
            tracing::info!(%report, "scenario torn down");
        } else {
            tracing::error!(%report, "scenario teardown incomplete");
        }
        report
    }
}
