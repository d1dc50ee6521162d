// crates/topgun-harness/src/teardown.rs
// ============================================================================
// Module: Teardown Coordinator
// Description: Best-effort, step-isolated cleanup after a scenario.
// Purpose: Release every resource a scenario acquired even when some fail.
// Dependencies: tempfile, tracing
// ============================================================================

//! ## Overview
//! Teardown runs a fixed sequence of steps. Each step's failure is logged and
//! recorded in a [`TeardownReport`]; no failure prevents a later step from
//! running.
//!
//! Step order:
//! 1. stop the deployment log tail;
//! 2. interrupt and reap tracked sessions;
//! 3. destroy containers on each worker's runtime, using the live API;
//! 4. delete the deployment;
//! 5. close the database pool;
//! 6. remove the scratch directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tempfile::TempDir;

use crate::auth::MAIN_TEAM;
use crate::deploy::DeploymentController;
use crate::error::HarnessError;
use crate::error::HarnessResult;
use crate::garden::GardenClient;
use crate::session::Session;
use crate::session::SessionSignal;

/// Grace a tracked session gets after an interrupt before it is killed.
const SESSION_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Report
// ============================================================================

/// Result of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step ran and succeeded.
    Completed,
    /// The step had nothing to do.
    Skipped(String),
    /// The step failed; later steps still ran.
    Failed(String),
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step name.
    pub name: &'static str,
    /// Step result.
    pub status: StepStatus,
}

/// Ordered record of every teardown step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    steps: Vec<StepRecord>,
}

impl TeardownReport {
    /// Returns the recorded steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Returns the status of the step called `name`.
    #[must_use]
    pub fn status(&self, name: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|step| step.name == name).map(|step| &step.status)
    }

    /// Returns the failed steps.
    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|step| matches!(step.status, StepStatus::Failed(_)))
    }

    /// Returns true when no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Converts the report into an error listing every failed step.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when any step failed.
    pub fn into_result(self) -> HarnessResult<()> {
        if self.is_clean() {
            return Ok(());
        }
        Err(HarnessError::setup("teardown", self.to_string()))
    }

    fn record(&mut self, name: &'static str, status: StepStatus) {
        self.steps.push(StepRecord {
            name,
            status,
        });
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures: Vec<String> = self
            .failures()
            .filter_map(|step| match &step.status {
                StepStatus::Failed(message) => Some(format!("{}: {message}", step.name)),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            write!(f, "{} teardown steps completed", self.steps.len())
        } else {
            write!(f, "{} teardown steps failed ({})", failures.len(), failures.join("; "))
        }
    }
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Runs teardown steps and records their results.
#[derive(Debug, Default)]
pub struct TeardownCoordinator {
    report: TeardownReport,
}

impl TeardownCoordinator {
    /// Creates a coordinator with an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one step. A failure is logged and recorded, never propagated.
    pub async fn step<F>(&mut self, name: &'static str, step: F)
    where
        F: Future<Output = HarnessResult<StepStatus>>,
    {
        let status = match step.await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(step = name, error = %err, "teardown step failed");
                StepStatus::Failed(err.to_string())
            }
        };
        if let StepStatus::Skipped(reason) = &status {
            tracing::debug!(step = name, reason = %reason, "teardown step skipped");
        }
        self.report.record(name, status);
    }

    /// Runs the full teardown sequence against a scenario's resources.
    pub async fn run(
        mut self,
        controller: &mut DeploymentController,
        tracked: &[Session],
        scratch: Option<TempDir>,
    ) -> TeardownReport {
        self.step("log-tail", async {
            controller.stop_log_tail().await;
            Ok(StepStatus::Completed)
        })
        .await;
        self.step("sessions", reap_sessions(controller, tracked)).await;
        self.step("containers", destroy_containers(controller)).await;
        self.step("deployment", async {
            controller.delete_deployment().await?;
            Ok(StepStatus::Completed)
        })
        .await;
        self.step("datastore", async {
            controller.close_datastore().await;
            Ok(StepStatus::Completed)
        })
        .await;
        self.step("scratch", async move {
            match scratch {
                Some(dir) => {
                    dir.close()?;
                    Ok(StepStatus::Completed)
                }
                None => Ok(StepStatus::Skipped("no scratch directory".to_string())),
            }
        })
        .await;
        self.finish()
    }

    /// Returns the report collected so far.
    #[must_use]
    pub fn finish(self) -> TeardownReport {
        self.report
    }
}

// ============================================================================
// SECTION: Steps
// ============================================================================

async fn reap_sessions(
    controller: &DeploymentController,
    tracked: &[Session],
) -> HarnessResult<StepStatus> {
    let live: Vec<&Session> = tracked.iter().filter(|session| !session.is_exited()).collect();
    if live.is_empty() {
        return Ok(StepStatus::Skipped("no live sessions".to_string()));
    }
    for session in live {
        session.signal(SessionSignal::Interrupt);
        if session.wait_timeout(SESSION_GRACE).await.is_err() {
            tracing::warn!(
                session = session.id(),
                command = session.command(),
                "session ignored interrupt; killing"
            );
            controller.sessions().terminate(session, SessionSignal::Kill).await;
        }
    }
    Ok(StepStatus::Completed)
}

async fn destroy_containers(controller: &DeploymentController) -> HarnessResult<StepStatus> {
    if controller.endpoint().is_none() {
        return Ok(StepStatus::Skipped("no web endpoint".to_string()));
    }
    let client = controller.client().await?;
    let workers = client.list_workers().await?;
    let containers = client.list_containers(MAIN_TEAM).await?;

    let mut failures = Vec::new();
    for worker in workers.iter().filter(|worker| !worker.garden_addr.is_empty()) {
        let garden = GardenClient::new(worker.garden_addr.as_str())?;
        let hosted = containers.iter().filter(|container| container.worker_name == worker.name);
        for container in hosted {
            if let Err(err) = garden.destroy(&container.id).await {
                tracing::error!(
                    worker = %worker.name,
                    handle = %container.id,
                    error = %err,
                    "container destroy failed"
                );
                failures.push(format!("{}/{}: {err}", worker.name, container.id));
            }
        }
    }
    if failures.is_empty() {
        Ok(StepStatus::Completed)
    } else {
        Err(HarnessError::Cleanup {
            resource: "containers",
            failures,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
