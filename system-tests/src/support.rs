// system-tests/src/support.rs
// ============================================================================
// Module: Scenario Support
// Description: Lane allocation, asset paths, and scenario bracketing.
// Purpose: Keep suites focused on the behavior they assert.
// Dependencies: futures, topgun-harness, tracing
// ============================================================================

//! ## Overview
//! [`run`] brackets a scenario body: it allocates a lane, begins a
//! [`ScenarioContext`], runs the body, and always tears down, even when the
//! body panics (the panic resumes after teardown). The body's failure wins
//! over a teardown failure so the first cause is reported.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::OnceLock;

use futures::FutureExt;

use topgun_harness::DeployArg;
use topgun_harness::HarnessConfig;
use topgun_harness::HarnessError;
use topgun_harness::HarnessResult;
use topgun_harness::LaneAllocator;
use topgun_harness::ScenarioContext;
use topgun_harness::init_logging;

/// Directory holding `deployments/`, `operations/`, and `tasks/`.
pub const ASSETS_ENV: &str = "TOPGUN_ASSETS_DIR";

static LANES: OnceLock<LaneAllocator> = OnceLock::new();

/// Returns the asset root.
#[must_use]
pub fn assets_dir() -> PathBuf {
    std::env::var_os(ASSETS_ENV)
        .map_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets"), PathBuf::from)
}

/// Returns a path under the asset root.
#[must_use]
pub fn asset(relative: &str) -> PathBuf {
    assets_dir().join(relative)
}

/// Returns an ops-file override for `operations/<name>`.
#[must_use]
pub fn ops(name: &str) -> DeployArg {
    DeployArg::OpsFile(asset("operations").join(name))
}

/// Fails with an assertion violation unless `condition` holds.
///
/// # Errors
///
/// Returns [`HarnessError::AssertionViolation`] carrying `message`.
pub fn ensure(condition: bool, message: impl Into<String>) -> HarnessResult<()> {
    if condition { Ok(()) } else { Err(HarnessError::violation(message)) }
}

/// Runs `body` inside a fresh scenario on its own lane.
///
/// # Errors
///
/// Returns the body's error, or the teardown report as an error when the
/// body passed but teardown did not.
///
/// # Panics
///
/// Re-raises a panic from `body` once teardown has run.
pub async fn run<F>(name: &str, body: F) -> HarnessResult<()>
where
    F: AsyncFnOnce(&mut ScenarioContext) -> HarnessResult<()>,
{
    init_logging();
    let config = HarnessConfig::load()?;
    let lane = LANES.get_or_init(|| LaneAllocator::new(config.lane_base)).acquire();
    tracing::info!(scenario = name, lane = %lane, "scenario starting");

    let context = ScenarioContext::begin(lane, config).await?;
    bracket(name, context, body).await
}

/// Runs `body` against `context`, then tears the context down whatever the
/// body did.
///
/// # Errors
///
/// See [`run`].
///
/// # Panics
///
/// Re-raises a panic from `body` once teardown has run.
pub async fn bracket<F>(name: &str, mut context: ScenarioContext, body: F) -> HarnessResult<()>
where
    F: AsyncFnOnce(&mut ScenarioContext) -> HarnessResult<()>,
{
    let outcome = AssertUnwindSafe(body(&mut context)).catch_unwind().await;
    let report = context.finish().await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(panic) => {
            tracing::error!(scenario = name, %report, "scenario panicked; torn down");
            std::panic::resume_unwind(panic);
        }
    };
    if let Err(err) = &outcome {
        tracing::error!(scenario = name, error = %err, "scenario failed");
    }
    outcome.and(report.into_result())
}

/// Runs `body` unless `skip_reason` is set, in which case the skip is logged.
///
/// # Errors
///
/// See [`run`].
pub async fn run_unless<F>(name: &str, skip_reason: Option<String>, body: F) -> HarnessResult<()>
where
    F: AsyncFnOnce(&mut ScenarioContext) -> HarnessResult<()>,
{
    if let Some(reason) = skip_reason {
        init_logging();
        tracing::warn!(scenario = name, reason = %reason, "scenario skipped");
        return Ok(());
    }
    run(name, body).await
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(all(test, unix))]
mod support_tests;
