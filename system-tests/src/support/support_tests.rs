// system-tests/src/support/support_tests.rs
// ============================================================================
// Module: Scenario Support Tests
// Description: Unit coverage for scenario bracketing.
// Purpose: Ensure teardown runs whether a scenario body fails or panics.
// Dependencies: futures, tokio, topgun-harness
// ============================================================================

//! ## Overview
//! The deploy tool and CLI are pointed at `true`, so a scenario context can
//! be begun and torn down without a director.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions favor direct unwrap/expect and panics."
)]

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use futures::FutureExt;
use topgun_harness::HarnessConfig;
use topgun_harness::HarnessError;
use topgun_harness::HarnessResult;
use topgun_harness::Lane;
use topgun_harness::ScenarioContext;

use super::bracket;

async fn context(lane: u32) -> (ScenarioContext, PathBuf) {
    let config = HarnessConfig {
        deploy_tool: PathBuf::from("true"),
        fly_binary: PathBuf::from("true"),
        ..HarnessConfig::default()
    };
    let context = ScenarioContext::begin(Lane::new(lane), config).await.unwrap();
    let scratch = context.scratch().unwrap().to_path_buf();
    (context, scratch)
}

#[tokio::test]
async fn panicking_body_is_torn_down_before_the_panic_resumes() {
    let (context, scratch) = context(901).await;
    assert!(scratch.exists());

    let outcome = AssertUnwindSafe(bracket(
        "panics",
        context,
        async |_ctx: &mut ScenarioContext| -> HarnessResult<()> {
            panic!("scenario body blew up")
        },
    ))
    .catch_unwind()
    .await;

    let panic = outcome.unwrap_err();
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"scenario body blew up"));
    assert!(!scratch.exists(), "scratch directory survived a panicking scenario");
}

#[tokio::test]
async fn body_failure_wins_over_a_clean_teardown() {
    let (context, scratch) = context(902).await;

    let err = bracket("fails", context, async |_ctx: &mut ScenarioContext| -> HarnessResult<()> {
        Err(HarnessError::violation("worker never landed"))
    })
    .await
    .unwrap_err();

    assert!(err.to_string().contains("worker never landed"));
    assert!(!scratch.exists());
}

#[tokio::test]
async fn passing_body_with_clean_teardown_is_ok() {
    let (context, _scratch) = context(903).await;
    let mut seen = None;

    bracket("passes", context, async |ctx: &mut ScenarioContext| -> HarnessResult<()> {
        seen = ctx.controller().endpoint().map(str::to_string);
        Ok(())
    })
    .await
    .unwrap();

    assert!(seen.is_none());
}
