// crates/topgun-harness/src/teardown/tests.rs
// ============================================================================
// Module: Teardown Coordinator Tests
// Description: Unit tests for step isolation and report rendering.
// Purpose: Pin that a failing step never stops later steps.
// Dependencies: tokio
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    reason = "Test-only assertions favor direct unwrap for clarity."
)]

use super::StepStatus;
use super::TeardownCoordinator;
use crate::error::ErrorKind;
use crate::error::HarnessError;

#[tokio::test]
async fn failing_step_does_not_stop_later_steps() {
    let mut ran = Vec::new();
    let mut coordinator = TeardownCoordinator::new();
    coordinator
        .step("first", async {
            ran.push("first");
            Err(HarnessError::violation("garden unreachable"))
        })
        .await;
    coordinator
        .step("second", async {
            ran.push("second");
            Ok(StepStatus::Completed)
        })
        .await;
    let report = coordinator.finish();

    assert_eq!(ran, vec!["first", "second"]);
    assert_eq!(report.steps().len(), 2);
    assert!(matches!(
        report.status("first"),
        Some(StepStatus::Failed(message)) if message.contains("garden")
    ));
    assert_eq!(report.status("second"), Some(&StepStatus::Completed));
    assert!(!report.is_clean());
}

#[tokio::test]
async fn skipped_steps_do_not_count_as_failures() {
    let mut coordinator = TeardownCoordinator::new();
    coordinator.step("scratch", async { Ok(StepStatus::Skipped("nothing".to_string())) }).await;
    let report = coordinator.finish();
    assert!(report.is_clean());
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn report_error_lists_each_failed_step() {
    let mut coordinator = TeardownCoordinator::new();
    coordinator
        .step("containers", async {
            Err(HarnessError::Cleanup {
                resource: "containers",
                failures: vec!["w1/abc: 500".to_string()],
            })
        })
        .await;
    coordinator.step("deployment", async { Ok(StepStatus::Completed) }).await;
    coordinator
        .step("scratch", async { Err(HarnessError::Io(std::io::Error::other("busy"))) })
        .await;
    let report = coordinator.finish();
    assert_eq!(report.failures().count(), 2);

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Setup);
    let rendered = err.to_string();
    assert!(rendered.contains("2 teardown steps failed"));
    assert!(rendered.contains("containers: "));
    assert!(rendered.contains("scratch: "));
    assert!(!rendered.contains("deployment: "));
    assert!(rendered.contains("containers: failed to destroy 1 containers: w1/abc: 500"));
}

#[test]
fn cleanup_failures_are_infrastructure_not_assertions() {
    let err = HarnessError::Cleanup {
        resource: "containers",
        failures: vec!["w1/a: 500".to_string(), "w2/b: refused".to_string()],
    };
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(err.to_string(), "failed to destroy 2 containers: w1/a: 500; w2/b: refused");
}
