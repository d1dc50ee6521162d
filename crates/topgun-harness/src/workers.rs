// crates/topgun-harness/src/workers.rs
// ============================================================================
// Module: Worker Convergence
// Description: Waits and filters over worker, container, and volume listings.
// Purpose: Express the common worker lifecycle waits on top of the poller.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Waits here read `fly workers` on every evaluation and hand the rows to a
//! pure classifier, so the convergence rules are testable without a CLI.
//!
//! Invariants:
//! - A state expected to be held by exactly one worker fails fast when two
//!   workers hold it at once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::auth::AuthenticatedClient;
use crate::auth::MAIN_TEAM;
use crate::error::HarnessResult;
use crate::fly::FlyCli;
use crate::fly::TableRow;
use crate::poll::ConvergencePoller;
use crate::poll::PollOutcome;

/// Worker state reported once registration completes.
pub const RUNNING: &str = "running";

// ============================================================================
// SECTION: Classifiers
// ============================================================================

/// Classifies a worker listing against a set of mutually-exclusive states.
#[must_use]
pub fn exclusive_worker_in_state(rows: &[TableRow], states: &[&str]) -> PollOutcome<String> {
    let mut matched = rows.iter().filter(|row| {
        row.get("state").is_some_and(|state| states.contains(&state.as_str()))
    });
    let Some(first) = matched.next() else {
        return PollOutcome::pending(format!("no worker in {}", states.join("|")));
    };
    if let Some(second) = matched.next() {
        return PollOutcome::violation(format!(
            "multiple workers in states {}: {} and {}",
            states.join(", "),
            cell(first, "name"),
            cell(second, "name")
        ));
    }
    match first.get("name") {
        Some(name) => PollOutcome::Satisfied(name.clone()),
        None => PollOutcome::pending("matching worker has no name yet"),
    }
}

/// Satisfied when no worker reports a state other than `running`.
#[must_use]
pub fn all_running(rows: &[TableRow]) -> PollOutcome<()> {
    let lagging: Vec<String> = rows
        .iter()
        .filter(|row| row.get("state").map(String::as_str) != Some(RUNNING))
        .map(|row| format!("{}={}", cell(row, "name"), cell(row, "state")))
        .collect();
    if lagging.is_empty() {
        PollOutcome::Satisfied(())
    } else {
        PollOutcome::pending(lagging.join(", "))
    }
}

/// Returns `key` of every row whose `column` equals `value`.
#[must_use]
pub fn select(rows: &[TableRow], column: &str, value: &str, key: &str) -> Vec<String> {
    rows.iter()
        .filter(|row| row.get(column).map(String::as_str) == Some(value))
        .filter_map(|row| row.get(key).cloned())
        .collect()
}

fn cell<'a>(row: &'a TableRow, column: &str) -> &'a str {
    row.get(column).map_or("?", String::as_str)
}

// ============================================================================
// SECTION: Waits
// ============================================================================

/// Waits until exactly one worker is in one of `states` and returns its
/// name.
///
/// # Errors
///
/// Fails fast with [`crate::HarnessError::AssertionViolation`] when two
/// workers match at once, and with [`crate::HarnessError::Timeout`] when none
/// does in time.
pub async fn wait_for_worker_in_state(
    fly: &FlyCli,
    poller: &ConvergencePoller,
    states: &[&str],
) -> HarnessResult<String> {
    let operation = format!("worker in state {}", states.join("|"));
    poller
        .poll_until(&operation, || async move {
            let rows = fly.table(&["workers"]).await?;
            Ok(exclusive_worker_in_state(&rows, states))
        })
        .await
}

/// Waits for the single running worker.
///
/// # Errors
///
/// See [`wait_for_worker_in_state`].
pub async fn wait_for_running_worker(
    fly: &FlyCli,
    poller: &ConvergencePoller,
) -> HarnessResult<String> {
    wait_for_worker_in_state(fly, poller, &[RUNNING]).await
}

/// Waits for the single landing or landed worker.
///
/// # Errors
///
/// See [`wait_for_worker_in_state`].
pub async fn wait_for_landing_or_landed_worker(
    fly: &FlyCli,
    poller: &ConvergencePoller,
) -> HarnessResult<String> {
    wait_for_worker_in_state(fly, poller, &["landing", "landed"]).await
}

/// Waits for the single stalled worker.
///
/// # Errors
///
/// See [`wait_for_worker_in_state`].
pub async fn wait_for_stalled_worker(
    fly: &FlyCli,
    poller: &ConvergencePoller,
) -> HarnessResult<String> {
    wait_for_worker_in_state(fly, poller, &["stalled"]).await
}

/// Waits until every listed worker is running.
///
/// # Errors
///
/// Returns [`crate::HarnessError::Timeout`] naming the lagging workers.
pub async fn wait_for_workers_to_be_running(
    fly: &FlyCli,
    poller: &ConvergencePoller,
) -> HarnessResult<()> {
    poller
        .poll_until("all workers running", || async move {
            let rows = fly.table(&["workers"]).await?;
            Ok(all_running(&rows))
        })
        .await
}

/// Waits until exactly `count` workers are listed.
///
/// # Errors
///
/// Returns [`crate::HarnessError::Timeout`] with the last observed count.
pub async fn wait_for_worker_count(
    fly: &FlyCli,
    poller: &ConvergencePoller,
    count: usize,
) -> HarnessResult<()> {
    poller
        .poll_until(&format!("{count} workers"), || async move {
            let rows = fly.table(&["workers"]).await?;
            Ok(if rows.len() == count {
                PollOutcome::Satisfied(())
            } else {
                PollOutcome::pending(format!("{} workers", rows.len()))
            })
        })
        .await
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Returns handles of containers whose `column` equals `value`.
///
/// # Errors
///
/// Propagates CLI and table errors.
pub async fn containers_by(fly: &FlyCli, column: &str, value: &str) -> HarnessResult<Vec<String>> {
    let rows = fly.table(&["containers"]).await?;
    Ok(select(&rows, column, value, "handle"))
}

/// Returns names of workers whose `column` equals `value`.
///
/// # Errors
///
/// Propagates CLI and table errors.
pub async fn workers_by(fly: &FlyCli, column: &str, value: &str) -> HarnessResult<Vec<String>> {
    let rows = fly.table(&["workers"]).await?;
    Ok(select(&rows, column, value, "name"))
}

/// Returns handles of resource volumes belonging to resource `name`.
///
/// # Errors
///
/// Propagates CLI and table errors.
pub async fn volumes_by_resource_type(fly: &FlyCli, name: &str) -> HarnessResult<Vec<String>> {
    let rows = fly.table(&["volumes", "-d"]).await?;
    let prefix = format!("name:{name}");
    Ok(rows
        .iter()
        .filter(|row| row.get("type").map(String::as_str) == Some("resource"))
        .filter(|row| row.get("identifier").is_some_and(|id| id.starts_with(&prefix)))
        .filter_map(|row| row.get("handle").cloned())
        .collect())
}

/// Returns the distinct workers hosting containers, per the live API.
///
/// # Errors
///
/// Propagates API errors.
pub async fn workers_with_containers(client: &AuthenticatedClient) -> HarnessResult<Vec<String>> {
    let containers = client.list_containers(MAIN_TEAM).await?;
    let names: BTreeSet<String> =
        containers.into_iter().map(|container| container.worker_name).collect();
    Ok(names.into_iter().collect())
}
