// crates/topgun-harness/src/fly/tests.rs
// ============================================================================
// Module: Fly CLI Tests
// Description: Unit tests for table parsing and CLI invocation shape.
// Purpose: Pin column splitting and the hijack prompt exchange.
// Dependencies: tempfile, tokio
// ============================================================================

//! ## Overview
//! Table parsing is pure. Invocation tests point the wrapper at a small shell
//! script standing in for the CLI.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::column_gap;
use super::parse_table;
use super::split_columns;
use crate::error::ErrorKind;

const WORKERS: &str = "\
name                 containers  platform  tags  team  state    version  age
worker-0a1b          3           linux     none  none  running  2.3      1h2m
worker-9f8e          0           linux     none  none  landing  2.3      5m

";

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn columns_split_on_runs_of_whitespace_only() {
    let gap = column_gap().unwrap();
    assert_eq!(split_columns(&gap, "  a b   c  d "), vec!["a b", "c", "d"]);
    assert_eq!(split_columns(&gap, "single"), vec!["single"]);
    assert_eq!(split_columns(&gap, "tab\t\tseparated"), vec!["tab", "separated"]);
}

#[test]
fn table_rows_are_keyed_by_header() {
    let rows = parse_table(WORKERS).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "worker-0a1b");
    assert_eq!(rows[0]["state"], "running");
    assert_eq!(rows[1]["state"], "landing");
    assert_eq!(rows[1]["containers"], "0");
}

#[test]
fn misaligned_rows_are_violations() {
    let err = parse_table("handle  worker  type\nabc  w1\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Assertion);
}

#[test]
fn empty_output_is_an_empty_table() {
    assert!(parse_table("").unwrap().is_empty());
    assert!(parse_table("name  state\n").unwrap().is_empty());
}

// ============================================================================
// SECTION: Invocation
// ============================================================================

#[cfg(unix)]
mod invocation {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::super::FlyCli;
    use crate::error::ErrorKind;
    use crate::poll::PollPolicy;
    use crate::session::SessionManager;
    use crate::session::SessionSignal;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fly");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn table_passes_verbose_target_and_headers() {
        let dir = TempDir::new().unwrap();
        let fly = script(&dir, "echo 'name  args'\necho \"row  $*\"");
        let cli = FlyCli::new(fly, "concourse-topgun-4", SessionManager::new());
        let rows = cli.table(&["workers"]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "row");
        assert_eq!(
            rows[0]["args"],
            "--verbose -t concourse-topgun-4 --print-table-headers workers"
        );
    }

    #[tokio::test]
    async fn hijack_answers_with_the_task_choice() {
        let dir = TempDir::new().unwrap();
        let fly = script(
            &dir,
            "echo '1: build #1, step: get, type: get'\n\
             echo '2: build #1, step: unit, type: task'\n\
             printf 'choose a container: '\n\
             read choice\n\
             echo \"hijacked $choice\"\n\
             exec sleep 30",
        );
        let sessions = SessionManager::new();
        let cli = FlyCli::new(fly, "t", sessions.clone());
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_millis(20));
        let session = cli.hijack_task(&["-j", "pipeline/job"], policy).await.unwrap();
        let mut cursor = session.stdout().cursor();
        cursor.expect("hijacked 2", Duration::from_secs(5)).await.unwrap();
        assert!(!session.is_exited());
        sessions.terminate(&session, SessionSignal::Interrupt).await;
    }

    #[tokio::test]
    async fn hijack_without_prompt_succeeds_on_clean_exit() {
        let dir = TempDir::new().unwrap();
        let fly = script(&dir, "echo 'no choice needed'");
        let cli = FlyCli::new(fly, "t", SessionManager::new());
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_millis(20));
        let session = cli.hijack_task(&["-c", "pipeline/resource"], policy).await.unwrap();
        assert_eq!(session.exited().await.code, Some(0));
    }

    fn is_alive(pid: i32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }

    #[tokio::test]
    async fn hijack_kills_the_session_when_no_prompt_appears() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let fly = script(&dir, &format!("echo $$ > {}\nexec sleep 30", pid_file.display()));
        let cli = FlyCli::new(fly, "t", SessionManager::new());
        let policy = PollPolicy::new(Duration::from_millis(300), Duration::from_millis(20));

        let err = cli.hijack_task(&["-j", "pipeline/job"], policy).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert!(!is_alive(pid), "hijack process {pid} outlived the failed hijack");
    }
}
