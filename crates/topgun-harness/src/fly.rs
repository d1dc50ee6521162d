// crates/topgun-harness/src/fly.rs
// ============================================================================
// Module: Fly CLI
// Description: Wrapper around the deployed system's command-line client.
// Purpose: Run targeted CLI commands and parse their tabular output.
// Dependencies: regex, tokio
// ============================================================================

//! ## Overview
//! Every invocation is `<binary> [--verbose] -t <target> <subcommand> ...`
//! and goes through the [`SessionManager`], so stdout, stderr, and the exit
//! code are always captured. Interactive invocations (hijack) omit
//! `--verbose` and are returned live; the caller owns their shutdown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use regex::Regex;

use crate::error::HarnessError;
use crate::error::HarnessResult;
use crate::poll::PollOutcome;
use crate::poll::PollPolicy;
use crate::poll::poll_until;
use crate::session::Session;
use crate::session::SessionManager;
use crate::session::SessionSignal;

/// One table row keyed by column header. Empty cells are absent.
pub type TableRow = HashMap<String, String>;

/// Pattern announcing a selectable task container in hijack prompts.
const TASK_CHOICE: &str = r"([0-9]+): .+ type: task";

/// Separator between table columns.
const COLUMN_GAP: &str = r"\s{2,}";

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Client CLI bound to one target.
#[derive(Debug, Clone)]
pub struct FlyCli {
    binary: PathBuf,
    target: String,
    sessions: SessionManager,
}

impl FlyCli {
    /// Creates a wrapper running `binary` against `target`.
    pub fn new(
        binary: impl Into<PathBuf>,
        target: impl Into<String>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            binary: binary.into(),
            target: target.into(),
            sessions,
        }
    }

    /// Returns the CLI binary.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Returns the target name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Spawns `fly --verbose -t <target> <args>` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the binary cannot be started.
    pub fn spawn<S: AsRef<str>>(&self, args: &[S]) -> HarnessResult<Session> {
        self.sessions.spawn(&self.binary, self.argv(true, args))
    }

    /// Spawns `fly -t <target> <args>` with a writable stdin.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the binary cannot be started.
    pub fn spawn_interactive<S: AsRef<str>>(&self, args: &[S]) -> HarnessResult<Session> {
        self.sessions.spawn_interactive(&self.binary, self.argv(false, args))
    }

    /// Runs a command and requires exit code zero.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] with captured output on a
    /// non-zero exit.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> HarnessResult<Session> {
        let session = self.spawn(args)?;
        self.sessions.wait(&session).await?;
        Ok(session)
    }

    /// Logs the target in against `url`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] when login fails.
    pub async fn login(&self, url: &str, username: &str, password: &str) -> HarnessResult<()> {
        self.run(&["login", "-c", url, "-u", username, "-p", password]).await?;
        Ok(())
    }

    /// Runs a listing command with table headers and parses the result.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] on a non-zero exit and
    /// [`HarnessError::AssertionViolation`] when a row does not line up with
    /// the header.
    pub async fn table<S: AsRef<str>>(&self, args: &[S]) -> HarnessResult<Vec<TableRow>> {
        let mut full: Vec<&str> = vec!["--print-table-headers"];
        full.extend(args.iter().map(AsRef::as_ref));
        let session = self.run(&full).await?;
        parse_table(&session.stdout().text())
    }

    /// Hijacks into a task container, answering the container prompt with the
    /// first task choice. The returned session is live and must be signalled
    /// by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] when hijack exits non-zero
    /// before a task is chosen and [`HarnessError::Timeout`] when no prompt
    /// appears within `policy`. On any error the session has already been
    /// killed and reaped.
    pub async fn hijack_task<S: AsRef<str>>(
        &self,
        args: &[S],
        policy: PollPolicy,
    ) -> HarnessResult<Session> {
        let mut full: Vec<&str> = vec!["hijack"];
        full.extend(args.iter().map(AsRef::as_ref));
        let session = self.spawn_interactive(&full)?;
        match answer_task_prompt(&session, policy).await {
            Ok(()) => Ok(session),
            Err(err) => {
                tracing::warn!(
                    session = session.id(),
                    error = %err,
                    "hijack failed; killing session"
                );
                self.sessions.terminate(&session, SessionSignal::Kill).await;
                Err(err)
            }
        }
    }

    fn argv<S: AsRef<str>>(&self, verbose: bool, args: &[S]) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(args.len() + 3);
        if verbose {
            argv.push("--verbose".into());
        }
        argv.push("-t".into());
        argv.push(self.target.as_str().into());
        argv.extend(args.iter().map(|arg| OsString::from(arg.as_ref())));
        argv
    }
}

/// Waits for the container prompt and answers it with the first task choice.
async fn answer_task_prompt(session: &Session, policy: PollPolicy) -> HarnessResult<()> {
    let choice = Regex::new(TASK_CHOICE)
        .map_err(|err| HarnessError::Parse(format!("task choice pattern: {err}")))?;
    let answer = poll_until("hijack task prompt", policy, || {
        let choice = &choice;
        async move {
            let output = session.stdout().text();
            if output.contains("type: task") {
                let number = choice
                    .captures(&output)
                    .and_then(|captures| captures.get(1))
                    .map(|number| number.as_str().to_string());
                return Ok(PollOutcome::Satisfied(number));
            }
            match session.outcome() {
                Some(outcome) if outcome.success() => Ok(PollOutcome::Satisfied(None)),
                Some(outcome) => Err(HarnessError::ExternalProcess {
                    command: session.command().to_string(),
                    expected: vec![0],
                    code: outcome.code,
                    stdout: output,
                    stderr: session.stderr().text(),
                }),
                None => Ok(PollOutcome::pending(session.stdout().tail())),
            }
        }
    })
    .await?;

    if let Some(number) = answer {
        tracing::info!(choice = %number, "choosing task container");
        session.write_line(&number).await?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Table Parsing
// ============================================================================

/// Parses `--print-table-headers` output. The first line is the header;
/// blank lines are skipped.
///
/// # Errors
///
/// Returns [`HarnessError::AssertionViolation`] when a row has a different
/// number of columns than the header.
pub fn parse_table(output: &str) -> HarnessResult<Vec<TableRow>> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let gap = column_gap()?;
    let headers = split_columns(&gap, header);
    let mut rows = Vec::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let columns = split_columns(&gap, line);
        if columns.len() != headers.len() {
            return Err(HarnessError::violation(format!(
                "table row has {} columns, header has {}: `{line}`",
                columns.len(),
                headers.len()
            )));
        }
        let row: TableRow = headers
            .iter()
            .zip(columns)
            .filter(|(header, column)| !header.is_empty() && !column.is_empty())
            .map(|(header, column)| ((*header).to_string(), column.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Splits a trimmed row on runs of two or more whitespace characters.
fn split_columns<'a>(gap: &Regex, row: &'a str) -> Vec<&'a str> {
    gap.split(row.trim()).collect()
}

fn column_gap() -> HarnessResult<Regex> {
    Regex::new(COLUMN_GAP)
        .map_err(|err| HarnessError::Parse(format!("column gap pattern: {err}")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
