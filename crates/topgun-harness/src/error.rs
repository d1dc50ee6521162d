// crates/topgun-harness/src/error.rs
// ============================================================================
// Module: Harness Errors
// Description: Error taxonomy shared by every harness component.
// Purpose: Classify scenario-aborting failures and carry diagnostics.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every harness operation returns [`HarnessError`]. Variants map onto the
//! four scenario-aborting classes (setup, assertion, timeout, external
//! process) plus the transport-level causes they are built from.
//! Invariants:
//! - Errors raised after a subprocess ran carry its captured output.
//! - Timeouts carry the last observed state, never a partial success value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Stable classification label for [`HarnessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Deploy tool, endpoint, or data store unreachable during setup.
    Setup,
    /// Observed state contradicts a stated invariant.
    Assertion,
    /// A convergence predicate never held within its window.
    Timeout,
    /// A driven subprocess exited with a disallowed code.
    ExternalProcess,
    /// Token exchange was rejected or unreachable.
    Authentication,
    /// Everything else: spawn, remote status, cleanup, I/O, HTTP, data store,
    /// config, parse.
    Infrastructure,
}

impl ErrorKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Assertion => "assertion",
            Self::Timeout => "timeout",
            Self::ExternalProcess => "external_process",
            Self::Authentication => "authentication",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Harness Error
// ============================================================================

/// Errors returned by harness components.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A deployment setup step failed; the scenario cannot start.
    #[error("setup failed at {stage}: {message}")]
    Setup {
        /// Deploy step that failed.
        stage: &'static str,
        /// Failure detail, including any wrapped cause.
        message: String,
    },
    /// Observed state contradicts an invariant.
    #[error("assertion violated: {message}")]
    AssertionViolation {
        /// Description of the contradiction.
        message: String,
    },
    /// A convergence wait exceeded its deadline.
    #[error(
        "timed out after {:.1}s waiting for {operation}; last observed: {last_observed}",
        .waited.as_secs_f64()
    )]
    Timeout {
        /// Operation that was being waited on.
        operation: String,
        /// Time spent waiting.
        waited: Duration,
        /// Last observation reported by the predicate.
        last_observed: String,
    },
    /// A subprocess exited with a code outside the allowed set.
    #[error(
        "command `{command}` exited with {exit} (expected {allowed})\nstdout:\n{stdout}\nstderr:\n{stderr}",
        exit = display_code(.code),
        allowed = display_codes(.expected)
    )]
    ExternalProcess {
        /// Rendered command line.
        command: String,
        /// Allowed exit codes.
        expected: Vec<i32>,
        /// Observed exit code; `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },
    /// Token exchange failed.
    #[error("authentication failed{}: {message}", display_status(.status))]
    Authentication {
        /// HTTP status when the server answered.
        status: Option<u16>,
        /// Response body or network cause.
        message: String,
    },
    /// A process could not be launched.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A remote service answered with an unexpected status.
    #[error("{endpoint} answered HTTP {status}: {message}")]
    Remote {
        /// Request target.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
    /// Teardown could not remove some resources of one kind.
    #[error("failed to destroy {} {resource}: {}", .failures.len(), .failures.join("; "))]
    Cleanup {
        /// Kind of resource being removed.
        resource: &'static str,
        /// One entry per resource that survived.
        failures: Vec<String>,
    },
    /// Local filesystem or pipe failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP transport failure outside token exchange.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Data store failure.
    #[error("datastore error: {0}")]
    Datastore(#[from] sqlx::Error),
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Unparseable tool or API output.
    #[error("parse error: {0}")]
    Parse(String),
}

impl HarnessError {
    /// Builds a setup failure for the given stage.
    pub fn setup(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Setup {
            stage,
            message: message.into(),
        }
    }

    /// Builds an assertion violation.
    pub fn violation(message: impl Into<String>) -> Self {
        Self::AssertionViolation {
            message: message.into(),
        }
    }

    /// Wraps any error as a setup failure, keeping its rendering.
    #[must_use]
    pub fn into_setup(self, stage: &'static str) -> Self {
        match self {
            Self::Setup {
                ..
            } => self,
            other => Self::setup(stage, other.to_string()),
        }
    }

    /// Returns the stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Setup {
                ..
            } => ErrorKind::Setup,
            Self::AssertionViolation {
                ..
            } => ErrorKind::Assertion,
            Self::Timeout {
                ..
            } => ErrorKind::Timeout,
            Self::ExternalProcess {
                ..
            } => ErrorKind::ExternalProcess,
            Self::Authentication {
                ..
            } => ErrorKind::Authentication,
            Self::Spawn {
                ..
            }
            | Self::Remote {
                ..
            }
            | Self::Cleanup {
                ..
            }
            | Self::Io(_)
            | Self::Http(_)
            | Self::Datastore(_)
            | Self::Config(_)
            | Self::Parse(_) => ErrorKind::Infrastructure,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

fn display_codes(codes: &[i32]) -> String {
    codes.iter().map(i32::to_string).collect::<Vec<_>>().join(", ")
}

fn display_status(status: &Option<u16>) -> String {
    status.map(|status| format!(" (HTTP {status})")).unwrap_or_default()
}

/// Convenience alias for harness results.
pub type HarnessResult<T> = Result<T, HarnessError>;
