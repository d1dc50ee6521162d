// crates/topgun-harness/src/poll.rs
// ============================================================================
// Module: Convergence Poller
// Description: Predicate polling with timeout and fail-fast semantics.
// Purpose: Wait on eventually-consistent state without masking violations.
// Dependencies: tokio, tracing
// ============================================================================

//! ## Overview
//! A predicate answers each evaluation with a [`PollOutcome`]:
//! - [`PollOutcome::Pending`] keeps polling and records what was seen.
//! - [`PollOutcome::Satisfied`] returns the value at once.
//! - [`PollOutcome::Violation`] aborts at once with an assertion violation.
//!
//! The first evaluation happens immediately. A deadline that passes without
//! satisfaction yields [`HarnessError::Timeout`] carrying the last observation;
//! no partial value escapes. Predicate errors propagate unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::error::HarnessResult;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Default convergence deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default evaluation cadence.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Not converged yet; carries the observed state for diagnostics.
    Pending(String),
    /// Converged with a value.
    Satisfied(T),
    /// An invariant is already contradicted; carries the description.
    Violation(String),
}

impl<T> PollOutcome<T> {
    /// Builds a pending outcome from any displayable observation.
    pub fn pending(observed: impl Into<String>) -> Self {
        Self::Pending(observed.into())
    }

    /// Builds a violation from any displayable description.
    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation(message.into())
    }
}

/// Timeout and cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Deadline measured from the first evaluation.
    pub timeout: Duration,
    /// Pause between evaluations.
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
        }
    }

    /// Returns this policy with a different timeout.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self
        }
    }
}

// ============================================================================
// SECTION: Poller
// ============================================================================

/// Polls predicates under a default policy.
#[derive(Debug, Clone, Default)]
pub struct ConvergencePoller {
    policy: PollPolicy,
    minimum_timeout: Option<Duration>,
}

impl ConvergencePoller {
    /// Creates a poller with the given default policy.
    #[must_use]
    pub const fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            minimum_timeout: None,
        }
    }

    /// Creates a poller honoring the configured timeout floor.
    #[must_use]
    pub const fn from_config(config: &HarnessConfig) -> Self {
        Self {
            policy: PollPolicy::new(DEFAULT_TIMEOUT, DEFAULT_INTERVAL),
            minimum_timeout: config.timeout_override,
        }
    }

    /// Returns the default policy.
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Polls under the default policy.
    ///
    /// # Errors
    ///
    /// See [`poll_until`].
    pub async fn poll_until<T, F, Fut>(&self, operation: &str, predicate: F) -> HarnessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<PollOutcome<T>>>,
    {
        self.poll_with(operation, self.policy, predicate).await
    }

    /// Polls under an explicit policy; the configured floor still applies.
    ///
    /// # Errors
    ///
    /// See [`poll_until`].
    pub async fn poll_with<T, F, Fut>(
        &self,
        operation: &str,
        policy: PollPolicy,
        predicate: F,
    ) -> HarnessResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<PollOutcome<T>>>,
    {
        poll_until(operation, self.effective(policy), predicate).await
    }

    /// Requires `check` to stay satisfied for the whole of `duration`.
    ///
    /// # Errors
    ///
    /// See [`hold_for`].
    pub async fn hold_for<F, Fut>(
        &self,
        operation: &str,
        duration: Duration,
        interval: Duration,
        check: F,
    ) -> HarnessResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<PollOutcome<()>>>,
    {
        hold_for(operation, PollPolicy::new(duration, interval), check).await
    }

    fn effective(&self, policy: PollPolicy) -> PollPolicy {
        match self.minimum_timeout {
            Some(minimum) => policy.with_timeout(policy.timeout.max(minimum)),
            None => policy,
        }
    }
}

// ============================================================================
// SECTION: Primitives
// ============================================================================

/// Evaluates `predicate` on `policy.interval` until it is satisfied, reports a
/// violation, or `policy.timeout` elapses.
///
/// # Errors
///
/// - [`HarnessError::AssertionViolation`] on [`PollOutcome::Violation`].
/// - [`HarnessError::Timeout`] with the last pending observation.
/// - Any error returned by `predicate`.
pub async fn poll_until<T, F, Fut>(
    operation: &str,
    policy: PollPolicy,
    mut predicate: F,
) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<PollOutcome<T>>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        let observed = match predicate().await? {
            PollOutcome::Satisfied(value) => {
                tracing::debug!(operation, attempts, elapsed = ?started.elapsed(), "converged");
                return Ok(value);
            }
            PollOutcome::Violation(message) => {
                return Err(HarnessError::violation(format!("{operation}: {message}")));
            }
            PollOutcome::Pending(observed) => observed,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(HarnessError::Timeout {
                operation: operation.to_string(),
                waited: now.duration_since(started),
                last_observed: observed,
            });
        }
        tracing::trace!(operation, attempts, %observed, "not converged");
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}

/// Evaluates `check` on `policy.interval` for `policy.timeout`, failing on the
/// first evaluation that is not satisfied.
///
/// # Errors
///
/// - [`HarnessError::AssertionViolation`] when any evaluation is pending or a
///   violation.
/// - Any error returned by `check`.
pub async fn hold_for<F, Fut>(
    operation: &str,
    policy: PollPolicy,
    mut check: F,
) -> HarnessResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<PollOutcome<()>>>,
{
    let started = Instant::now();
    let until = started + policy.timeout;
    loop {
        match check().await? {
            PollOutcome::Satisfied(()) => {}
            PollOutcome::Pending(observed) | PollOutcome::Violation(observed) => {
                return Err(HarnessError::violation(format!(
                    "{operation} stopped holding after {:.1}s: {observed}",
                    started.elapsed().as_secs_f64()
                )));
            }
        }
        let now = Instant::now();
        if now >= until {
            return Ok(());
        }
        tokio::time::sleep(policy.interval.min(until - now)).await;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
