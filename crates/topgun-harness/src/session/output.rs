// crates/topgun-harness/src/session/output.rs
// ============================================================================
// Module: Session Output
// Description: Concurrently-readable output buffers and forward cursors.
// Purpose: Let callers inspect subprocess output while it is still running.
// Dependencies: regex, tokio
// ============================================================================

//! ## Overview
//! An [`OutputBuffer`] is appended to by the session's reader task and read by
//! any number of callers. An [`OutputCursor`] walks the buffer forward: each
//! successful [`OutputCursor::say`] consumes everything up to the end of the
//! match, so repeated expectations must appear in order.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use regex::bytes::Regex;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::error::HarnessResult;

/// Cadence at which cursors re-check a growing buffer.
const CURSOR_POLL: Duration = Duration::from_millis(25);

/// Bytes of output quoted in timeout diagnostics.
const TAIL_BYTES: usize = 2048;

// ============================================================================
// SECTION: Output Buffer
// ============================================================================

/// Append-only byte buffer shared between a reader task and observers.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    /// Returns a copy of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Returns the contents as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Returns true when the output contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        let guard = self.lock();
        let needle = needle.as_bytes();
        needle.is_empty() || guard.windows(needle.len()).any(|window| window == needle)
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the last few kilobytes as text.
    #[must_use]
    pub fn tail(&self) -> String {
        let guard = self.lock();
        let start = guard.len().saturating_sub(TAIL_BYTES);
        String::from_utf8_lossy(&guard[start ..]).into_owned()
    }

    /// Returns a cursor positioned at the start of the buffer.
    #[must_use]
    pub fn cursor(&self) -> OutputCursor {
        OutputCursor {
            buffer: self.clone(),
            position: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Cursor
// ============================================================================

/// Forward-only matcher over an [`OutputBuffer`].
#[derive(Debug, Clone)]
pub struct OutputCursor {
    buffer: OutputBuffer,
    position: usize,
}

impl OutputCursor {
    /// Looks for `pattern` in the unread output.
    ///
    /// On a match the cursor moves past it and the capture groups are
    /// returned (group 0 first); unmatched optional groups are empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Parse`] when `pattern` is not a valid regex.
    pub fn say(&mut self, pattern: &str) -> HarnessResult<Option<Vec<String>>> {
        let regex = compile(pattern)?;
        Ok(self.say_regex(&regex))
    }

    /// Waits until `pattern` appears in the unread output.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] with the output tail when the pattern
    /// does not appear within `timeout`, or [`HarnessError::Parse`] for an
    /// invalid pattern.
    pub async fn expect(&mut self, pattern: &str, timeout: Duration) -> HarnessResult<Vec<String>> {
        let regex = compile(pattern)?;
        let started = Instant::now();
        loop {
            if let Some(captures) = self.say_regex(&regex) {
                return Ok(captures);
            }
            if started.elapsed() >= timeout {
                return Err(HarnessError::Timeout {
                    operation: format!("output matching /{pattern}/"),
                    waited: started.elapsed(),
                    last_observed: self.buffer.tail(),
                });
            }
            tokio::time::sleep(CURSOR_POLL).await;
        }
    }

    /// Returns the byte offset of the next unread byte.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    fn say_regex(&mut self, regex: &Regex) -> Option<Vec<String>> {
        let (end, groups) = {
            let guard = self.buffer.lock();
            let unread = guard.get(self.position ..)?;
            let captures = regex.captures(unread)?;
            let end = captures.get(0).map_or(0, |whole| whole.end());
            let groups: Vec<String> = captures
                .iter()
                .map(|group| {
                    group.map_or_else(String::new, |m| {
                        String::from_utf8_lossy(m.as_bytes()).into_owned()
                    })
                })
                .collect();
            (end, groups)
        };
        self.position += end;
        Some(groups)
    }
}

fn compile(pattern: &str) -> HarnessResult<Regex> {
    Regex::new(pattern)
        .map_err(|err| HarnessError::Parse(format!("invalid pattern /{pattern}/: {err}")))
}
