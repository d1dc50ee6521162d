// crates/topgun-harness/src/session/mod.rs
// ============================================================================
// Module: Sessions
// Description: Lifecycle of spawned external processes.
// Purpose: Launch, observe, signal, and await subprocesses without blocking.
// Dependencies: tokio, tracing, nix (unix)
// ============================================================================

//! ## Overview
//! [`SessionManager::spawn`] launches a process and hands back a [`Session`].
//! The child is owned by a background task that streams its output into
//! [`OutputBuffer`]s (and into `tracing` under the session target), delivers
//! signals, and publishes the exit exactly once.
//!
//! Invariants:
//! - The exit outcome is published once and never changes afterwards.
//! - Timeouts abort the waiting caller only; the process keeps running until
//!   it is signalled.
//! - Sessions are never reaped implicitly. Dropping every handle leaves the
//!   process running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsStr;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::error::HarnessResult;
use crate::logging::SESSION_TARGET;

mod output;

pub use output::OutputBuffer;
pub use output::OutputCursor;

/// Time allowed for output readers to drain after the process exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Read size for output pipes.
const READ_CHUNK: usize = 8 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signals a session can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// Polite interrupt (`SIGINT`).
    Interrupt,
    /// Termination request (`SIGTERM`).
    Terminate,
    /// Forced kill (`SIGKILL`).
    Kill,
}

impl SessionSignal {
    /// Returns a stable label for the signal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminate",
            Self::Kill => "kill",
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// Returns true for a zero exit code.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Handle to one spawned process. Cheap to clone; clones observe the same
/// process.
#[derive(Clone)]
pub struct Session {
    id: u64,
    command: Arc<str>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    exit: watch::Receiver<Option<ExitOutcome>>,
    control: mpsc::UnboundedSender<SessionSignal>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("exit", &*self.exit.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Returns the manager-assigned session id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the rendered command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the live stdout buffer.
    #[must_use]
    pub const fn stdout(&self) -> &OutputBuffer {
        &self.stdout
    }

    /// Returns the live stderr buffer.
    #[must_use]
    pub const fn stderr(&self) -> &OutputBuffer {
        &self.stderr
    }

    /// Returns true once the exit notification has fired.
    #[must_use]
    pub fn is_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Returns the exit outcome, or `None` while the process is running.
    #[must_use]
    pub fn outcome(&self) -> Option<ExitOutcome> {
        *self.exit.borrow()
    }

    /// Returns the exit code once exited; `None` while running or when the
    /// process died to a signal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.outcome().and_then(|outcome| outcome.code)
    }

    /// Waits for the exit notification.
    pub async fn exited(&self) -> ExitOutcome {
        let killed = ExitOutcome {
            code: None,
        };
        let mut exit = self.exit.clone();
        // A supervisor that vanished without publishing counts as killed.
        exit.wait_for(Option::is_some).await.map_or(killed, |seen| (*seen).unwrap_or(killed))
    }

    /// Waits for exit for at most `timeout`. The process is left untouched
    /// when the wait times out.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Timeout`] carrying the output tail.
    pub async fn wait_timeout(&self, timeout: Duration) -> HarnessResult<ExitOutcome> {
        let started = Instant::now();
        tokio::time::timeout(timeout, self.exited()).await.map_err(|_| HarnessError::Timeout {
            operation: format!("`{}` to exit", self.command),
            waited: started.elapsed(),
            last_observed: self.stdout.tail(),
        })
    }

    /// Requests delivery of `signal` without waiting. Signalling an exited
    /// session is a no-op.
    pub fn signal(&self, signal: SessionSignal) {
        if self.control.send(signal).is_err() {
            tracing::debug!(session = self.id, signal = signal.as_str(), "session already exited");
        }
    }

    /// Writes `line` plus a newline to the process's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when the session was not spawned
    /// interactively or the pipe is closed.
    pub async fn write_line(&self, line: &str) -> HarnessResult<()> {
        let Some(stdin) = &self.stdin else {
            return Err(HarnessError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("session {} has no stdin", self.id),
            )));
        };
        let mut stdin = stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    fn process_failure(&self, expected: &[i32], outcome: ExitOutcome) -> HarnessError {
        HarnessError::ExternalProcess {
            command: self.command.to_string(),
            expected: expected.to_vec(),
            code: outcome.code,
            stdout: self.stdout.text(),
            stderr: self.stderr.text(),
        }
    }
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Spawns sessions and enforces exit-code expectations.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    next_id: Arc<AtomicU64>,
}

impl SessionManager {
    /// Creates a manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches `program` with `args`; stdin is closed.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the process cannot be started.
    pub fn spawn<I, S>(&self, program: impl AsRef<OsStr>, args: I) -> HarnessResult<Session>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.launch(program.as_ref(), args, false)
    }

    /// Launches `program` with a writable stdin for interactive sessions.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] when the process cannot be started.
    pub fn spawn_interactive<I, S>(
        &self,
        program: impl AsRef<OsStr>,
        args: I,
    ) -> HarnessResult<Session>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.launch(program.as_ref(), args, true)
    }

    /// Waits for exit and requires exit code zero.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] with captured output when the
    /// process exits non-zero or is killed.
    pub async fn wait(&self, session: &Session) -> HarnessResult<ExitOutcome> {
        self.wait_for_codes(session, &[0]).await
    }

    /// Waits for exit and requires one of `codes`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExternalProcess`] with captured output when the
    /// exit code is not in `codes`.
    pub async fn wait_for_codes(
        &self,
        session: &Session,
        codes: &[i32],
    ) -> HarnessResult<ExitOutcome> {
        let outcome = session.exited().await;
        match outcome.code {
            Some(code) if codes.contains(&code) => Ok(outcome),
            _ => Err(session.process_failure(codes, outcome)),
        }
    }

    /// Requests termination without waiting.
    pub fn signal(&self, session: &Session, signal: SessionSignal) {
        session.signal(signal);
    }

    /// Signals a session and waits for it to go away.
    pub async fn terminate(&self, session: &Session, signal: SessionSignal) -> ExitOutcome {
        session.signal(signal);
        session.exited().await
    }

    /// Spawns and waits for exit code zero, returning the finished session.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] or [`HarnessError::ExternalProcess`].
    pub async fn run<I, S>(&self, program: impl AsRef<OsStr>, args: I) -> HarnessResult<Session>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let session = self.spawn(program, args)?;
        self.wait(&session).await?;
        Ok(session)
    }

    fn launch<I, S>(&self, program: &OsStr, args: I, interactive: bool) -> HarnessResult<Session>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let rendered = render_command(program, &args);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if interactive { Stdio::piped() } else { Stdio::null() });
        #[cfg(unix)]
        command.process_group(0);

        tracing::info!(session = id, "running: {rendered}");
        let mut child = command.spawn().map_err(|source| HarnessError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let readers = [
            child.stdout.take().map(|pipe| pump(id, "stdout", pipe, stdout.clone())),
            child.stderr.take().map(|pipe| pump(id, "stderr", pipe, stderr.clone())),
        ];
        let stdin = child.stdin.take().map(|pipe| Arc::new(Mutex::new(pipe)));

        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(supervise(id, child, control_rx, exit_tx, readers));

        Ok(Session {
            id,
            command: Arc::from(rendered),
            stdout,
            stderr,
            exit: exit_rx,
            control: control_tx,
            stdin,
        })
    }
}

// ============================================================================
// SECTION: Supervisor
// ============================================================================

async fn supervise(
    id: u64,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<SessionSignal>,
    exit: watch::Sender<Option<ExitOutcome>>,
    readers: [Option<JoinHandle<()>>; 2],
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = control.recv() => deliver(id, &mut child, signal),
        }
    };
    let outcome = match status {
        Ok(status) => ExitOutcome {
            code: status.code(),
        },
        Err(err) => {
            tracing::warn!(session = id, error = %err, "failed to reap session");
            ExitOutcome {
                code: None,
            }
        }
    };

    // Grandchildren may hold the pipes open; bound the drain.
    for reader in readers.into_iter().flatten() {
        if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
            tracing::debug!(session = id, "output reader still open after exit");
        }
    }

    tracing::debug!(session = id, %outcome, "session exited");
    exit.send_replace(Some(outcome));
}

#[cfg(unix)]
fn deliver(id: u64, child: &mut Child, signal: SessionSignal) {
    use nix::sys::signal::Signal;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    let native = match signal {
        SessionSignal::Interrupt => Signal::SIGINT,
        SessionSignal::Terminate => Signal::SIGTERM,
        SessionSignal::Kill => Signal::SIGKILL,
    };
    tracing::debug!(session = id, signal = signal.as_str(), "signalling session");
    if let Err(err) = killpg(Pid::from_raw(pid), native) {
        tracing::warn!(session = id, error = %err, "failed to signal session");
    }
}

#[cfg(not(unix))]
fn deliver(id: u64, child: &mut Child, signal: SessionSignal) {
    tracing::debug!(session = id, signal = signal.as_str(), "killing session");
    if let Err(err) = child.start_kill() {
        tracing::warn!(session = id, error = %err, "failed to kill session");
    }
}

/// Copies a pipe into `buffer`, emitting each complete line as a trace event.
fn pump<R>(id: u64, stream: &'static str, mut pipe: R, buffer: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0_u8; READ_CHUNK];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let read = match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    tracing::debug!(session = id, stream, error = %err, "output pipe failed");
                    break;
                }
            };
            let bytes = &chunk[.. read];
            buffer.append(bytes);
            pending.extend_from_slice(bytes);
            while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = pending.drain(..= newline).collect();
                emit_line(id, stream, &line);
            }
        }
        if !pending.is_empty() {
            emit_line(id, stream, &pending);
        }
    })
}

fn emit_line(id: u64, stream: &'static str, line: &[u8]) {
    let text = String::from_utf8_lossy(line);
    tracing::debug!(target: SESSION_TARGET, session = id, stream, "{}", text.trim_end());
}

fn render_command<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    let mut rendered = program.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}
