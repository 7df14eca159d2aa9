// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent subprocess management: spawn, stream, terminate.
//!
//! stdout is decoded into typed events through [`JsonlDecoder`] on a
//! reader task; events buffer unboundedly for the task's lifetime so slow
//! consumers never drop any. stderr accumulates and is redacted on read.
//! Cancellation is cooperative-then-forceful: SIGTERM, then SIGKILL after
//! a grace interval.

use crate::jsonl::JsonlDecoder;
use cdx_core::{redact, ParsedEvent};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long a canceled process gets to exit on SIGTERM before SIGKILL.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Spawn request. The subprocess inherits the parent environment (so
/// externally set credentials propagate) with `env` laid on top.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Full argv; `argv[0]` is the executable.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("spawn config has an empty argv")]
    EmptyArgv,

    /// The OS error is surfaced unchanged (executable missing, permission
    /// denied, ...); callers redact it at the trust boundary.
    #[error("failed to spawn {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Final state of an exited subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        Self {
            exit_code: status.code(),
            signal: status.signal(),
        }
    }
}

/// A live (or finished) agent subprocess.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Child,
    events: Option<mpsc::UnboundedReceiver<ParsedEvent>>,
    stderr_buf: Arc<Mutex<String>>,
    invalid_lines: Arc<AtomicU64>,
    exit: Option<ExitStatus>,
}

/// Spawn an agent subprocess with piped stdio.
///
/// stdin is not connected; the agent gets its instruction via argv.
pub fn spawn(config: SpawnConfig) -> Result<ProcessHandle, SpawnError> {
    let (program, args) = config.argv.split_first().ok_or(SpawnError::EmptyArgv)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &config.env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|source| SpawnError::Io {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(program, ?pid, "agent subprocess spawned");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let invalid_lines = Arc::new(AtomicU64::new(0));
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_stdout(stdout, events_tx, Arc::clone(&invalid_lines)));
    }

    let stderr_buf = Arc::new(Mutex::new(String::new()));
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_stderr(stderr, Arc::clone(&stderr_buf)));
    }

    Ok(ProcessHandle {
        pid,
        child,
        events: Some(events_rx),
        stderr_buf,
        invalid_lines,
        exit: None,
    })
}

async fn pump_stdout(
    mut stdout: tokio::process::ChildStdout,
    events_tx: mpsc::UnboundedSender<ParsedEvent>,
    invalid_lines: Arc<AtomicU64>,
) {
    let mut decoder = JsonlDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for event in decoder.feed(&buf[..n]) {
                    if events_tx.send(event).is_err() {
                        return;
                    }
                }
                invalid_lines.store(decoder.invalid_lines(), Ordering::Relaxed);
            }
            Err(error) => {
                warn!(%error, "agent stdout read failed");
                break;
            }
        }
    }
    if let Some(event) = decoder.finish() {
        let _ = events_tx.send(event);
    }
    invalid_lines.store(decoder.invalid_lines(), Ordering::Relaxed);
    // Dropping the sender closes the stream for the consumer.
}

async fn pump_stderr(mut stderr: tokio::process::ChildStderr, buf: Arc<Mutex<String>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.lock().push_str(&String::from_utf8_lossy(&chunk[..n])),
            Err(_) => break,
        }
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the event stream. Yields events in source order and closes
    /// when the agent's stdout does.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ParsedEvent>> {
        self.events.take()
    }

    /// Accumulated stderr so far, redacted.
    pub fn stderr_redacted(&self) -> String {
        redact(&self.stderr_buf.lock()).into_owned()
    }

    /// Count of stdout lines the decoder skipped as invalid.
    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines.load(Ordering::Relaxed)
    }

    /// Wait for the subprocess to exit. Idempotent: the first observed
    /// status is cached.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = ExitStatus::from_std(self.child.wait().await?);
        self.exit = Some(status);
        Ok(status)
    }

    /// Cooperative-then-forceful termination: SIGTERM, and SIGKILL once
    /// `grace` elapses without an exit. Returns the final status.
    pub async fn cancel(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        if let Some(pid) = self.pid {
            // ESRCH just means the process already exited; wait below
            // picks up the real status.
            if let Err(errno) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, %errno, "SIGTERM delivery failed");
            }
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let exit = ExitStatus::from_std(status?);
                self.exit = Some(exit);
                Ok(exit)
            }
            Err(_) => {
                warn!(pid = ?self.pid, grace_ms = grace.as_millis() as u64, "grace expired, escalating to SIGKILL");
                self.child.start_kill()?;
                let exit = ExitStatus::from_std(self.child.wait().await?);
                self.exit = Some(exit);
                Ok(exit)
            }
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
