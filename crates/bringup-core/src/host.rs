use std::fmt;
use std::process::{ExitStatus, Stdio};

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::command::OutputMode;
use crate::plan::ExecuteProcess;
use crate::{BringupError, Result};

// ─── ExitOutcome ──────────────────────────────────────────────────────────

/// How a process terminated. The executor records it but never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExitOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

// ─── ProcessHost ──────────────────────────────────────────────────────────

/// The process layer the executor drives.
///
/// [`TokioHost`] runs real processes; tests substitute a scripted host.
pub trait ProcessHost {
    type Child: Send + 'static;

    fn spawn(&self, process: &ExecuteProcess) -> Result<Self::Child>;

    /// Resolves once the child has terminated. Must not borrow the host.
    fn wait(
        &self,
        process: &ExecuteProcess,
        child: Self::Child,
    ) -> BoxFuture<'static, Result<ExitOutcome>>;

    fn pid(&self, _child: &Self::Child) -> Option<u32> {
        None
    }
}

// ─── TokioHost ────────────────────────────────────────────────────────────

/// A child spawned by [`TokioHost`], plus the tasks draining its captured
/// streams (none in `Screen` mode).
#[derive(Debug)]
pub struct LaunchedChild {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

/// Spawns real child processes with `tokio::process`.
///
/// Children are killed if their wait future is dropped, so abandoning a run
/// leaves nothing behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl ProcessHost for TokioHost {
    type Child = LaunchedChild;

    fn spawn(&self, process: &ExecuteProcess) -> Result<LaunchedChild> {
        let spec = &process.command;
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match spec.output {
            OutputMode::Screen => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Log => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|source| BringupError::Spawn {
            name: process.name.clone(),
            source,
        })?;

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(process.name.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(process.name.clone(), "stderr", stderr));
        }

        Ok(LaunchedChild { child, forwarders })
    }

    fn wait(
        &self,
        process: &ExecuteProcess,
        mut launched: LaunchedChild,
    ) -> BoxFuture<'static, Result<ExitOutcome>> {
        let name = process.name.clone();
        async move {
            let status = launched
                .child
                .wait()
                .await
                .map_err(|source| BringupError::Wait { name, source })?;
            // Captured output is fully logged before the exit is reported.
            for forwarder in launched.forwarders {
                let _ = forwarder.await;
            }
            Ok(ExitOutcome::from(status))
        }
        .boxed()
    }

    fn pid(&self, launched: &LaunchedChild) -> Option<u32> {
        launched.child.id()
    }
}

/// Re-emit each line of a captured stream as a log event, draining the pipe
/// to EOF. Invalid UTF-8 is replaced, never treated as the end of output.
fn forward_lines<R>(name: String, stream: &'static str, reader: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    tracing::info!(process = %name, stream, "{line}");
                }
                Err(e) => {
                    tracing::warn!(process = %name, stream, error = %e, "stopped reading output");
                    break;
                }
            }
        }
    })
}
