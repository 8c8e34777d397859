// Subprocess invocation with a hard time budget
//
// Shared by the transcoder and the engine adapters: spawn, capture stdout
// and stderr, and kill the process if it outlives its budget so a hung
// engine cannot block a worker indefinitely.

use log::warn;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of a finished subprocess
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Failures of the invocation itself, as opposed to a non-zero exit
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be found on this host
    #[error("Command not found: {0}")]
    Missing(String),

    /// The process was killed after exceeding its time budget
    #[error("Command '{0}' timed out after {1} seconds")]
    Timeout(String, u64),

    /// Spawn or pipe I/O failure
    #[error("Command I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Run a prepared command to completion within `budget`.
///
/// On timeout the child is forcibly killed before returning, so no process
/// outlives its run. `label` names the command in log and error messages.
pub async fn run_with_timeout(
    mut command: Command,
    label: &str,
    budget: Duration,
) -> Result<CommandOutput, CommandError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            CommandError::Missing(label.to_string())
        } else {
            CommandError::Io(e)
        }
    })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped above");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped above");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let status = match timeout(budget, child.wait()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "{} exceeded {}s budget, killing process",
                label,
                budget.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed-out {}: {}", label, e);
            }
            return Err(CommandError::Timeout(label.to_string(), budget.as_secs()));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}
