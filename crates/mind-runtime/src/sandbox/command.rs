use mind_core::{MindError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Sandbox;

/// How long to wait for the pipe readers after the process group is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one `run_command` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when either stream hit its cap.
    pub truncated: bool,
    /// Set when the timeout fired; holds the effective timeout.
    pub timed_out: Option<u64>,
}

impl CommandOutput {
    /// Whether the model should see this as a failed call.
    pub fn is_error(&self) -> bool {
        self.timed_out.is_some() || self.exit_code != Some(0)
    }

    /// Single text block handed back to the model.
    pub fn render(&self) -> String {
        if let Some(secs) = self.timed_out {
            return format!("Command {}", MindError::Timeout { secs });
        }
        format!(
            "Exit code: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            self.exit_code.unwrap_or(-1),
            self.stdout,
            self.stderr
        )
    }
}

#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

enum Outcome {
    Exited(std::process::ExitStatus),
    Overflow,
    TimedOut,
    Cancelled,
}

impl Sandbox {
    /// Run `command` through `sh -c` inside the workspace.
    ///
    /// Output beyond the per-stream cap, the timeout, and cancellation all
    /// kill the whole process group. Only cancellation returns an error.
    pub async fn run_command(
        &self,
        command: &str,
        timeout_secs: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let max = self.limits.max_timeout_secs.max(1);
        let secs = timeout_secs
            .unwrap_or(self.limits.default_timeout_secs)
            .clamp(1, max);
        let cap = self.limits.max_output_bytes / 2;

        info!(command, timeout_secs = secs, "running command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .env_clear()
            .envs(self.allowed_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| MindError::tool("run_command", e.to_string()))?;
        let pid = child.id();

        let overflow = CancellationToken::new();
        let out_task = tokio::spawn(read_capped(child.stdout.take(), cap, overflow.clone()));
        let err_task = tokio::spawn(read_capped(child.stderr.take(), cap, overflow.clone()));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status?),
            _ = overflow.cancelled() => Outcome::Overflow,
            _ = tokio::time::sleep(Duration::from_secs(secs)) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        // Background children of the shell may still hold the pipes open.
        if let Some(pid) = pid {
            kill_group(pid);
        }
        let status = match outcome {
            Outcome::Exited(status) => Some(status),
            _ => {
                let _ = child.kill().await;
                child.wait().await.ok()
            }
        };

        let stdout = drain(out_task).await;
        let stderr = drain(err_task).await;

        match outcome {
            Outcome::Cancelled => {
                debug!(command, "command cancelled");
                return Err(MindError::Cancelled);
            }
            Outcome::TimedOut => warn!(command, timeout_secs = secs, "command timed out"),
            Outcome::Overflow => warn!(command, cap, "command output truncated"),
            Outcome::Exited(_) => {}
        }

        let marker = format!("\n[output truncated at {cap} bytes; process group terminated]");
        let render = |capture: &Capture| {
            let mut text = String::from_utf8_lossy(&capture.bytes).into_owned();
            if capture.truncated {
                text.push_str(&marker);
            }
            text
        };

        Ok(CommandOutput {
            exit_code: match outcome {
                Outcome::Exited(_) => status.and_then(|s| s.code()),
                _ => None,
            },
            stdout: render(&stdout),
            stderr: render(&stderr),
            truncated: stdout.truncated || stderr.truncated,
            timed_out: matches!(outcome, Outcome::TimedOut).then_some(secs),
        })
    }

    fn allowed_env(&self) -> Vec<(String, String)> {
        std::env::vars()
            .filter(|(key, _)| {
                self.limits
                    .env_passthrough
                    .iter()
                    .any(|allowed| match allowed.strip_suffix('*') {
                        Some(prefix) => key.starts_with(prefix),
                        None => key == allowed,
                    })
            })
            .collect()
    }
}

/// Read until EOF or until `cap` bytes, signalling `overflow` on the latter.
async fn read_capped<R>(reader: Option<R>, cap: usize, overflow: CancellationToken) -> Capture
where
    R: AsyncRead + Unpin,
{
    let mut capture = Capture::default();
    let Some(mut reader) = reader else {
        return capture;
    };
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap - capture.bytes.len();
                if n > room {
                    capture.bytes.extend_from_slice(&buf[..room]);
                    capture.truncated = true;
                    overflow.cancel();
                    break;
                }
                capture.bytes.extend_from_slice(&buf[..n]);
            }
        }
    }
    capture
}

async fn drain(mut handle: JoinHandle<Capture>) -> Capture {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(capture)) => capture,
        Ok(Err(_)) => Capture::default(),
        Err(_) => {
            handle.abort();
            Capture::default()
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // SAFETY: killpg only sends a signal; the group id is the child we spawned
    // with process_group(0).
    unsafe {
        libc::killpg(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
