//! Subprocess execution behind a fakeable seam.
//!
//! The exit status is taken from `wait()`, not from the output pipes closing:
//! provisioning scripts start helpers that may keep the pipes open after the
//! tool itself has exited. Output is drained in background tasks and whatever
//! they have buffered shortly after exit is what gets reported.

use crate::config::CheckConfig;
use crate::error::{CheckError, CheckResult};
use crate::invocation::Invocation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit status recorded when the child was terminated by a signal.
pub const SIGNALLED_STATUS: i32 = -1;

/// How long to keep reading output after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Outcome of running an invocation to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code (0 = success).
    pub exit_status: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Whether the process exited with status 0.
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs an [`Invocation`] and waits for it to terminate.
#[async_trait]
pub trait CommandInvoker: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// `timeout = None` waits indefinitely. Exceeding the timeout must yield
    /// [`CheckError::Timeout`], never an `ExecutionResult`.
    async fn invoke(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> CheckResult<ExecutionResult>;
}

/// Invoker backed by real child processes.
///
/// On unix each child leads its own process group so a timeout can kill
/// everything the tool started, not just the tool.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker {
    current_dir: Option<PathBuf>,
    envs: BTreeMap<String, String>,
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoker carrying the working directory and environment of `config`.
    pub fn from_config(config: &CheckConfig) -> Self {
        let mut invoker = Self::new();
        if let Some(dir) = &config.working_dir {
            invoker = invoker.with_current_dir(dir);
        }
        for (key, value) in &config.env {
            invoker = invoker.with_env(key, value);
        }
        invoker
    }

    /// Run children from `dir` instead of the inherited working directory.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Add an environment variable on top of the inherited environment.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .envs(&self.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            command.process_group(0);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl CommandInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> CheckResult<ExecutionResult> {
        let start = Instant::now();

        let mut child = self
            .command(invocation)
            .spawn()
            .map_err(|source| CheckError::Spawn {
                program: invocation.program().to_string(),
                source,
            })?;
        let pid = child.id();
        debug!(pid = ?pid, command = %invocation, "spawned");

        let stdout = OutputDrain::start(child.stdout.take());
        let stderr = OutputDrain::start(child.stderr.take());

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    kill_process_group(&mut child, pid).await;
                    stdout.abort();
                    stderr.abort();
                    return Err(CheckError::Timeout {
                        limit_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => child.wait().await,
        };
        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                stdout.abort();
                stderr.abort();
                return Err(e.into());
            }
        };

        Ok(ExecutionResult {
            exit_status: status.code().unwrap_or(SIGNALLED_STATUS),
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Background reader that keeps everything it has read so far.
struct OutputDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputDrain {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            lock(&buffer).extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait briefly for EOF, then return what was read.
    async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                // A leftover helper still holds the pipe open.
                task.abort();
            }
        }
        let bytes = std::mem::take(&mut *lock(&self.buffer));
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

fn lock(buffer: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// SIGKILL the child's process group, then reap the child.
async fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: killpg(2) only sends a signal; the group was created by
            // `process_group(0)` at spawn, so its id is the child's pid.
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                warn!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(status: i32) -> ExecutionResult {
        ExecutionResult {
            exit_status: status,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 10,
        }
    }

    #[test]
    fn test_succeeded_only_on_zero() {
        assert!(result_with(0).succeeded());
        assert!(!result_with(1).succeeded());
        assert!(!result_with(SIGNALLED_STATUS).succeeded());
        assert!(!result_with(255).succeeded());
    }

    #[test]
    fn test_from_config_carries_env_and_dir() {
        let mut config = CheckConfig {
            working_dir: Some(PathBuf::from("/opt/buildkit")),
            ..CheckConfig::default()
        };
        config
            .env
            .insert("CIVIBUILD_HOME".to_string(), "/opt/buildkit/build".to_string());

        let invoker = ProcessInvoker::from_config(&config);
        assert_eq!(invoker.current_dir, Some(PathBuf::from("/opt/buildkit")));
        assert_eq!(
            invoker.envs.get("CIVIBUILD_HOME").map(String::as_str),
            Some("/opt/buildkit/build")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let inv = Invocation::new("civibuild-check-no-such-binary", vec![]).unwrap();
        let err = ProcessInvoker::new().invoke(&inv, None).await.unwrap_err();
        match err {
            CheckError::Spawn { program, .. } => {
                assert_eq!(program, "civibuild-check-no-such-binary")
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_captures_stdout() {
        let inv = Invocation::new("echo", vec!["hello".to_string()]).unwrap();
        let result = ProcessInvoker::new().invoke(&inv, None).await.unwrap();
        assert!(result.succeeded());
        assert!(result.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_reaches_child() {
        let inv = Invocation::new(
            "sh",
            vec!["-c".to_string(), "printf %s \"$CIVI_CHECK_MARK\"".to_string()],
        )
        .unwrap();
        let result = ProcessInvoker::new()
            .with_env("CIVI_CHECK_MARK", "wp-demo")
            .invoke(&inv, None)
            .await
            .unwrap();
        assert_eq!(result.stdout, "wp-demo");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_false_reports_nonzero() {
        let inv = Invocation::new("false", vec![]).unwrap();
        let result = ProcessInvoker::new()
            .invoke(&inv, Some(Duration::from_secs(30)))
            .await
            .unwrap();
        assert!(!result.succeeded());
        assert_ne!(result.exit_status, 0);
    }
}
