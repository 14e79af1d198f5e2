use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::scrollback::Scrollback;

/// Captured result of one program run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// An interpreter that needs expensive one-time setup before it can run code.
pub trait LanguageRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn boot(&self) -> BoxFuture<'_, Result<()>>;

    fn run<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<RunOutput>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InterpreterState {
    Idle,
    Starting,
    Ready,
    Failed,
}

/// Shares one runtime across a session. The first caller boots it; concurrent
/// callers await that same boot. The boot outcome, failure included, is kept
/// for the life of the host.
pub struct InterpreterHost {
    runtime: Arc<dyn LanguageRuntime>,
    init: OnceCell<std::result::Result<(), String>>,
    state: Mutex<InterpreterState>,
    boots: AtomicUsize,
    scrollback: Mutex<Scrollback>,
}

impl InterpreterHost {
    pub fn new(runtime: Arc<dyn LanguageRuntime>, scrollback_lines: usize) -> Self {
        Self {
            runtime,
            init: OnceCell::new(),
            state: Mutex::new(InterpreterState::Idle),
            boots: AtomicUsize::new(0),
            scrollback: Mutex::new(Scrollback::new(scrollback_lines)),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(Arc::new(CommandRuntime::from_config(config)), config.scrollback_lines)
    }

    pub fn state(&self) -> InterpreterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of times the runtime's boot was started.
    pub fn boot_count(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: InterpreterState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!(runtime = self.runtime.name(), ?state, "interpreter state changed");
    }

    pub async fn ensure_ready(&self) -> Result<()> {
        let outcome = self
            .init
            .get_or_init(|| async {
                self.boots.fetch_add(1, Ordering::SeqCst);
                self.set_state(InterpreterState::Starting);
                match self.runtime.boot().await {
                    Ok(()) => {
                        self.set_state(InterpreterState::Ready);
                        tracing::info!(runtime = self.runtime.name(), "interpreter ready");
                        Ok(())
                    }
                    Err(e) => {
                        self.set_state(InterpreterState::Failed);
                        tracing::warn!(runtime = self.runtime.name(), "interpreter failed to start: {e}");
                        Err(match e {
                            PreviewError::Interpreter(message) => message,
                            other => other.to_string(),
                        })
                    }
                }
            })
            .await;
        outcome.clone().map_err(PreviewError::Interpreter)
    }

    /// Runs `source`, returning the lines it produced. Failures become output
    /// lines.
    pub async fn run(&self, source: &str) -> Vec<String> {
        let mut lines = Vec::new();
        match self.ensure_ready().await {
            Err(e) => lines.push(e.to_string()),
            Ok(()) => match self.runtime.run(source).await {
                Ok(output) => {
                    lines.extend(output.stdout.lines().map(str::to_string));
                    lines.extend(output.stderr.lines().map(str::to_string));
                    if !output.success && output.stderr.trim().is_empty() {
                        lines.push(format!("{} exited with an error", self.runtime.name()));
                    }
                }
                Err(e) => lines.push(e.to_string()),
            },
        }
        lines
    }

    /// Appends the output of an installed run to the scrollback.
    pub fn record(&self, lines: &[String]) {
        let mut scrollback = self.scrollback.lock().unwrap_or_else(PoisonError::into_inner);
        for line in lines {
            scrollback.push(line);
        }
    }

    pub fn scrollback(&self) -> Vec<String> {
        self.scrollback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn clear_scrollback(&self) {
        self.scrollback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Runtime backed by an interpreter executable; the program is fed on stdin.
pub struct CommandRuntime {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRuntime {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        // Five times the `node` timeout.
        let timeout = Duration::from_millis(config.node_timeout_ms.saturating_mul(5));
        Self::new(&config.interpreter_command, config.interpreter_args.clone(), timeout)
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl LanguageRuntime for CommandRuntime {
    fn name(&self) -> &str {
        &self.command
    }

    fn boot(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let output = self
                .command()
                .arg("--version")
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| PreviewError::Interpreter(format!("failed to start {}: {e}", self.command)))?;
            if !output.status.success() {
                return Err(PreviewError::Interpreter(format!(
                    "{} --version exited with {}",
                    self.command, output.status
                )));
            }
            Ok(())
        })
    }

    fn run<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<RunOutput>> {
        Box::pin(async move {
            let mut child = self
                .command()
                .args(&self.args)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| PreviewError::Interpreter(format!("failed to start {}: {e}", self.command)))?;
            let stdin = child.stdin.take();
            let finished = async move {
                if let Some(mut stdin) = stdin {
                    match stdin.write_all(source.as_bytes()).await {
                        Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                        _ => {}
                    }
                }
                child.wait_with_output().await
            };
            let output = tokio::time::timeout(self.timeout, finished)
                .await
                .map_err(|_| PreviewError::Interpreter(format!("timed out after {:?}", self.timeout)))??;
            Ok(RunOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                success: output.status.success(),
            })
        })
    }
}
