use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatch::{PreviewOutput, RuntimeDispatcher};
use super::host::{ExecutionHost, InstalledPreview};
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::project::{FileSet, Stack};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum PreviewEvent {
    #[serde(rename_all = "camelCase")]
    Rebuilding { generation: u64 },
    #[serde(rename_all = "camelCase")]
    Ready {
        generation: u64,
        preview: InstalledPreview,
        frame: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ConsoleOutput { generation: u64, lines: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Superseded { generation: u64 },
    #[serde(rename_all = "camelCase")]
    Error { generation: u64, message: String },
}

/// Debounced regeneration loop. The most recently requested generation wins;
/// results that complete after a newer request are discarded.
pub struct PreviewScheduler {
    changes: mpsc::UnboundedSender<FileSet>,
    requested: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl PreviewScheduler {
    pub fn spawn(
        config: &PreviewConfig,
        stack: Stack,
        dispatcher: Arc<RuntimeDispatcher>,
        host: Arc<Mutex<ExecutionHost>>,
        events: mpsc::UnboundedSender<PreviewEvent>,
    ) -> Self {
        let (changes, rx) = mpsc::unbounded_channel();
        let requested = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_loop(
            rx,
            Duration::from_millis(config.debounce_ms),
            stack,
            dispatcher,
            host,
            requested.clone(),
            events,
        ));
        Self {
            changes,
            requested,
            task,
        }
    }

    /// Reports a new file set. Regeneration starts once changes go quiet.
    pub fn submit(&self, files: FileSet) -> Result<()> {
        self.changes
            .send(files)
            .map_err(|_| PreviewError::Custom("preview scheduler has stopped".into()))
    }

    /// Latest generation handed to the dispatcher, 0 before the first.
    pub fn requested_generation(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_loop(
    mut rx: mpsc::UnboundedReceiver<FileSet>,
    window: Duration,
    stack: Stack,
    dispatcher: Arc<RuntimeDispatcher>,
    host: Arc<Mutex<ExecutionHost>>,
    requested: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<PreviewEvent>,
) {
    while let Some(mut files) = rx.recv().await {
        let sleep = tokio::time::sleep_until(Instant::now() + window);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                maybe = rx.recv() => match maybe {
                    Some(next) => {
                        files = next;
                        sleep.as_mut().reset(Instant::now() + window);
                    }
                    None => break,
                }
            }
        }

        let generation = requested.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, files = files.len(), "regenerating preview");
        let _ = events.send(PreviewEvent::Rebuilding { generation });
        tokio::spawn(regenerate(
            generation,
            files,
            stack,
            dispatcher.clone(),
            host.clone(),
            requested.clone(),
            events.clone(),
        ));
    }
}

async fn regenerate(
    generation: u64,
    files: FileSet,
    stack: Stack,
    dispatcher: Arc<RuntimeDispatcher>,
    host: Arc<Mutex<ExecutionHost>>,
    requested: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<PreviewEvent>,
) {
    let output = match AssertUnwindSafe(dispatcher.dispatch(&files, stack)).catch_unwind().await {
        Ok(output) => output,
        Err(_) => {
            tracing::warn!(generation, "preview generation panicked");
            let _ = events.send(PreviewEvent::Error {
                generation,
                message: "preview generation failed unexpectedly".into(),
            });
            return;
        }
    };

    let mut host = host.lock().await;
    let latest = requested.load(Ordering::SeqCst);
    if latest != generation {
        tracing::debug!(generation, latest, "discarding stale preview");
        let _ = events.send(PreviewEvent::Superseded { generation });
        return;
    }
    if let PreviewOutput::Console { lines } = &output {
        dispatcher.interpreter().record(lines);
    }
    let preview = host.install(output).clone();
    let event = match preview {
        InstalledPreview::Console(lines) => PreviewEvent::ConsoleOutput { generation, lines },
        preview => PreviewEvent::Ready {
            generation,
            frame: host.frame_markup(),
            preview,
        },
    };
    tracing::info!(generation, "preview ready");
    let _ = events.send(event);
}
