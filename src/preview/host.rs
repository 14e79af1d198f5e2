use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::dispatch::{PreviewOutput, RuntimeDispatcher};
use crate::error::{PreviewError, Result};
use crate::project::{FileSet, Stack};
use crate::util::escape_html;

const HANDLE_SCHEME: &str = "blob:live-preview/";

/// Loadable reference to a generated document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentHandle(String);

impl DocumentHandle {
    fn issue() -> Self {
        Self(format!("{HANDLE_SCHEME}{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct StoreInner {
    live: HashMap<DocumentHandle, String>,
    issued: usize,
    revoked: usize,
}

/// Registry of live documents, shared between the host and whatever serves
/// the documents to the frame.
#[derive(Clone, Default)]
pub struct DocumentStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, html: String) -> DocumentHandle {
        let handle = DocumentHandle::issue();
        let mut inner = self.lock();
        inner.live.insert(handle.clone(), html);
        inner.issued += 1;
        tracing::debug!(handle = %handle, live = inner.live.len(), "document created");
        handle
    }

    /// Releases a handle. Returns false if it was not live.
    pub fn revoke(&self, handle: &DocumentHandle) -> bool {
        let mut inner = self.lock();
        if inner.live.remove(handle).is_none() {
            return false;
        }
        inner.revoked += 1;
        tracing::debug!(handle = %handle, live = inner.live.len(), "document revoked");
        true
    }

    pub fn resolve(&self, handle: &DocumentHandle) -> Option<String> {
        self.lock().live.get(handle).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn issued_count(&self) -> usize {
        self.lock().issued
    }

    pub fn revoked_count(&self) -> usize {
        self.lock().revoked
    }
}

/// Capabilities granted to the preview frame. Top-level navigation and
/// parent-frame access are never granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxCapability {
    Scripts,
    SameOrigin,
    Forms,
    Popups,
    Downloads,
}

impl SandboxCapability {
    pub const ALL: [SandboxCapability; 5] = [
        SandboxCapability::Scripts,
        SandboxCapability::SameOrigin,
        SandboxCapability::Forms,
        SandboxCapability::Popups,
        SandboxCapability::Downloads,
    ];

    pub fn token(self) -> &'static str {
        match self {
            SandboxCapability::Scripts => "allow-scripts",
            SandboxCapability::SameOrigin => "allow-same-origin",
            SandboxCapability::Forms => "allow-forms",
            SandboxCapability::Popups => "allow-popups",
            SandboxCapability::Downloads => "allow-downloads",
        }
    }
}

pub fn sandbox_attribute() -> String {
    SandboxCapability::ALL
        .iter()
        .map(|c| c.token())
        .collect::<Vec<_>>()
        .join(" ")
}

/// What the preview surface currently shows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum InstalledPreview {
    Document(DocumentHandle),
    Embed(String),
    Console(Vec<String>),
}

/// One preview surface. Holds at most one live document handle.
pub struct ExecutionHost {
    store: DocumentStore,
    current: Option<InstalledPreview>,
    last_input: Option<(FileSet, Stack)>,
}

impl ExecutionHost {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            current: None,
            last_input: None,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Installs a dispatcher output. The previous handle is released right
    /// after the new one exists.
    pub fn install(&mut self, output: PreviewOutput) -> &InstalledPreview {
        let next = match output {
            PreviewOutput::Document { html } => InstalledPreview::Document(self.store.create(html)),
            PreviewOutput::Embed { url } => InstalledPreview::Embed(url),
            PreviewOutput::Console { lines } => InstalledPreview::Console(lines),
        };
        let previous = self.current.replace(next);
        if let Some(InstalledPreview::Document(handle)) = previous {
            self.store.revoke(&handle);
        }
        self.current.get_or_insert_with(|| InstalledPreview::Console(Vec::new()))
    }

    /// Runs the dispatcher on `files` and installs the result.
    pub async fn load(&mut self, dispatcher: &RuntimeDispatcher, files: FileSet, stack: Stack) -> &InstalledPreview {
        let output = dispatcher.dispatch(&files, stack).await;
        self.last_input = Some((files, stack));
        if let PreviewOutput::Console { lines } = &output {
            dispatcher.interpreter().record(lines);
        }
        self.install(output)
    }

    /// Regenerates from the last loaded input and reloads.
    pub async fn refresh(&mut self, dispatcher: &RuntimeDispatcher) -> Result<&InstalledPreview> {
        let (files, stack) = self
            .last_input
            .take()
            .ok_or_else(|| PreviewError::Custom("nothing has been loaded yet".into()))?;
        Ok(self.load(dispatcher, files, stack).await)
    }

    /// Releases the current handle, leaving the surface empty.
    pub fn teardown(&mut self) {
        if let Some(InstalledPreview::Document(handle)) = self.current.take() {
            self.store.revoke(&handle);
        }
    }

    pub fn current(&self) -> Option<&InstalledPreview> {
        self.current.as_ref()
    }

    pub fn current_handle(&self) -> Option<&DocumentHandle> {
        match &self.current {
            Some(InstalledPreview::Document(handle)) => Some(handle),
            _ => None,
        }
    }

    /// Frame markup for the installed document or embed. Console output has
    /// no frame.
    pub fn frame_markup(&self) -> Option<String> {
        let src = match self.current.as_ref()? {
            InstalledPreview::Document(handle) => handle.as_str(),
            InstalledPreview::Embed(url) => url.as_str(),
            InstalledPreview::Console(_) => return None,
        };
        Some(format!(
            r#"<iframe title="Preview" sandbox="{}" src="{}"></iframe>"#,
            sandbox_attribute(),
            escape_html(src)
        ))
    }
}

impl Drop for ExecutionHost {
    fn drop(&mut self) {
        self.teardown();
    }
}
