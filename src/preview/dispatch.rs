use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::document;
use super::interpreter::InterpreterHost;
use crate::compiler::{self, ComponentDescriptor};
use crate::config::PreviewConfig;
use crate::project::{FileSet, Stack};
use crate::templates::{self, icons};

/// Result of one dispatch, before it is installed in a host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PreviewOutput {
    Document { html: String },
    Embed { url: String },
    Console { lines: Vec<String> },
}

pub struct RuntimeDispatcher {
    config: PreviewConfig,
    interpreter: Arc<InterpreterHost>,
    links: AtomicUsize,
}

impl RuntimeDispatcher {
    pub fn new(config: PreviewConfig) -> Self {
        let interpreter = Arc::new(InterpreterHost::from_config(&config));
        Self::with_interpreter(config, interpreter)
    }

    pub fn with_interpreter(config: PreviewConfig, interpreter: Arc<InterpreterHost>) -> Self {
        Self {
            config,
            interpreter,
            links: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn interpreter(&self) -> &Arc<InterpreterHost> {
        &self.interpreter
    }

    /// How many times the module linker has run.
    pub fn links_performed(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }

    pub async fn dispatch(&self, files: &FileSet, stack: Stack) -> PreviewOutput {
        let Some(entry) = files.entry_for(stack) else {
            tracing::info!(%stack, files = files.len(), "no entry file, showing diagnostic");
            return PreviewOutput::Document {
                html: templates::diagnostic_document(stack, files),
            };
        };
        tracing::debug!(%stack, entry = %entry.name, "dispatching preview");

        match stack {
            Stack::React | Stack::NextJs => {
                let modules = compiler::describe_modules(files, entry);
                let root = ComponentDescriptor::from_file(entry);
                let script = compiler::link(&icons::registry_source(), &modules, &root);
                self.links.fetch_add(1, Ordering::SeqCst);
                PreviewOutput::Document {
                    html: document::component_document(&self.config, files, &script),
                }
            }
            Stack::Html => PreviewOutput::Document {
                html: document::markup_document(&self.config, files, entry),
            },
            Stack::ReactNative => PreviewOutput::Embed {
                url: document::runner_url(&self.config, entry),
            },
            Stack::Python => PreviewOutput::Console {
                lines: self.interpreter.run(&entry.content).await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectFile;

    #[tokio::test]
    async fn test_missing_entry_skips_linker() {
        let dispatcher = RuntimeDispatcher::new(PreviewConfig::default());
        let files = FileSet::from_files([ProjectFile::new("Button.tsx", "export const Button = () => null;")]);
        let output = dispatcher.dispatch(&files, Stack::React).await;
        match output {
            PreviewOutput::Document { html } => assert!(html.contains("data-preview-diagnostic")),
            other => panic!("unexpected output {other:?}"),
        }
        assert_eq!(dispatcher.links_performed(), 0);
    }

    #[tokio::test]
    async fn test_component_stack_links_entry() {
        let dispatcher = RuntimeDispatcher::new(PreviewConfig::default());
        let files = FileSet::from_files([
            ProjectFile::new("App.tsx", "import { Button } from './Button';\nexport default function App() { return <Button />; }"),
            ProjectFile::new("Button.tsx", "export const Button = (): JSX.Element => <button>ok</button>;"),
        ]);
        let PreviewOutput::Document { html } = dispatcher.dispatch(&files, Stack::React).await else {
            panic!("expected a document");
        };
        assert_eq!(dispatcher.links_performed(), 1);
        assert!(html.contains("__define(\"Button\""));
        assert!(html.contains("__require(\"App\")"));
        assert!(!html.contains("JSX.Element"));
    }

    #[tokio::test]
    async fn test_mobile_stack_embeds_runner() {
        let dispatcher = RuntimeDispatcher::new(PreviewConfig::default());
        let files = FileSet::from_files([ProjectFile::new("App.js", "export default function App() {}")]);
        let output = dispatcher.dispatch(&files, Stack::ReactNative).await;
        assert!(matches!(output, PreviewOutput::Embed { url } if url.contains("name=App.js")));
        assert_eq!(dispatcher.links_performed(), 0);
    }
}
