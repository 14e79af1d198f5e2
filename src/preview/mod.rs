pub mod dispatch;
pub mod document;
pub mod host;
pub mod interpreter;
pub mod scheduler;

pub use dispatch::{PreviewOutput, RuntimeDispatcher};
pub use host::{sandbox_attribute, DocumentHandle, DocumentStore, ExecutionHost, InstalledPreview, SandboxCapability};
pub use interpreter::{CommandRuntime, InterpreterHost, InterpreterState, LanguageRuntime, RunOutput};
pub use scheduler::{PreviewEvent, PreviewScheduler};
