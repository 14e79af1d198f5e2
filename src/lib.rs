pub mod compiler;
pub mod config;
pub mod error;
pub mod manifest;
pub mod preview;
pub mod project;
pub mod scrollback;
pub mod shell;
pub mod templates;
pub mod util;

pub use config::PreviewConfig;
pub use error::{PreviewError, Result};
pub use preview::{ExecutionHost, PreviewEvent, PreviewOutput, PreviewScheduler, RuntimeDispatcher};
pub use project::{FileSet, Language, ProjectFile, Stack};
pub use shell::{ShellEvent, ShellSession, Transcript};
