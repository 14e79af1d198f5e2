pub mod commands;
pub mod install;
pub mod node;

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use install::PackageAdded;

use crate::config::PreviewConfig;
use crate::manifest::PackageSpec;
use crate::project::FileSet;
use crate::scrollback::Scrollback;

/// Events written to the terminal UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum ShellEvent {
    #[serde(rename_all = "camelCase")]
    Line { text: String },
    Clear,
    #[serde(rename_all = "camelCase")]
    Prompt { cwd: String },
}

/// Visible terminal contents rebuilt from a stream of `ShellEvent`s.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    lines: Scrollback,
    prompts: usize,
}

impl Transcript {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Scrollback::new(capacity),
            prompts: 0,
        }
    }

    pub fn apply(&mut self, event: &ShellEvent) {
        match event {
            ShellEvent::Line { text } => self.lines.push(text),
            ShellEvent::Clear => self.lines.clear(),
            ShellEvent::Prompt { .. } => self.prompts += 1,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.to_vec()
    }

    /// Number of prompts issued so far.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

/// One terminal session. Each submitted line is one transition.
pub struct ShellSession {
    cwd: String,
    input: String,
    install_stage: Duration,
    node_timeout: Duration,
    events: mpsc::UnboundedSender<ShellEvent>,
    on_package_added: PackageAdded,
    installs: Vec<JoinHandle<()>>,
}

impl ShellSession {
    pub fn new(
        config: &PreviewConfig,
        events: mpsc::UnboundedSender<ShellEvent>,
        on_package_added: PackageAdded,
    ) -> Self {
        Self {
            cwd: "/".to_string(),
            input: String::new(),
            install_stage: Duration::from_millis(config.install_stage_ms),
            node_timeout: Duration::from_millis(config.node_timeout_ms),
            events,
            on_package_added,
            installs: Vec::new(),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    /// Installs that have not finished yet.
    pub fn pending_installs(&mut self) -> usize {
        self.installs.retain(|handle| !handle.is_finished());
        self.installs.len()
    }

    fn emit(&self, event: ShellEvent) {
        let _ = self.events.send(event);
    }

    fn print(&self, lines: Vec<String>) {
        for text in lines {
            self.emit(ShellEvent::Line { text });
        }
    }

    fn prompt(&self) {
        self.emit(ShellEvent::Prompt { cwd: self.cwd.clone() });
    }

    /// Handles one command line against the current file set. `npm install`
    /// returns before its output is complete and issues the prompt itself.
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, line: &str, files: &FileSet) {
        if line.trim().is_empty() {
            return;
        }
        self.emit(ShellEvent::Line { text: format!("$ {}", line.trim()) });
        let Some(words) = shlex::split(line) else {
            self.print(vec!["shell: unterminated quote".to_string()]);
            self.prompt();
            return;
        };
        let Some((command, args)) = words.split_first() else {
            self.prompt();
            return;
        };
        tracing::debug!(command = %command, args = args.len(), "shell command");

        match command.as_str() {
            "clear" => self.emit(ShellEvent::Clear),
            "ls" => self.print(commands::ls(files)),
            "tree" => self.print(commands::tree(files)),
            "cat" => self.print(commands::cat(files, args.first().map(String::as_str))),
            "pwd" => self.print(vec![self.cwd.clone()]),
            "echo" => self.print(vec![args.join(" ")]),
            "help" => self.print(commands::HELP.iter().map(|l| l.to_string()).collect()),
            "python" | "python3" => self.print(commands::python(args)),
            "node" => self.print(self.node(args.first().map(String::as_str), files)),
            "npm" => {
                if self.npm(args, files) {
                    return;
                }
            }
            other => self.print(vec![format!("{other}: command not found")]),
        }
        self.prompt();
    }

    fn node(&self, path: Option<&str>, files: &FileSet) -> Vec<String> {
        let Some(path) = path else {
            return commands::node_banner();
        };
        match commands::find_file(files, path) {
            Some(file) => node::run_file(file, self.node_timeout),
            None => vec![format!("node: cannot find module '{path}'")],
        }
    }

    /// Returns true when an install was started; it prompts on completion.
    fn npm(&mut self, args: &[String], files: &FileSet) -> bool {
        let Some((sub, rest)) = args.split_first() else {
            self.print(commands::npm_usage());
            return false;
        };
        if !matches!(sub.as_str(), "install" | "i" | "add") {
            self.print(commands::npm_usage());
            return false;
        }
        let packages: Vec<PackageSpec> = rest.iter().filter_map(|a| PackageSpec::parse(a)).collect();
        if packages.is_empty() {
            self.print(commands::npm_up_to_date(files));
            return false;
        }
        let handle = install::spawn_install(
            packages,
            self.install_stage,
            self.cwd.clone(),
            self.events.clone(),
            self.on_package_added.clone(),
        );
        self.installs.retain(|handle| !handle.is_finished());
        self.installs.push(handle);
        true
    }

    /// Ends the session, cancelling stages that have not been written yet.
    pub fn close(&mut self) {
        for handle in self.installs.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectFile;
    use std::sync::{Arc, Mutex};

    fn session() -> (ShellSession, mpsc::UnboundedReceiver<ShellEvent>, Arc<Mutex<Vec<String>>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let added = Arc::new(Mutex::new(Vec::new()));
        let sink = added.clone();
        let callback: PackageAdded = Arc::new(move |p: &PackageSpec| sink.lock().unwrap().push(p.name.clone()));
        (ShellSession::new(&PreviewConfig::default(), tx, callback), rx, added)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ShellEvent>) -> Vec<ShellEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn line(text: &str) -> ShellEvent {
        ShellEvent::Line { text: text.into() }
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let (mut shell, mut rx, _) = session();
        shell.submit("   ", &FileSet::new());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (mut shell, mut rx, _) = session();
        shell.submit("rm -rf /", &FileSet::new());
        assert_eq!(
            drain(&mut rx),
            vec![
                line("$ rm -rf /"),
                line("rm: command not found"),
                ShellEvent::Prompt { cwd: "/".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_resets_transcript() {
        let (mut shell, mut rx, _) = session();
        let files = FileSet::from_files([ProjectFile::new("App.tsx", "")]);
        shell.submit("ls", &files);
        shell.submit("clear", &files);
        let mut transcript = Transcript::new(100);
        for event in drain(&mut rx) {
            transcript.apply(&event);
        }
        assert!(transcript.lines().is_empty());
        assert_eq!(transcript.prompts(), 2);
    }

    #[tokio::test]
    async fn test_input_buffer_editing() {
        let (mut shell, _rx, _) = session();
        for c in "lsx".chars() {
            shell.push_char(c);
        }
        shell.backspace();
        assert_eq!(shell.input(), "ls");
        assert_eq!(shell.take_input(), "ls");
        assert_eq!(shell.input(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_npm_install_defers_prompt() {
        let (mut shell, mut rx, added) = session();
        shell.submit("npm i axios", &FileSet::new());
        assert_eq!(drain(&mut rx), vec![line("$ npm i axios")]);
        assert_eq!(shell.pending_installs(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&ShellEvent::Prompt { cwd: "/".into() }));
        assert_eq!(events.iter().filter(|e| matches!(e, ShellEvent::Prompt { .. })).count(), 1);
        assert_eq!(*added.lock().unwrap(), vec!["axios".to_string()]);
        assert_eq!(shell.pending_installs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_install() {
        let (mut shell, mut rx, added) = session();
        shell.submit("npm install zod", &FileSet::new());
        shell.close();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(drain(&mut rx), vec![line("$ npm install zod")]);
        assert!(added.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unterminated_quote_is_reported() {
        let (mut shell, mut rx, _) = session();
        shell.submit("cat \"App.tsx", &FileSet::new());
        assert_eq!(
            drain(&mut rx),
            vec![
                line("$ cat \"App.tsx"),
                line("shell: unterminated quote"),
                ShellEvent::Prompt { cwd: "/".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_npm_without_subcommand_prints_usage() {
        let (mut shell, mut rx, _) = session();
        shell.submit("npm", &FileSet::new());
        let events = drain(&mut rx);
        assert_eq!(events[1], line("Usage: npm install <package>[@version] ..."));
        assert_eq!(events.last(), Some(&ShellEvent::Prompt { cwd: "/".into() }));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(ShellEvent::Line { text: "hi".into() }).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "line", "data": { "text": "hi" } }));
        let json = serde_json::to_value(ShellEvent::Clear).unwrap();
        assert_eq!(json, serde_json::json!({ "event": "clear" }));
    }
}
