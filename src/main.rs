use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_preview::config::{self, PreviewConfig};
use live_preview::manifest::{self, PackageSpec};
use live_preview::preview::document::runner_document;
use live_preview::shell::PackageAdded;
use live_preview::{FileSet, PreviewOutput, RuntimeDispatcher, ShellEvent, ShellSession, Stack};

#[derive(Parser)]
#[command(name = "live-preview")]
#[command(about = "Build sandbox previews of a project and explore it in a simulated shell")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the preview for a project directory once
    Build {
        dir: PathBuf,

        /// react, next-js, html, python or react-native
        #[arg(short, long, default_value = "react")]
        stack: Stack,

        /// Write the document here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run the simulated terminal over a project directory
    Shell {
        dir: PathBuf,

        #[arg(short, long, default_value = "react")]
        stack: Stack,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the user config file
        #[arg(long)]
        write: bool,
    },
}

/// Logs go to stderr so documents can be piped from stdout.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "live_preview=info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = config::load_config();

    match cli.command {
        Commands::Build { dir, stack, out } => build(config, &dir, stack, out).await?,
        Commands::Shell { dir, stack } => shell(config, &dir, stack).await?,
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                let path = config::save_config(&config)?;
                tracing::info!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

fn load_project(dir: &std::path::Path) -> anyhow::Result<FileSet> {
    FileSet::load_dir(dir).with_context(|| format!("failed to read project at {}", dir.display()))
}

async fn build(config: PreviewConfig, dir: &std::path::Path, stack: Stack, out: Option<PathBuf>) -> anyhow::Result<()> {
    let files = load_project(dir)?;
    tracing::info!(files = files.len(), %stack, "building preview");
    let dispatcher = RuntimeDispatcher::new(config);

    let document = match dispatcher.dispatch(&files, stack).await {
        PreviewOutput::Document { html } => html,
        PreviewOutput::Embed { url } => {
            println!("{url}");
            runner_document(&url)
        }
        PreviewOutput::Console { lines } => {
            for line in lines {
                println!("{line}");
            }
            return Ok(());
        }
    };

    match out {
        Some(path) => {
            std::fs::write(&path, document).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote {}", path.display());
        }
        None => print!("{document}"),
    }
    Ok(())
}

async fn shell(config: PreviewConfig, dir: &std::path::Path, stack: Stack) -> anyhow::Result<()> {
    let files = Arc::new(Mutex::new(load_project(dir)?));
    tracing::info!(%stack, "starting shell");

    let manifest_files = files.clone();
    let on_added: PackageAdded = Arc::new(move |spec: &PackageSpec| {
        let mut files = manifest_files.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = manifest::add_dependency(&mut files, spec) {
            tracing::warn!(package = %spec.name, "could not update package.json: {e}");
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let mut stdout = std::io::stdout().lock();
            let _ = match &event {
                ShellEvent::Line { text } => writeln!(stdout, "{text}"),
                ShellEvent::Clear => write!(stdout, "\x1b[2J\x1b[H"),
                ShellEvent::Prompt { cwd } => write!(stdout, "{cwd} $ "),
            };
            let _ = stdout.flush();
            if matches!(event, ShellEvent::Prompt { .. }) {
                let _ = prompt_tx.send(());
            }
        }
    });

    let mut session = ShellSession::new(&config, tx.clone(), on_added);
    let _ = tx.send(ShellEvent::Prompt { cwd: session.cwd().to_string() });
    prompt_rx.recv().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let snapshot = files.lock().unwrap_or_else(|e| e.into_inner()).clone();
        session.submit(&line, &snapshot);
        // Installs print the prompt once their last stage is written.
        prompt_rx.recv().await;
    }

    session.close();
    drop(session);
    drop(tx);
    let _ = printer.await;
    Ok(())
}
