use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use proptest::prelude::*;
use tokio::sync::{mpsc, Mutex};

use live_preview::compiler::{link, normalize_with, ComponentDescriptor, NormalizeOptions, Rule, RuleSet};
use live_preview::preview::{
    DocumentStore, ExecutionHost, InstalledPreview, InterpreterHost, InterpreterState, LanguageRuntime, PreviewEvent,
    PreviewOutput, PreviewScheduler, RunOutput, RuntimeDispatcher,
};
use live_preview::templates::icons;
use live_preview::{FileSet, PreviewConfig, ProjectFile, Result, Stack};

const FIXTURE: &str = include_str!("fixtures/dashboard.tsx");

/// Top-level statements of the fixture, split at blank lines outside braces.
fn fixture_blocks() -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for chunk in FIXTURE.split("\n\n") {
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(chunk);
        if current.matches('{').count() == current.matches('}').count() {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn dispatcher() -> RuntimeDispatcher {
    RuntimeDispatcher::new(PreviewConfig::default())
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn expect_document(output: PreviewOutput) -> String {
    match output {
        PreviewOutput::Document { html } => html,
        other => panic!("expected a document, got {other:?}"),
    }
}

const NON_ENTRY_NAMES: &[&str] = &[
    "Button.tsx",
    "components/Card.jsx",
    "lib/utils.ts",
    "styles.css",
    "README.md",
    "app/layout.tsx",
    "package.json",
    "data/items.json",
];

proptest! {
    #[test]
    fn normalizing_twice_changes_nothing_for_each_rule(picks in prop::collection::vec(0usize..64, 1..8)) {
        let blocks = fixture_blocks();
        let source = picks
            .iter()
            .map(|i| blocks[i % blocks.len()].as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        for rule in Rule::ALL {
            let options = NormalizeOptions { rules: RuleSet::only(rule), jsx: true };
            let once = normalize_with(&source, options).code;
            let twice = normalize_with(&once, options).code;
            prop_assert_eq!(&once, &twice, "rule {:?}", rule);
        }
    }

    #[test]
    fn missing_entry_yields_diagnostic_without_linking(
        picks in prop::collection::vec(0usize..NON_ENTRY_NAMES.len(), 0..6),
        stack in prop::sample::select(Stack::ALL.to_vec()),
    ) {
        let files = FileSet::from_files(picks.iter().map(|&i| ProjectFile::new(NON_ENTRY_NAMES[i], "export {};")));
        let dispatcher = dispatcher();
        let html = expect_document(block_on(dispatcher.dispatch(&files, stack)));
        prop_assert!(html.contains("data-preview-diagnostic=\"missing-entry\""));
        prop_assert_eq!(dispatcher.links_performed(), 0);
    }
}

#[test]
fn app_entry_resolves_to_app_and_render_references_it() {
    let file = ProjectFile::new("App.tsx", "export default function App(){ return <div>hi</div>; }");
    let entry = ComponentDescriptor::from_file(&file);
    assert_eq!(entry.exported_symbol_name, "App");

    let script = link(&icons::registry_source(), &[], &entry);
    let render = script.find("const __entry").unwrap();
    assert!(script[render..].contains(r#"__entry["App"]"#));
    assert!(script[render..].contains("React.createElement(__Root)"));
}

#[tokio::test]
async fn empty_project_gets_diagnostic_for_component_stacks() {
    let dispatcher = dispatcher();
    for stack in [Stack::React, Stack::NextJs] {
        let html = expect_document(dispatcher.dispatch(&FileSet::new(), stack).await);
        assert!(html.contains("no files yet"));
    }
    assert_eq!(dispatcher.links_performed(), 0);
}

#[tokio::test]
async fn fixture_project_builds_complete_document() {
    let files = FileSet::from_files([
        ProjectFile::new("src/App.tsx", FIXTURE),
        ProjectFile::new("src/index.css", "body { font-family: sans-serif; }"),
        ProjectFile::new("src/main.tsx", "import ReactDOM from 'react-dom/client';\nimport App from './App';\nReactDOM.createRoot(document.getElementById('root')!).render(<App />);"),
    ]);
    let html = expect_document(dispatcher().dispatch(&files, Stack::React).await);

    assert!(html.contains("font-family: sans-serif"));
    assert!(html.contains("window.__previewFail"));
    assert!(html.contains("__PreviewErrorBoundary"));
    assert!(html.contains("const __icons"));
    assert!(html.contains(r#"__define("src/main""#));
    assert!(html.contains(r#"__require("src/App")"#));
    assert!(html.contains(r#"__entry["Dashboard"]"#));
    assert!(!html.contains("interface Task"));
    assert!(!html.contains("useState<Task[]>"));
}

#[tokio::test]
async fn directory_imports_link_to_their_index_modules() {
    let files = FileSet::from_files([
        ProjectFile::new(
            "App.tsx",
            "import Header from './components/Header';\nimport Footer from './components/Footer';\nexport default function App() { return <div><Header /><Footer /></div>; }",
        ),
        ProjectFile::new("components/Header/index.tsx", "export default function Header() { return <h1>top</h1>; }"),
        ProjectFile::new("components/Footer/index.tsx", "export default function Footer() { return <p>bottom</p>; }"),
    ]);
    let html = expect_document(dispatcher().dispatch(&files, Stack::React).await);
    assert!(html.contains(r#"__define("components/Header/index""#));
    assert!(html.contains(r#"__define("components/Footer/index""#));
    assert!(html.contains(r#"__interop(__require("components/Header/index"))"#));
    assert!(html.contains(r#"__interop(__require("components/Footer/index"))"#));
    assert!(!html.contains(r#"__define("index""#));
}

#[tokio::test]
async fn handle_lifecycle_keeps_one_live_document() {
    let dispatcher = dispatcher();
    let store = DocumentStore::new();
    let mut host = ExecutionHost::new(store.clone());
    const N: usize = 6;

    for i in 0..N {
        let files = FileSet::from_files([ProjectFile::new(
            "App.jsx",
            format!("export default function App() {{ return <p>{i}</p>; }}"),
        )]);
        host.load(&dispatcher, files, Stack::React).await;
    }
    host.refresh(&dispatcher).await.unwrap();

    assert_eq!(store.live_count(), 1);
    assert_eq!(store.issued_count(), N + 1);
    assert_eq!(store.revoked_count(), N);
    let live = store.resolve(host.current_handle().unwrap()).unwrap();
    assert!(live.contains(&format!("<p>{}</p>", N - 1)));

    host.teardown();
    assert_eq!(store.live_count(), 0);
}

#[tokio::test]
async fn refresh_without_load_is_an_error() {
    let mut host = ExecutionHost::new(DocumentStore::new());
    assert!(host.refresh(&dispatcher()).await.is_err());
}

#[tokio::test]
async fn markup_stack_inlines_assets() {
    let files = FileSet::from_files([
        ProjectFile::new("index.html", "<html><head><link rel=\"stylesheet\" href=\"style.css\"></head><body><h1>Hi</h1><script src=\"./app.js\"></script></body></html>"),
        ProjectFile::new("style.css", "h1 { color: teal; }"),
        ProjectFile::new("app.js", "document.querySelector('h1').textContent = 'Hello';"),
    ]);
    let dispatcher = dispatcher();
    let html = expect_document(dispatcher.dispatch(&files, Stack::Html).await);
    assert!(html.contains("h1 { color: teal; }"));
    assert!(html.contains("textContent = 'Hello'"));
    assert!(html.contains("cdn.tailwindcss.com"));
    assert_eq!(dispatcher.links_performed(), 0);
}

struct EchoRuntime;

impl LanguageRuntime for EchoRuntime {
    fn name(&self) -> &str {
        "echo"
    }

    fn boot(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
    }

    fn run<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<RunOutput>> {
        Box::pin(async move {
            Ok(RunOutput {
                stdout: source.to_string(),
                stderr: String::new(),
                success: true,
            })
        })
    }
}

#[tokio::test(start_paused = true)]
async fn interpreter_stack_shares_one_initialization() {
    let interpreter = Arc::new(InterpreterHost::new(Arc::new(EchoRuntime), 100));
    let dispatcher = RuntimeDispatcher::with_interpreter(PreviewConfig::default(), interpreter.clone());
    let a = FileSet::from_files([ProjectFile::new("main.py", "a\nb")]);
    let b = FileSet::from_files([ProjectFile::new("main.py", "c")]);

    let (first, second) = tokio::join!(dispatcher.dispatch(&a, Stack::Python), dispatcher.dispatch(&b, Stack::Python));
    assert_eq!(first, PreviewOutput::Console { lines: vec!["a".into(), "b".into()] });
    assert_eq!(second, PreviewOutput::Console { lines: vec!["c".into()] });
    assert_eq!(interpreter.boot_count(), 1);
    assert_eq!(interpreter.state(), InterpreterState::Ready);
    assert!(interpreter.scrollback().is_empty());

    let mut host = ExecutionHost::new(DocumentStore::new());
    host.load(&dispatcher, b, Stack::Python).await;
    assert_eq!(interpreter.scrollback(), vec!["c"]);
    assert_eq!(interpreter.boot_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn scheduler_installs_only_latest_request() {
    let config = PreviewConfig::default();
    let dispatcher = Arc::new(RuntimeDispatcher::new(config.clone()));
    let store = DocumentStore::new();
    let host = Arc::new(Mutex::new(ExecutionHost::new(store.clone())));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = PreviewScheduler::spawn(&config, Stack::React, dispatcher, host.clone(), tx);

    let app = |text: &str| {
        FileSet::from_files([ProjectFile::new(
            "App.tsx",
            format!("export default function App() {{ return <h1>{text}</h1>; }}"),
        )])
    };
    scheduler.submit(app("first")).unwrap();
    tokio::time::sleep(Duration::from_millis(config.debounce_ms + 50)).await;
    scheduler.submit(app("second")).unwrap();
    tokio::time::sleep(Duration::from_millis(config.debounce_ms + 50)).await;

    let mut ready = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PreviewEvent::Ready { generation, preview: InstalledPreview::Document(handle), .. } = event {
            ready.push((generation, handle));
        }
    }
    assert_eq!(scheduler.requested_generation(), 2);
    let (generation, handle) = ready.last().cloned().unwrap();
    assert_eq!(generation, 2);
    assert!(store.resolve(&handle).unwrap().contains("<h1>second</h1>"));
    assert_eq!(store.live_count(), 1);
    assert_eq!(host.lock().await.current_handle(), Some(&handle));
}
