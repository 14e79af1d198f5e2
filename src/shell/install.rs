use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ShellEvent;
use crate::manifest::PackageSpec;

/// Called once per package when a simulated install completes.
pub type PackageAdded = Arc<dyn Fn(&PackageSpec) + Send + Sync>;

/// Progress lines printed for an install of `packages`, in order.
pub fn stage_lines(packages: &[PackageSpec], stage: Duration) -> Vec<String> {
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let mut lines = vec![format!("resolving {}...", names.join(", "))];
    lines.extend(packages.iter().map(|p| format!("fetching {}@{}", p.name, p.version)));
    lines.push("linking dependencies...".to_string());
    lines.extend(packages.iter().map(|p| format!("+ {}@{}", p.name, p.version)));

    let elapsed = stage.as_secs_f64() * (lines.len() + 1) as f64;
    let noun = if packages.len() == 1 { "package" } else { "packages" };
    lines.push(format!("added {} {noun} in {elapsed:.1}s", packages.len()));
    lines
}

/// Starts a simulated `npm install`. Nothing is fetched: stage `i` is written
/// `(i + 1) * stage` after the call, and the callback and the prompt follow
/// the final stage.
pub fn spawn_install(
    packages: Vec<PackageSpec>,
    stage: Duration,
    cwd: String,
    events: mpsc::UnboundedSender<ShellEvent>,
    on_added: PackageAdded,
) -> JoinHandle<()> {
    let start = Instant::now();
    let lines = stage_lines(&packages, stage);
    tokio::spawn(async move {
        for (i, text) in lines.into_iter().enumerate() {
            tokio::time::sleep_until(start + stage * (i as u32 + 1)).await;
            tracing::debug!(stage = i, "{text}");
            let _ = events.send(ShellEvent::Line { text });
        }
        for package in &packages {
            tracing::info!(package = %package.name, version = %package.version, "package installed");
            on_added(package);
        }
        let _ = events.send(ShellEvent::Prompt { cwd });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stage_lines() {
        let packages = vec![PackageSpec::parse("axios").unwrap()];
        let lines = stage_lines(&packages, Duration::from_millis(400));
        assert_eq!(
            lines,
            vec![
                "resolving axios...",
                "fetching axios@latest",
                "linking dependencies...",
                "+ axios@latest",
                "added 1 package in 2.0s",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_are_progressive() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let added = Arc::new(Mutex::new(Vec::new()));
        let sink = added.clone();
        let handle = spawn_install(
            vec![PackageSpec::parse("zod@3").unwrap()],
            Duration::from_millis(100),
            "/".into(),
            tx,
            Arc::new(move |p: &PackageSpec| sink.lock().unwrap().push(p.name.clone())),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rx.try_recv().unwrap(), ShellEvent::Line { text: "resolving zod...".into() });
        assert!(rx.try_recv().is_err());
        assert!(added.lock().unwrap().is_empty());

        handle.await.unwrap();
        let rest: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(rest.len(), 5);
        assert_eq!(rest.last(), Some(&ShellEvent::Prompt { cwd: "/".into() }));
        assert_eq!(*added.lock().unwrap(), vec!["zod".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_pending_stages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let added = Arc::new(Mutex::new(0));
        let sink = added.clone();
        let handle = spawn_install(
            vec![PackageSpec::parse("axios").unwrap()],
            Duration::from_millis(100),
            "/".into(),
            tx,
            Arc::new(move |_: &PackageSpec| *sink.lock().unwrap() += 1),
        );
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.abort();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let seen: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(seen.len(), 2);
        assert_eq!(*added.lock().unwrap(), 0);
    }
}
