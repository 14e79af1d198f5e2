use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::prelude::{Coerced, Rest};
use rquickjs::{CatchResultExt, Context, Ctx, Function, Object, Persistent, Runtime, Value};

use crate::compiler::{normalize_with, NormalizeOptions};
use crate::error::{PreviewError, Result};
use crate::project::ProjectFile;

const MEMORY_LIMIT: usize = 32 * 1024 * 1024;
const CONSOLE_METHODS: &[&str] = &["log", "info", "warn", "error", "debug"];

/// Rejected promises that have no handler yet, with their printed reason.
type Rejections = Rc<RefCell<Vec<(Persistent<Value<'static>>, String)>>>;

/// `node <file>`: runs `file` in an embedded engine whose only global
/// capability is a captured `console`, and returns everything it printed,
/// followed by an error line if evaluation failed. Never returns script
/// errors as `Err`.
pub fn run_file(file: &ProjectFile, timeout: Duration) -> Vec<String> {
    if !file.language.is_script() {
        return vec![format!("node: {}: not a JavaScript or TypeScript file", file.name)];
    }
    let source = normalize_with(&file.content, NormalizeOptions::for_file(&file.name)).code;
    match evaluate(&source, timeout) {
        Ok(lines) => lines,
        Err(e) => vec![format!("node: {e}")],
    }
}

/// Evaluates `source` as a classic script, then runs queued promise jobs
/// until the queue is empty or `timeout` has passed.
pub fn evaluate(source: &str, timeout: Duration) -> Result<Vec<String>> {
    let runtime = Runtime::new().map_err(|e| PreviewError::Script(e.to_string()))?;
    runtime.set_memory_limit(MEMORY_LIMIT);
    let deadline = Instant::now() + timeout;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() >= deadline)));
    let rejections = track_rejections(&runtime);
    let context = Context::full(&runtime).map_err(|e| PreviewError::Script(e.to_string()))?;

    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interrupted = false;
    context.with(|ctx| -> Result<()> {
        install_console(&ctx, &output).map_err(|e| PreviewError::Script(e.to_string()))?;
        if let Err(e) = ctx.eval::<(), _>(source).catch(&ctx) {
            if Instant::now() >= deadline {
                interrupted = true;
            } else {
                output.borrow_mut().push(format!("Uncaught {e}"));
            }
        }
        Ok(())
    })?;

    while !interrupted {
        if Instant::now() >= deadline {
            interrupted = true;
            break;
        }
        match runtime.execute_pending_job() {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) if Instant::now() >= deadline => interrupted = true,
            Err(job) => {
                let message = job.0.with(|ctx| describe(&ctx.catch()));
                output.borrow_mut().push(format!("Uncaught {message}"));
                break;
            }
        }
    }

    // Rejections caused by the interrupt itself are not reported.
    let unhandled = std::mem::take(&mut *rejections.borrow_mut());
    if interrupted {
        output
            .borrow_mut()
            .push(format!("Uncaught script timed out after {}ms", timeout.as_millis()));
    } else {
        output
            .borrow_mut()
            .extend(unhandled.into_iter().map(|(_, reason)| format!("Uncaught (in promise) {reason}")));
    }

    let lines = output.borrow().clone();
    Ok(lines)
}

fn describe(value: &Value<'_>) -> String {
    value
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| "unknown error".to_string())
}

/// A rejection is reported only if no handler is attached by the time the
/// job queue drains.
fn track_rejections(runtime: &Runtime) -> Rejections {
    let rejections = Rejections::default();
    let tracked = rejections.clone();
    runtime.set_host_promise_rejection_tracker(Some(Box::new(move |ctx, promise, reason, is_handled| {
        if is_handled {
            tracked
                .borrow_mut()
                .retain(|(saved, _)| saved.clone().restore(&ctx).map_or(true, |p| p != promise));
        } else {
            let reason = describe(&reason);
            tracked.borrow_mut().push((Persistent::save(&ctx, promise), reason));
        }
    })));
    rejections
}

fn install_console<'js>(ctx: &Ctx<'js>, output: &Rc<RefCell<Vec<String>>>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;
    for method in CONSOLE_METHODS {
        let sink = output.clone();
        let log = Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            let line = args.0.into_iter().map(|arg| arg.0).collect::<Vec<_>>().join(" ");
            sink.borrow_mut().extend(line.split('\n').map(str::to_string));
        })?;
        console.set(*method, log)?;
    }
    ctx.globals().set("console", console)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(2_000);

    #[test]
    fn test_captures_console_output() {
        let lines = evaluate("console.log('a', 1, true); console.error('b\\nc');", TIMEOUT).unwrap();
        assert_eq!(lines, vec!["a 1 true", "b", "c"]);
    }

    #[test]
    fn test_runtime_error_is_printed() {
        let lines = evaluate("console.log('before'); missing();", TIMEOUT).unwrap();
        assert_eq!(lines[0], "before");
        assert!(lines[1].starts_with("Uncaught"));
        assert!(lines[1].contains("missing"));
    }

    #[test]
    fn test_syntax_error_is_printed() {
        let lines = evaluate("let = ;", TIMEOUT).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Uncaught"));
    }

    #[test]
    fn test_infinite_loop_is_interrupted() {
        let lines = evaluate("while (true) {}", Duration::from_millis(100)).unwrap();
        assert_eq!(lines, vec!["Uncaught script timed out after 100ms"]);
    }

    #[test]
    fn test_promise_jobs_run_after_the_script() {
        let src = "console.log('sync');\nPromise.resolve(1).then(v => console.log('then', v));\n(async () => { await null; console.log('after await'); })();";
        let lines = evaluate(src, TIMEOUT).unwrap();
        assert_eq!(lines, vec!["sync", "then 1", "after await"]);
    }

    #[test]
    fn test_unhandled_rejection_is_printed() {
        let src = "(async () => { await null; throw new Error('boom'); })();\nPromise.reject(new Error('caught')).catch(e => console.log('handled', e.message));";
        let lines = evaluate(src, TIMEOUT).unwrap();
        assert_eq!(lines, vec!["handled caught", "Uncaught (in promise) Error: boom"]);
    }

    #[test]
    fn test_endless_job_chain_is_stopped() {
        let lines = evaluate("const spin = () => Promise.resolve().then(spin); spin();", Duration::from_millis(100)).unwrap();
        assert_eq!(lines, vec!["Uncaught script timed out after 100ms"]);
    }

    #[test]
    fn test_typescript_is_erased_first() {
        let file = ProjectFile::new(
            "greet.ts",
            "export function greet(name: string): string { return `hi ${name}`; }\nconsole.log(greet('ts'));",
        );
        assert_eq!(run_file(&file, TIMEOUT), vec!["hi ts"]);
    }
}
