pub mod icons;

use crate::config::PreviewConfig;
use crate::project::{FileSet, Stack};
use crate::util::escape_html;

/// Global name of the render-time error boundary component.
pub const ERROR_BOUNDARY_IDENT: &str = "__PreviewErrorBoundary";

/// Id of the element every stack mounts into.
pub const MOUNT_ID: &str = "root";

/// Returns the `<head>` tags that load the styling engine, the UI runtime and
/// the in-browser script compiler.
pub fn cdn_head(config: &PreviewConfig) -> String {
    format!(
        r#"    <script src="{styling}"></script>
    <script crossorigin src="{ui}"></script>
    <script crossorigin src="{dom}"></script>
    <script src="{compiler}"></script>
"#,
        styling = escape_html(&config.styling_engine_url),
        ui = escape_html(&config.ui_runtime_url),
        dom = escape_html(&config.dom_runtime_url),
        compiler = escape_html(&config.script_compiler_url),
    )
}

/// Returns the tag that loads only the styling engine.
pub fn styling_engine_tag(config: &PreviewConfig) -> String {
    format!(
        r#"<script src="{}"></script>"#,
        escape_html(&config.styling_engine_url)
    )
}

/// Returns minimal base styles shared by every generated document.
pub fn base_styles() -> &'static str {
    r#"html, body { margin: 0; padding: 0; min-height: 100%; }
#root { min-height: 100vh; }
.preview-error { font-family: ui-monospace, SFMono-Regular, Menlo, monospace; color: #b91c1c; background: #fef2f2; border: 1px solid #fecaca; border-radius: 6px; padding: 16px; margin: 16px; white-space: pre-wrap; }
.preview-error h2 { margin: 0 0 8px; font-size: 16px; }
"#
}

/// Returns the script that turns uncaught errors into a visible message in the
/// mount point. Defines `window.__previewFail` for other scripts to use.
pub fn error_handler_script() -> &'static str {
    r#"(function () {
  function escape(text) {
    return String(text).replace(/[&<>"']/g, function (c) {
      return { "&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;" }[c];
    });
  }
  window.__previewFail = function (message) {
    var root = document.getElementById("root") || document.body;
    root.innerHTML = '<div class="preview-error"><h2>Preview error</h2>' + escape(message) + "</div>";
  };
  window.addEventListener("error", function (event) {
    var message = event.error && event.error.message ? event.error.message : event.message;
    window.__previewFail(message || "Unknown error");
  });
  window.addEventListener("unhandledrejection", function (event) {
    var reason = event.reason && event.reason.message ? event.reason.message : event.reason;
    window.__previewFail("Unhandled promise rejection: " + reason);
  });
})();
"#
}

/// Returns the bootstrap that exposes the framework hooks as globals and
/// defines the render-time error boundary.
pub fn bootstrap_script() -> String {
    format!(
        r#"(function () {{
  var R = window.React;
  ["useState", "useEffect", "useRef", "useMemo", "useCallback", "useContext", "useReducer",
   "useLayoutEffect", "useId", "createContext", "forwardRef", "memo", "Fragment"].forEach(function (name) {{
    if (R && !(name in window)) window[name] = R[name];
  }});
  class PreviewErrorBoundary extends R.Component {{
    constructor(props) {{
      super(props);
      this.state = {{ error: null }};
    }}
    static getDerivedStateFromError(error) {{
      return {{ error: error }};
    }}
    componentDidCatch(error, info) {{
      console.error(error, info && info.componentStack);
    }}
    render() {{
      if (this.state.error) {{
        return R.createElement(
          "div",
          {{ className: "preview-error" }},
          R.createElement("h2", null, "Render error"),
          String(this.state.error && this.state.error.message ? this.state.error.message : this.state.error)
        );
      }}
      return this.props.children;
    }}
  }}
  window.{ERROR_BOUNDARY_IDENT} = PreviewErrorBoundary;
}})();
"#
    )
}

/// Returns a self-contained document explaining that no entry file matched.
pub fn diagnostic_document(stack: Stack, files: &FileSet) -> String {
    let expected: String = stack
        .entry_candidates()
        .iter()
        .map(|name| format!("        <li><code>{}</code></li>\n", escape_html(name)))
        .collect();
    let present: String = if files.is_empty() {
        "        <li><em>no files yet</em></li>\n".to_string()
    } else {
        files
            .iter()
            .map(|f| format!("        <li><code>{}</code></li>\n", escape_html(&f.name)))
            .collect()
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>Preview unavailable</title>
    <style>
{styles}    </style>
  </head>
  <body>
    <div id="{MOUNT_ID}" class="preview-error" data-preview-diagnostic="missing-entry">
      <h2>No entry file for the {stack} stack</h2>
      <p>Add one of:</p>
      <ul>
{expected}      </ul>
      <p>Files in this project:</p>
      <ul>
{present}      </ul>
    </div>
  </body>
</html>
"#,
        styles = base_styles(),
        stack = stack.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectFile;

    #[test]
    fn test_diagnostic_lists_candidates_and_files() {
        let files = FileSet::from_files([ProjectFile::new("notes/<todo>.md", "x")]);
        let doc = diagnostic_document(Stack::React, &files);
        assert!(doc.contains("<code>App.tsx</code>"));
        assert!(doc.contains("<code>notes/&lt;todo&gt;.md</code>"));
        assert!(doc.contains("data-preview-diagnostic=\"missing-entry\""));
    }

    #[test]
    fn test_diagnostic_for_empty_project() {
        let doc = diagnostic_document(Stack::NextJs, &FileSet::new());
        assert!(doc.contains("no files yet"));
        assert!(doc.contains("next-js stack"));
    }

    #[test]
    fn test_bootstrap_defines_boundary() {
        assert!(bootstrap_script().contains("window.__PreviewErrorBoundary = PreviewErrorBoundary;"));
    }

    #[test]
    fn test_cdn_head_uses_config() {
        let mut config = PreviewConfig::default();
        config.styling_engine_url = "https://example.test/tw.js?a=1&b=2".into();
        let head = cdn_head(&config);
        assert!(head.contains("https://example.test/tw.js?a=1&amp;b=2"));
        assert!(head.contains(&config.script_compiler_url));
    }
}
