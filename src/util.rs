/// Directory segments that conventionally hold sources and are ignored when
/// deriving a module name from a file path.
pub const SOURCE_PREFIXES: &[&str] = &["src/", "app/", "pages/", "components/", "lib/"];

/// The conventional source directory that `cat` falls back to.
pub const SOURCE_DIR: &str = "src";

/// Returns the last path segment of a `/`-separated name.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Returns the extension (without the dot) of the last path segment, lowercased.
pub fn extension(path: &str) -> Option<String> {
    let base = base_name(path);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Strips leading `./` and known source directory prefixes, then the extension.
///
/// `src/components/Button.tsx` -> `Button`, `./App.jsx` -> `App`.
pub fn file_stem(path: &str) -> String {
    let mut rest = path.trim_start_matches("./");
    loop {
        match SOURCE_PREFIXES.iter().find(|p| rest.starts_with(*p)) {
            Some(prefix) => rest = &rest[prefix.len()..],
            None => break,
        }
    }
    let base = base_name(rest);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Makes script text safe to embed in an inline `<script>` element.
pub fn escape_inline_script(code: &str) -> String {
    code.replace("</script", "<\\/script")
        .replace("</SCRIPT", "<\\/SCRIPT")
}

/// Quotes a string as a JavaScript string literal.
pub fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
