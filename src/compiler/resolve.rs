use once_cell::sync::Lazy;
use regex::Regex;

use crate::util;

static FUNCTION_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bfunction\s+([A-Z][\w$]*)\s*\(").expect("valid regex"));

static ARROW_BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:const|let)\s+([A-Z][\w$]*)\s*=\s*(?:async\s*)?(?:\([^()]*\)|[A-Za-z_$][\w$]*)\s*=>")
        .expect("valid regex")
});

/// Best-guess component name for a normalized module: the first capitalised
/// `function Name(` declaration, then the first capitalised
/// `const|let Name = (...) =>` binding, then the file stem.
pub fn resolve_component_name(normalized: &str, file_name: &str) -> String {
    [&*FUNCTION_DECL, &*ARROW_BINDING]
        .into_iter()
        .find_map(|re| re.captures(normalized).map(|caps| caps[1].to_string()))
        .unwrap_or_else(|| util::file_stem(file_name))
}
