use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use super::normalize::{normalize_with, ExportBinding, ImportBinding, NormalizeOptions, DEFAULT_EXPORT_IDENT};
use super::resolve::resolve_component_name;
use crate::project::{FileSet, ProjectFile};
use crate::templates;
use crate::util::{self, js_string};

const ICON_LIBRARY: &str = "lucide-react";
const UI_FRAMEWORK: &[&str] = &["react", "react/jsx-runtime"];
const DOM_FRAMEWORK: &[&str] = &["react-dom", "react-dom/client"];
const SCRIPT_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs", "cjs", "mts", "cts"];

/// One normalized module, ready to be linked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub file_name: String,
    pub file_stem: String,
    /// Registry key: the project path without its extension.
    pub module_key: String,
    pub exported_symbol_name: String,
    pub normalized_code: String,
    pub imports: Vec<ImportBinding>,
    pub exports: Vec<ExportBinding>,
    pub default_export: Option<String>,
}

impl ComponentDescriptor {
    pub fn from_file(file: &ProjectFile) -> Self {
        let normalized = normalize_with(&file.content, NormalizeOptions::for_file(&file.name));
        // A named default export is authoritative; otherwise guess from the code.
        let exported_symbol_name = match normalized.default_export.as_deref() {
            Some(name) if name != DEFAULT_EXPORT_IDENT => name.to_string(),
            _ => resolve_component_name(&normalized.code, &file.name),
        };
        Self {
            file_name: file.name.clone(),
            file_stem: file.stem(),
            module_key: module_key(&file.name),
            exported_symbol_name,
            normalized_code: normalized.code,
            imports: normalized.imports,
            exports: normalized.exports,
            default_export: normalized.default_export,
        }
    }
}

/// Descriptors for every script file except `entry`, in lexical file-name order.
pub fn describe_modules(files: &FileSet, entry: &ProjectFile) -> Vec<ComponentDescriptor> {
    let mut modules: Vec<_> = files
        .iter()
        .filter(|f| f.language.is_script() && f.name != entry.name && !f.name.ends_with(".d.ts"))
        .map(ComponentDescriptor::from_file)
        .collect();
    modules.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    modules
}

/// `components/Header/index.tsx` -> `components/Header/index`.
pub fn module_key(path: &str) -> String {
    let path = normalize_path(path);
    match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('/') && !ext.contains('/') => stem.to_string(),
        _ => path,
    }
}

/// Collapses `.` and `..` segments and leading or doubled slashes.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn strip_script_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if SCRIPT_EXTENSIONS.contains(&ext) && !stem.ends_with('/') => stem,
        _ => path,
    }
}

/// Keys of every linked module, used to resolve import specifiers.
struct ModuleIndex<'a> {
    keys: BTreeSet<&'a str>,
    by_stem: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> ModuleIndex<'a> {
    fn new(modules: impl IntoIterator<Item = &'a ComponentDescriptor>) -> Self {
        let mut keys = BTreeSet::new();
        let mut by_stem: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for module in modules {
            if keys.insert(module.module_key.as_str()) {
                by_stem
                    .entry(module.file_stem.as_str())
                    .or_default()
                    .push(module.module_key.as_str());
            }
        }
        Self { keys, by_stem }
    }

    /// Paths `source` may name when imported from the module keyed `importer`.
    /// Relative specifiers resolve against the importer's directory; `@/` and
    /// `~/` resolve against the project root and then `src/`.
    fn candidates(source: &str, importer: &str) -> Vec<String> {
        let bases = if source.starts_with('.') {
            let dir = importer.rsplit_once('/').map_or("", |(dir, _)| dir);
            vec![normalize_path(&format!("{dir}/{source}"))]
        } else if let Some(rest) = source.strip_prefix("@/").or_else(|| source.strip_prefix("~/")) {
            let rest = normalize_path(rest);
            vec![rest.clone(), format!("{}/{rest}", util::SOURCE_DIR)]
        } else {
            vec![normalize_path(source)]
        };
        bases
            .iter()
            .flat_map(|base| {
                let base = strip_script_extension(base);
                [base.to_string(), format!("{base}/index")]
            })
            .collect()
    }

    fn resolve(&self, source: &str, importer: &str) -> Option<&'a str> {
        if let Some(key) = Self::candidates(source, importer)
            .iter()
            .find_map(|candidate| self.keys.get(candidate.as_str()).copied())
        {
            return Some(key);
        }
        if !is_local_source(source) && source.contains('/') {
            return None;
        }
        match self.by_stem.get(util::file_stem(source).as_str())?.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Produces one script: icon shims, the loader, each module definition, the
/// entry definition and the render invocation.
///
/// Every module becomes a factory keyed by its project path. The loader runs
/// a factory on first `__require` and caches its exports object before the
/// factory runs, so import cycles terminate. Only the entry is required
/// eagerly, right before the render call.
pub fn link(icon_registry: &str, modules: &[ComponentDescriptor], entry: &ComponentDescriptor) -> String {
    let mut ordered: Vec<&ComponentDescriptor> = modules.iter().collect();
    ordered.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let index = ModuleIndex::new(ordered.iter().copied().chain(std::iter::once(entry)));

    let mut out = String::new();
    out.push_str(icon_registry);
    out.push('\n');
    out.push_str(LOADER);
    for module in ordered.iter().copied().chain(std::iter::once(entry)) {
        write_module(&mut out, module, &index);
    }
    write_render(&mut out, entry);
    tracing::debug!(
        modules = modules.len(),
        entry = %entry.file_name,
        symbol = %entry.exported_symbol_name,
        "linked preview script"
    );
    out
}

const LOADER: &str = r#"const __modules = Object.create(null);
const __cache = Object.create(null);
function __define(name, factory) {
  __modules[name] = factory;
}
function __require(name) {
  if (name in __cache) return __cache[name];
  const exports = {};
  __cache[name] = exports;
  const factory = __modules[name];
  if (!factory) {
    console.warn("[preview] module not found: " + name);
    return exports;
  }
  Object.assign(exports, factory(__require));
  return exports;
}
function __interop(m) {
  return m && Object.prototype.hasOwnProperty.call(m, "default") ? m.default : m;
}
"#;

fn safe_ref(name: &str) -> String {
    format!("typeof {name} !== \"undefined\" ? {name} : undefined")
}

fn is_local_source(source: &str) -> bool {
    source.starts_with('.') || source.starts_with('/') || source.starts_with("@/") || source.starts_with("~/")
}

fn is_style_source(source: &str) -> bool {
    matches!(
        util::extension(source).as_deref(),
        Some("css" | "scss" | "sass" | "less")
    )
}

/// JavaScript expression yielding the module object an import binds from.
fn import_target(source: &str, importer: &str, index: &ModuleIndex<'_>) -> String {
    if UI_FRAMEWORK.contains(&source) {
        return "window.React".to_string();
    }
    if DOM_FRAMEWORK.contains(&source) {
        return "window.ReactDOM".to_string();
    }
    if source == ICON_LIBRARY {
        return templates::icons::REGISTRY_IDENT.to_string();
    }
    if let Some(key) = index.resolve(source, importer) {
        return format!("__require({})", js_string(key));
    }
    if is_local_source(source) {
        // Unresolved: the loader warns and yields an empty module.
        let missing = ModuleIndex::candidates(source, importer)
            .into_iter()
            .next()
            .unwrap_or_default();
        return format!("__require({})", js_string(&missing));
    }
    format!(
        "(console.warn({}), {{}})",
        js_string(&format!("[preview] package \"{source}\" is not available in the preview sandbox"))
    )
}

fn write_imports(out: &mut String, module: &ComponentDescriptor, index: &ModuleIndex<'_>) {
    for binding in &module.imports {
        if binding.is_side_effect_only() || is_style_source(&binding.source) {
            continue;
        }
        let target = import_target(&binding.source, &module.module_key, index);
        if let Some(default) = &binding.default {
            let _ = writeln!(out, "  const {default} = __interop({target});");
        }
        if let Some(namespace) = &binding.namespace {
            let _ = writeln!(out, "  const {namespace} = {target};");
        }
        if !binding.named.is_empty() {
            let fields: Vec<String> = binding
                .named
                .iter()
                .map(|(imported, local)| {
                    if imported == local {
                        local.clone()
                    } else {
                        format!("{}: {local}", js_string(imported))
                    }
                })
                .collect();
            let _ = writeln!(out, "  const {{ {} }} = {target};", fields.join(", "));
        }
    }
}

fn write_module(out: &mut String, module: &ComponentDescriptor, index: &ModuleIndex<'_>) {
    let _ = writeln!(
        out,
        "// {}\n__define({}, function (__require) {{",
        module.file_name,
        js_string(&module.module_key)
    );
    write_imports(out, module, index);
    out.push_str(&module.normalized_code);
    if !module.normalized_code.ends_with('\n') {
        out.push('\n');
    }

    let default = match module.default_export.as_deref() {
        Some(name) => safe_ref(name),
        None => safe_ref(&module.exported_symbol_name),
    };
    let mut fields = vec![format!("default: {default}")];
    let mut seen = BTreeSet::from(["default".to_string()]);
    for export in &module.exports {
        if seen.insert(export.exported.clone()) {
            fields.push(format!("{}: {}", js_string(&export.exported), safe_ref(&export.local)));
        }
    }
    for name in [module.exported_symbol_name.as_str(), DEFAULT_EXPORT_IDENT] {
        if seen.insert(name.to_string()) {
            fields.push(format!("{}: {}", js_string(name), safe_ref(name)));
        }
    }
    let _ = writeln!(out, "  return {{ {} }};\n}});", fields.join(", "));
}

/// The default export mounts first; the resolved name and `App` are fallbacks.
fn write_render(out: &mut String, entry: &ComponentDescriptor) {
    let symbol = js_string(&entry.exported_symbol_name);
    let _ = write!(
        out,
        r#"const __entry = __require({key});
const __Root = __entry.default || __entry[{symbol}] || __entry[{synthetic}] || __entry.App;
if (typeof __Root !== "function" && !(__Root && __Root.$$typeof)) {{
  window.__previewFail("No component to render: expected a default export, " + {symbol} + " or App in " + {file});
}} else {{
  ReactDOM.createRoot(document.getElementById("root")).render(
    React.createElement({boundary}, null, React.createElement(__Root))
  );
}}
"#,
        key = js_string(&entry.module_key),
        synthetic = js_string(DEFAULT_EXPORT_IDENT),
        file = js_string(&entry.file_name),
        boundary = templates::ERROR_BOUNDARY_IDENT,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, content: &str) -> ComponentDescriptor {
        ComponentDescriptor::from_file(&ProjectFile::new(name, content))
    }

    #[test]
    fn test_entry_symbol_from_default_export() {
        let entry = descriptor("App.tsx", "export default function App(){ return <div>hi</div>; }");
        assert_eq!(entry.exported_symbol_name, "App");
        let script = link("", &[], &entry);
        assert!(script.contains(r#"__entry["App"]"#));
        assert!(script.contains("function App(){ return <div>hi</div>; }"));
    }

    #[test]
    fn test_anonymous_default_export_falls_back_to_resolver() {
        let entry = descriptor("Home.jsx", "export default () => <main/>;");
        assert_eq!(entry.default_export.as_deref(), Some(DEFAULT_EXPORT_IDENT));
        assert_eq!(entry.exported_symbol_name, "Home");
        let script = link("", &[], &entry);
        assert!(script.contains("default: typeof __default_export"));
    }

    #[test]
    fn test_modules_are_ordered_and_entry_is_last() {
        let b = descriptor("components/Zeta.tsx", "export const Zeta = () => null;");
        let a = descriptor("components/Alpha.tsx", "export function Alpha() { return null; }");
        let entry = descriptor("App.tsx", "export default function App() { return null; }");
        let script = link("", &[b, a], &entry);
        let alpha = script.find(r#"__define("components/Alpha""#).unwrap();
        let zeta = script.find(r#"__define("components/Zeta""#).unwrap();
        let app = script.find(r#"__define("App""#).unwrap();
        assert!(alpha < zeta && zeta < app);
        assert!(script.find("const __entry").unwrap() > app);
    }

    #[test]
    fn test_imports_are_rewritten() {
        let entry = descriptor(
            "App.tsx",
            "import React, { useState } from 'react';\nimport { Check } from 'lucide-react';\nimport Button from './components/Button';\nimport { Card as Panel } from '@/components/ui/card';\nimport axios from 'axios';\nimport './App.css';\nexport default function App() { return <Button/>; }\n",
        );
        let button = descriptor("components/Button.tsx", "export default function Button() { return null; }");
        let card = descriptor("components/ui/card.tsx", "export function Card() { return null; }");
        let script = link("", &[button, card], &entry);
        assert!(script.contains("const React = __interop(window.React);"));
        assert!(script.contains("const { useState } = window.React;"));
        assert!(script.contains(&format!("const {{ Check }} = {};", templates::icons::REGISTRY_IDENT)));
        assert!(script.contains(r#"const Button = __interop(__require("components/Button"));"#));
        assert!(script.contains(r#"const { "Card": Panel } = __require("components/ui/card");"#));
        assert!(script.contains(r#"package \"axios\" is not available"#));
        assert!(!script.contains("App.css\")"));
    }

    #[test]
    fn test_describe_modules_skips_entry_and_non_scripts() {
        let files = FileSet::from_files([
            ProjectFile::new("App.tsx", "export default function App() { return null; }"),
            ProjectFile::new("styles.css", "body {}"),
            ProjectFile::new("b.ts", "export const b = 1;"),
            ProjectFile::new("a.js", "export const a = 1;"),
            ProjectFile::new("types.d.ts", "declare const x: number;"),
        ]);
        let entry = files.get("App.tsx").unwrap().clone();
        let names: Vec<_> = describe_modules(&files, &entry)
            .into_iter()
            .map(|m| m.file_name)
            .collect();
        assert_eq!(names, vec!["a.js", "b.ts"]);
    }

    #[test]
    fn test_module_keys_are_project_paths() {
        assert_eq!(module_key("components/Header/index.tsx"), "components/Header/index");
        assert_eq!(module_key("./src/App.jsx"), "src/App");
        assert_eq!(module_key("lib.v2/README"), "lib.v2/README");
        assert_eq!(normalize_path("src/pages/../lib/./utils"), "src/lib/utils");
    }

    #[test]
    fn test_same_stem_files_get_distinct_modules() {
        let entry = descriptor(
            "App.tsx",
            "import Header from './components/Header';\nimport Footer from './components/Footer/index';\nexport default function App() { return <Header/>; }",
        );
        let header = descriptor("components/Header/index.tsx", "export default function Header() { return <h1/>; }");
        let footer = descriptor("components/Footer/index.tsx", "export default function Footer() { return <p/>; }");
        let script = link("", &[header, footer], &entry);
        assert!(script.contains(r#"__define("components/Header/index""#));
        assert!(script.contains(r#"__define("components/Footer/index""#));
        assert!(!script.contains(r#"__define("index""#));
        assert!(script.contains(r#"const Header = __interop(__require("components/Header/index"));"#));
        assert!(script.contains(r#"const Footer = __interop(__require("components/Footer/index"));"#));
    }

    #[test]
    fn test_relative_imports_resolve_against_importer() {
        let entry = descriptor(
            "src/App.tsx",
            "import { Card } from './ui/Card';\nexport default function App() { return <Card/>; }",
        );
        let card = descriptor(
            "src/ui/Card.tsx",
            "import { cn } from '../lib/utils';\nimport { Badge } from '@/ui/Badge';\nexport const Card = () => <div className={cn()}><Badge/></div>;",
        );
        let badge = descriptor("src/ui/Badge.tsx", "export const Badge = () => <span/>;");
        let utils = descriptor("src/lib/utils.ts", "export const cn = () => '';");
        let script = link("", &[card, badge, utils], &entry);
        assert!(script.contains(r#"const { Card } = __require("src/ui/Card");"#));
        assert!(script.contains(r#"const { cn } = __require("src/lib/utils");"#));
        assert!(script.contains(r#"const { Badge } = __require("src/ui/Badge");"#));
        assert!(script.contains(r#"const __entry = __require("src/App");"#));
    }

    #[test]
    fn test_bare_stem_fallback_requires_a_unique_match() {
        let entry = descriptor(
            "App.tsx",
            "import Button from '../Button';\nimport { x } from './missing/Item';\nexport default function App() { return null; }",
        );
        let button = descriptor("components/Button.tsx", "export default function Button() { return null; }");
        let a = descriptor("a/Item.tsx", "export const x = 1;");
        let b = descriptor("b/Item.tsx", "export const x = 2;");
        let script = link("", &[button, a, b], &entry);
        assert!(script.contains(r#"const Button = __interop(__require("components/Button"));"#));
        assert!(script.contains(r#"const { x } = __require("missing/Item");"#));
    }

    #[test]
    fn test_default_export_identifier_is_mounted() {
        let entry = descriptor(
            "App.tsx",
            "function formatDate(d: Date) { return d.toISOString(); }\nconst App = () => <p>{formatDate(new Date())}</p>;\nexport default App;\n",
        );
        assert_eq!(entry.default_export.as_deref(), Some("App"));
        assert_eq!(entry.exported_symbol_name, "App");
        let script = link("", &[], &entry);
        assert!(script.contains("return { default: typeof App !== \"undefined\" ? App : undefined"));
        assert!(script.contains("const __Root = __entry.default || __entry[\"App\"]"));
    }
}
