use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{PreviewError, Result};
use crate::util;

/// Language tag carried by every project file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Css,
    Html,
    Json,
    Python,
    Markdown,
    PlainText,
}

impl Language {
    pub fn from_path(path: &str) -> Self {
        match util::extension(path).as_deref() {
            Some("ts" | "tsx" | "mts" | "cts") => Language::TypeScript,
            Some("js" | "jsx" | "mjs" | "cjs") => Language::JavaScript,
            Some("css") => Language::Css,
            Some("html" | "htm") => Language::Html,
            Some("json") => Language::Json,
            Some("py") => Language::Python,
            Some("md" | "markdown") => Language::Markdown,
            _ => Language::PlainText,
        }
    }

    pub fn is_script(self) -> bool {
        matches!(self, Language::TypeScript | Language::JavaScript)
    }
}

/// One in-memory source file. Edits replace the whole file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub name: String,
    pub content: String,
    pub language: Language,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let language = Language::from_path(&name);
        Self {
            name,
            content: content.into(),
            language,
        }
    }

    pub fn stem(&self) -> String {
        util::file_stem(&self.name)
    }
}

/// Target framework/runtime of a project, fixed once the project exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stack {
    React,
    NextJs,
    Html,
    Python,
    ReactNative,
}

impl Stack {
    pub const ALL: [Stack; 5] = [
        Stack::React,
        Stack::NextJs,
        Stack::Html,
        Stack::Python,
        Stack::ReactNative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stack::React => "react",
            Stack::NextJs => "next-js",
            Stack::Html => "html",
            Stack::Python => "python",
            Stack::ReactNative => "react-native",
        }
    }

    /// Entry-file names in priority order.
    pub fn entry_candidates(self) -> &'static [&'static str] {
        const COMPONENT: &[&str] = &[
            "App.tsx",
            "App.jsx",
            "App.ts",
            "App.js",
            "src/App.tsx",
            "src/App.jsx",
            "src/App.ts",
            "src/App.js",
        ];
        match self {
            Stack::React => COMPONENT,
            Stack::NextJs => &[
                "app/page.tsx",
                "app/page.jsx",
                "src/app/page.tsx",
                "pages/index.tsx",
                "pages/index.jsx",
                "App.tsx",
                "App.jsx",
                "src/App.tsx",
                "src/App.jsx",
            ],
            Stack::Html => &["index.html", "public/index.html", "src/index.html"],
            Stack::Python => &["main.py", "app.py", "src/main.py"],
            Stack::ReactNative => &["App.tsx", "App.js", "App.jsx", "src/App.tsx", "src/App.js"],
        }
    }

    /// Extension accepted as a last-resort entry when no candidate name matches.
    fn fallback_extension(self) -> Option<&'static str> {
        match self {
            Stack::Html => Some("html"),
            Stack::Python => Some("py"),
            _ => None,
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stack {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Stack::ALL
            .into_iter()
            .find(|stack| stack.as_str() == normalized || stack.as_str().replace('-', "") == normalized)
            .ok_or_else(|| PreviewError::Custom(format!("unknown stack: {s}")))
    }
}

/// Ordered set of project files with unique names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet {
    files: Vec<ProjectFile>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: impl IntoIterator<Item = ProjectFile>) -> Self {
        let mut set = Self::new();
        for file in files {
            set.upsert(file);
        }
        set
    }

    /// Inserts a file or replaces the one with the same name in place.
    pub fn upsert(&mut self, file: ProjectFile) {
        if let Some(existing) = self.files.iter_mut().find(|f| f.name == file.name) {
            *existing = file;
        } else {
            self.files.push(file);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ProjectFile> {
        let idx = self.files.iter().position(|f| f.name == name)?;
        Some(self.files.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Finds the entry file for `stack`, if any file matches its convention.
    pub fn entry_for(&self, stack: Stack) -> Option<&ProjectFile> {
        for candidate in stack.entry_candidates() {
            if let Some(file) = self.get(candidate) {
                return Some(file);
            }
        }
        let ext = stack.fallback_extension()?;
        self.files
            .iter()
            .find(|f| util::extension(&f.name).as_deref() == Some(ext))
    }

    /// Reads every regular file under `root` into a file set, skipping
    /// dependency and VCS directories.
    pub fn load_dir(root: &Path) -> Result<Self> {
        let mut set = Self::new();
        collect_files(root, root, &mut set)?;
        set.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(set)
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a ProjectFile;
    type IntoIter = std::slice::Iter<'a, ProjectFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", "target"];

fn collect_files(root: &Path, dir: &Path, set: &mut FileSet) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name) {
                collect_files(root, &path, set)?;
            }
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            // Binary assets have no place in the preview.
            continue;
        };
        let rel = path
            .strip_prefix(root)
            .map_err(|e| PreviewError::Custom(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        set.upsert(ProjectFile::new(rel, content));
    }
    Ok(())
}
