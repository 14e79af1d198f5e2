use std::collections::BTreeSet;

use crate::manifest;
use crate::project::{FileSet, ProjectFile};
use crate::util::SOURCE_DIR;

pub const HELP: &[&str] = &[
    "Available commands:",
    "  clear              Clear the terminal",
    "  ls                 List top-level files and folders",
    "  tree               Show every file in the project",
    "  cat <file>         Print a file",
    "  pwd                Print the current directory",
    "  echo <text>        Print text",
    "  npm install <pkg>  Add a package to package.json",
    "  node [file]        Run a JavaScript or TypeScript file",
    "  python [file]      Python information",
    "  help               Show this list",
];

/// Unique top-level path segments, sorted.
pub fn ls(files: &FileSet) -> Vec<String> {
    let segments: BTreeSet<&str> = files
        .iter()
        .filter_map(|f| f.name.split('/').find(|s| !s.is_empty()))
        .collect();
    segments.into_iter().map(str::to_string).collect()
}

pub fn tree(files: &FileSet) -> Vec<String> {
    let mut names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    names.sort_unstable();
    let last = names.len().saturating_sub(1);
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let branch = if i == last { "└── " } else { "├── " };
            format!("{branch}{name}")
        })
        .collect()
}

/// Looks a path up exactly, then under the conventional source directory.
pub fn find_file<'a>(files: &'a FileSet, path: &str) -> Option<&'a ProjectFile> {
    let path = path.trim_start_matches("./");
    files
        .get(path)
        .or_else(|| files.get(&format!("{SOURCE_DIR}/{path}")))
}

pub fn cat(files: &FileSet, path: Option<&str>) -> Vec<String> {
    let Some(path) = path else {
        return vec!["cat: missing file operand".to_string()];
    };
    match find_file(files, path) {
        Some(file) => file.content.lines().map(str::to_string).collect(),
        None => vec![format!("cat: {path}: No such file or directory")],
    }
}

pub fn python(args: &[String]) -> Vec<String> {
    let mut lines = vec![
        "Python 3.12 (simulated)".to_string(),
        "This terminal does not run Python. Choose the Python stack to run main.py in the preview.".to_string(),
    ];
    if let Some(path) = args.first() {
        lines.push(format!("python: {path} was not executed"));
    }
    lines
}

pub fn node_banner() -> Vec<String> {
    vec![
        "Welcome to Node.js (simulated).".to_string(),
        "Run `node <file>` to execute a file; interactive mode is not available.".to_string(),
    ]
}

pub fn npm_usage() -> Vec<String> {
    vec![
        "Usage: npm install <package>[@version] ...".to_string(),
        "       npm i <package>[@version] ...".to_string(),
    ]
}

/// Reply to `npm install` without package names.
pub fn npm_up_to_date(files: &FileSet) -> Vec<String> {
    let count = manifest::dependency_count(files);
    let noun = if count == 1 { "package" } else { "packages" };
    vec![format!("up to date, audited {count} {noun} in 1s")]
}
