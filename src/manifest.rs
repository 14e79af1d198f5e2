use serde_json::{Map, Value};

use crate::error::{PreviewError, Result};
use crate::project::{FileSet, ProjectFile};

pub const MANIFEST_FILE: &str = "package.json";

/// A package requested on the command line, e.g. `axios`, `axios@1.6.0`,
/// `@tanstack/react-query@5`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
}

impl PackageSpec {
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() || spec.starts_with('-') {
            return None;
        }
        // Scoped names start with '@', so the version separator is the last '@'
        // past the first character.
        let tail = spec.get(1..).unwrap_or("");
        let (name, version) = match tail.rfind('@') {
            Some(idx) => {
                let split = idx + 1;
                (&spec[..split], &spec[split + 1..])
            }
            None => (spec, ""),
        };
        if name.is_empty() || name.ends_with('/') {
            return None;
        }
        let version = if version.is_empty() {
            "latest".to_string()
        } else {
            version.to_string()
        };
        Some(Self {
            name: name.to_string(),
            version,
        })
    }
}

fn empty_manifest() -> Value {
    serde_json::json!({
        "name": "app",
        "private": true,
        "version": "0.0.0",
        "dependencies": {}
    })
}

/// Records `spec` under `dependencies` in `package.json`, creating the manifest
/// when absent. Returns `true` when the package was newly added.
pub fn add_dependency(files: &mut FileSet, spec: &PackageSpec) -> Result<bool> {
    let mut manifest = match files.get(MANIFEST_FILE) {
        Some(file) if !file.content.trim().is_empty() => serde_json::from_str(&file.content)?,
        _ => empty_manifest(),
    };
    let root = manifest
        .as_object_mut()
        .ok_or_else(|| PreviewError::Custom("package.json is not an object".into()))?;
    let deps = root
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));
    let deps = deps
        .as_object_mut()
        .ok_or_else(|| PreviewError::Custom("package.json dependencies is not an object".into()))?;

    let added = !deps.contains_key(&spec.name);
    let version = if spec.version == "latest" {
        "latest".to_string()
    } else {
        format!("^{}", spec.version.trim_start_matches('^'))
    };
    deps.insert(spec.name.clone(), Value::String(version));

    let content = serde_json::to_string_pretty(&manifest)? + "\n";
    files.upsert(ProjectFile::new(MANIFEST_FILE, content));
    tracing::debug!(package = %spec.name, added, "updated dependency manifest");
    Ok(added)
}

/// Number of entries under `dependencies`, zero when the manifest is missing or malformed.
pub fn dependency_count(files: &FileSet) -> usize {
    files
        .get(MANIFEST_FILE)
        .and_then(|f| serde_json::from_str::<Value>(&f.content).ok())
        .and_then(|v| v.get("dependencies").and_then(Value::as_object).map(Map::len))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_spec() {
        assert_eq!(
            PackageSpec::parse("axios"),
            Some(PackageSpec {
                name: "axios".into(),
                version: "latest".into()
            })
        );
        let scoped = PackageSpec::parse("@tanstack/react-query@5").unwrap();
        assert_eq!(scoped.name, "@tanstack/react-query");
        assert_eq!(scoped.version, "5");
        assert_eq!(PackageSpec::parse("@scope/pkg").unwrap().name, "@scope/pkg");
        assert_eq!(PackageSpec::parse("--save-dev"), None);
        assert_eq!(PackageSpec::parse(""), None);
    }

    #[test]
    fn test_add_dependency_creates_manifest() {
        let mut files = FileSet::new();
        let added = add_dependency(&mut files, &PackageSpec::parse("axios").unwrap()).unwrap();
        assert!(added);
        assert_eq!(dependency_count(&files), 1);
        assert!(files.get(MANIFEST_FILE).unwrap().content.contains("\"axios\": \"latest\""));
    }

    #[test]
    fn test_add_dependency_is_idempotent() {
        let mut files = FileSet::from_files([ProjectFile::new(
            MANIFEST_FILE,
            r#"{"name":"demo","dependencies":{"react":"^18.2.0"}}"#,
        )]);
        let spec = PackageSpec::parse("axios@1.6.0").unwrap();
        assert!(add_dependency(&mut files, &spec).unwrap());
        assert!(!add_dependency(&mut files, &spec).unwrap());
        let content = &files.get(MANIFEST_FILE).unwrap().content;
        assert_eq!(content.matches("\"axios\"").count(), 1);
        assert!(content.contains("\"axios\": \"^1.6.0\""));
        // Existing keys keep their order.
        assert!(content.find("react").unwrap() < content.find("axios").unwrap());
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let mut files = FileSet::from_files([ProjectFile::new(MANIFEST_FILE, "[1, 2]")]);
        assert!(add_dependency(&mut files, &PackageSpec::parse("axios").unwrap()).is_err());
    }
}
