use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PreviewError, Result};

/// Tunables for the preview pipeline and the simulated shell.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewConfig {
    pub version: u32,
    /// Quiet period after the last file-set change before regenerating.
    pub debounce_ms: u64,
    pub styling_engine_url: String,
    pub ui_runtime_url: String,
    pub dom_runtime_url: String,
    pub script_compiler_url: String,
    /// Base URL of the hosted runner used by the mobile stack.
    pub runner_embed_url: String,
    /// Interpreter command for the managed-runtime-language stack.
    pub interpreter_command: String,
    pub interpreter_args: Vec<String>,
    /// Spacing between the staged lines of a simulated install.
    pub install_stage_ms: u64,
    pub node_timeout_ms: u64,
    pub scrollback_lines: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debounce_ms: 300,
            styling_engine_url: "https://cdn.tailwindcss.com".into(),
            ui_runtime_url: "https://unpkg.com/react@18/umd/react.development.js".into(),
            dom_runtime_url: "https://unpkg.com/react-dom@18/umd/react-dom.development.js".into(),
            script_compiler_url: "https://unpkg.com/@babel/standalone/babel.min.js".into(),
            runner_embed_url: "https://snack.expo.dev/embedded".into(),
            interpreter_command: "python3".into(),
            interpreter_args: vec!["-I".into(), "-u".into(), "-".into()],
            install_stage_ms: 400,
            node_timeout_ms: 2_000,
            scrollback_lines: 5_000,
        }
    }
}

/// Location of the user-level config file.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("live-preview").join("config.json"))
}

/// Loads the user config, falling back to defaults when it is missing or unreadable.
pub fn load_config() -> PreviewConfig {
    config_path()
        .and_then(|path| load_config_from(&path))
        .unwrap_or_default()
}

pub fn load_config_from(path: &Path) -> Option<PreviewConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed config: {e}");
            None
        }
    }
}

/// Writes the config to the user-level location.
pub fn save_config(config: &PreviewConfig) -> Result<PathBuf> {
    let path = config_path().ok_or_else(|| PreviewError::Custom("no config directory on this platform".into()))?;
    save_config_to(&path, config)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, config: &PreviewConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: PreviewConfig = serde_json::from_str(r#"{"debounceMs": 50}"#).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.install_stage_ms, PreviewConfig::default().install_stage_ms);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = PreviewConfig {
            debounce_ms: 10,
            ..PreviewConfig::default()
        };
        save_config_to(&path, &config).unwrap();
        assert_eq!(load_config_from(&path), Some(config));
    }

    #[test]
    fn test_malformed_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path), None);
    }
}
