use inkwell_editor::EditorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "inkwell.config.json";

/// Inkwell configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Note id used to seed node keys of opened documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,

    /// Engine settings
    #[serde(flatten)]
    pub editor: EditorConfig,
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &Path) -> anyhow::Result<Self> {
        let config_path = Self::path(cwd);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    pub fn path(cwd: &Path) -> PathBuf {
        cwd.join(DEFAULT_CONFIG_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "noteId": "groceries",
            "maxIndentDepth": 3,
            "containerWidth": 640,
            "enabledPlugins": ["rich-text", "history"]
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.note_id.as_deref(), Some("groceries"));
        assert_eq!(config.editor.max_indent_depth, 3);
        assert_eq!(config.editor.container_width, 640);
        assert_eq!(config.editor.enabled_plugins, vec!["rich-text", "history"]);
        assert_eq!(config.editor.autosave_debounce_ms, 2500);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.editor.max_indent_depth, 7);
    }
}
